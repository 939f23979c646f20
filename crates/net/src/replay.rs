//! Recorded authority inputs and their playback.
//!
//! The authority records every input it consumed as one JSONL line per
//! `(tick, entity)`. Feeding the same lines back through [`step`] reproduces
//! the authoritative trajectory exactly.

use anyhow::{Context, Result};
use fpsim_core::{EntityId, SimTick};
use fpsim_input::TickInput;
use fpsim_sim::{step, CharacterState, StepContext};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One consumed input, one JSONL line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputLogEntry {
    /// Tick the input was consumed on.
    pub tick: SimTick,
    /// Entity it drove.
    pub entity: EntityId,
    /// Input as simulated (after default substitution).
    pub input: TickInput,
}

/// Appends consumed inputs to a JSONL file.
pub struct InputLogger {
    writer: BufWriter<File>,
    entries_written: u64,
}

impl InputLogger {
    /// Open `path` for writing, creating missing parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("creating input log {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            entries_written: 0,
        })
    }

    /// Record the input `entity` consumed on `tick`.
    pub fn log(&mut self, tick: SimTick, entity: EntityId, input: TickInput) -> Result<()> {
        let entry = InputLogEntry {
            tick,
            entity,
            input,
        };
        serde_json::to_writer(&mut self.writer, &entry)?;
        writeln!(&mut self.writer)?;
        self.entries_written += 1;
        Ok(())
    }

    /// Push buffered lines to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Lines written so far.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }
}

/// Walks a recorded input log tick by tick.
#[derive(Debug, Clone, Default)]
pub struct ReplayPlayer {
    entries: Vec<InputLogEntry>,
    current_index: usize,
}

impl ReplayPlayer {
    /// Read every entry of a JSONL input log. Blank lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening input log {}", path.display()))?;
        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading {}:{}", path.display(), index + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(
                serde_json::from_str::<InputLogEntry>(&line)
                    .with_context(|| format!("parsing {}:{}", path.display(), index + 1))?,
            );
        }
        Ok(Self::from_entries(entries))
    }

    /// Player over in-memory entries, sorted by `(tick, entity)`.
    pub fn from_entries(mut entries: Vec<InputLogEntry>) -> Self {
        entries.sort_by_key(|e| (e.tick, e.entity));
        Self {
            entries,
            current_index: 0,
        }
    }

    /// All inputs for `tick`, skipping anything older.
    pub fn inputs_for_tick(&mut self, tick: SimTick) -> Vec<InputLogEntry> {
        let mut inputs = Vec::new();
        while let Some(entry) = self.entries.get(self.current_index) {
            if entry.tick > tick {
                break;
            }
            if entry.tick == tick {
                inputs.push(*entry);
            }
            self.current_index += 1;
        }
        inputs
    }

    /// Every recorded input of `entity`, in tick order.
    pub fn inputs_of(&self, entity: EntityId) -> Vec<(SimTick, TickInput)> {
        self.entries
            .iter()
            .filter(|e| e.entity == entity)
            .map(|e| (e.tick, e.input))
            .collect()
    }

    /// Re-simulate `state` through every recorded input of its entity.
    pub fn replay(&self, state: &mut CharacterState, ctx: &StepContext<'_>) -> usize {
        let inputs = self.inputs_of(state.entity);
        for (tick, input) in &inputs {
            let tick_ctx = StepContext { tick: *tick, ..*ctx };
            *state = step(state, input, &tick_ctx).state;
        }
        inputs.len()
    }

    /// Rewind to the first entry.
    pub fn reset(&mut self) {
        self.current_index = 0;
    }

    /// Entries in the log.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// True once every entry was handed out.
    pub fn is_finished(&self) -> bool {
        self.current_index >= self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_input::ButtonSet;
    use glam::Vec2;
    use tempfile::tempdir;

    #[test]
    fn log_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/inputs.jsonl");
        let mut logger = InputLogger::create(&path).unwrap();
        let jump = TickInput {
            held: ButtonSet::JUMP,
            ..TickInput::default()
        };
        logger.log(SimTick(2), 1, jump).unwrap();
        logger.log(SimTick(1), 1, TickInput::default()).unwrap();
        logger
            .log(
                SimTick(1),
                2,
                TickInput {
                    movement: Vec2::new(1.0, 0.0),
                    ..TickInput::default()
                },
            )
            .unwrap();
        logger.flush().unwrap();
        assert_eq!(logger.entries_written(), 3);

        let mut player = ReplayPlayer::load(&path).unwrap();
        assert_eq!(player.entry_count(), 3);
        assert_eq!(player.inputs_for_tick(SimTick(1)).len(), 2);
        let second = player.inputs_for_tick(SimTick(2));
        assert_eq!(second[0].input, jump);
        assert!(player.is_finished());
        assert_eq!(player.inputs_of(1).len(), 2);
    }

    #[test]
    fn bad_line_reports_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"tick\":1}\n").unwrap();
        let err = ReplayPlayer::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.jsonl:1"));
    }

    #[test]
    fn replay_rederives_recorded_run() {
        let mut arena = fpsim_testkit::Arena::default();
        let inputs = fpsim_testkit::InputScript::new()
            .hold(ButtonSet::SPRINT, Vec2::new(0.0, 1.0), 12)
            .hold(ButtonSet::JUMP, Vec2::ZERO, 2)
            .idle(6)
            .commit();
        let mut truth = arena.spawn(1, glam::Vec3::ZERO);
        let mut entries = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            let tick = SimTick(i as u64 + 1);
            arena.tick(&mut truth, input, tick);
            entries.push(InputLogEntry {
                tick,
                entity: 1,
                input: *input,
            });
        }

        let mut player = ReplayPlayer::from_entries(entries);
        let mut state = arena.spawn(1, glam::Vec3::ZERO);
        assert_eq!(player.replay(&mut state, &arena.ctx(SimTick::ZERO)), inputs.len());
        assert_eq!(state.motion, truth.motion);

        player.inputs_for_tick(SimTick(30));
        assert!(player.is_finished());
        player.reset();
        assert_eq!(player.inputs_for_tick(SimTick(1)).len(), 1);
    }
}
