//! Owner-side input sampling with a double-buffered commit.
//!
//! `sample_frame` runs once per render frame and `commit` once per tick. Edge
//! flags are fixed at commit time and never recomputed mid-tick.

use crate::{ButtonSet, TickInput};
use glam::Vec2;

/// One render frame's worth of raw platform input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawFrame {
    /// Latest movement axes reading.
    pub movement: Vec2,
    /// Look delta accumulated during this frame (device units).
    pub look: Vec2,
    /// Buttons physically down at the end of the frame.
    pub buttons: ButtonSet,
}

/// Accumulates raw frames between ticks and commits them into [`TickInput`]s.
#[derive(Debug, Clone)]
pub struct InputSampler {
    sensitivity: f32,
    movement: Vec2,
    look: Vec2,
    raw: ButtonSet,
    latched: ButtonSet,
    committed: ButtonSet,
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl InputSampler {
    /// Create a sampler scaling look deltas by `sensitivity` (degrees per device unit).
    pub fn new(sensitivity: f32) -> Self {
        Self {
            sensitivity,
            movement: Vec2::ZERO,
            look: Vec2::ZERO,
            raw: ButtonSet::empty(),
            latched: ButtonSet::empty(),
            committed: ButtonSet::empty(),
        }
    }

    /// Fold one render frame into the pending command.
    ///
    /// Movement is overwritten by the latest reading, look is summed since
    /// several frames may elapse per tick. A button that goes down and up
    /// between two commits is still committed as held for one tick.
    pub fn sample_frame(&mut self, frame: &RawFrame) {
        self.movement = frame.movement;
        self.look += frame.look * self.sensitivity;
        self.latched |= frame.buttons;
        self.raw = frame.buttons;
    }

    /// Shift raw -> committed -> previous and return this tick's command.
    ///
    /// Without an intervening `sample_frame` the buttons repeat their last
    /// committed value, so no edges fire.
    pub fn commit(&mut self) -> TickInput {
        let previous = self.committed;
        self.committed = self.raw | self.latched;
        self.latched = ButtonSet::empty();

        let input = TickInput {
            movement: self.movement,
            look_delta: std::mem::take(&mut self.look),
            held: self.committed,
            previous,
        };
        input.sanitized()
    }

    /// Look delta accumulated since the last commit (for presentation).
    pub fn pending_look(&self) -> Vec2 {
        self.look
    }

    /// Drop everything, as if all buttons were released.
    pub fn reset(&mut self) {
        *self = Self::new(self.sensitivity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Button;
    use proptest::prelude::*;

    fn frame(buttons: ButtonSet) -> RawFrame {
        RawFrame {
            buttons,
            ..RawFrame::default()
        }
    }

    #[test]
    fn press_edge_lasts_exactly_one_tick() {
        let mut sampler = InputSampler::default();
        sampler.sample_frame(&frame(ButtonSet::JUMP));

        let first = sampler.commit();
        assert!(first.pressed(Button::Jump));

        sampler.sample_frame(&frame(ButtonSet::JUMP));
        let second = sampler.commit();
        assert!(second.held(Button::Jump));
        assert!(!second.pressed(Button::Jump));

        sampler.sample_frame(&frame(ButtonSet::empty()));
        let third = sampler.commit();
        assert!(third.released(Button::Jump));

        let fourth = sampler.commit();
        assert!(!fourth.released(Button::Jump));
    }

    #[test]
    fn commit_without_frame_collapses_to_no_change() {
        let mut sampler = InputSampler::default();
        sampler.sample_frame(&frame(ButtonSet::SPRINT));
        sampler.commit();

        let idle = sampler.commit();
        assert!(idle.held(Button::Sprint));
        assert!(!idle.pressed(Button::Sprint));
        assert!(!idle.released(Button::Sprint));
    }

    #[test]
    fn look_accumulates_across_frames_and_resets_on_commit() {
        let mut sampler = InputSampler::new(0.5);
        for _ in 0..3 {
            sampler.sample_frame(&RawFrame {
                look: Vec2::new(2.0, -1.0),
                ..RawFrame::default()
            });
        }
        assert_eq!(sampler.commit().look_delta, Vec2::new(3.0, -1.5));
        assert_eq!(sampler.commit().look_delta, Vec2::ZERO);
    }

    #[test]
    fn tap_between_commits_is_not_lost() {
        let mut sampler = InputSampler::default();
        sampler.sample_frame(&frame(ButtonSet::SHOOT));
        sampler.sample_frame(&frame(ButtonSet::empty()));

        let tapped = sampler.commit();
        assert!(tapped.pressed(Button::Shoot));
        let after = sampler.commit();
        assert!(after.released(Button::Shoot));
    }

    proptest! {
        /// A button's press edge fires exactly on the ticks where its committed
        /// value goes false -> true, and release on true -> false.
        #[test]
        fn edges_match_committed_transitions(schedule in prop::collection::vec(any::<bool>(), 1..64)) {
            let mut sampler = InputSampler::default();
            let mut last = false;
            for down in schedule {
                let buttons = if down { ButtonSet::CROUCH } else { ButtonSet::empty() };
                sampler.sample_frame(&frame(buttons));
                let input = sampler.commit();
                prop_assert_eq!(input.held(Button::Crouch), down);
                prop_assert_eq!(input.pressed(Button::Crouch), down && !last);
                prop_assert_eq!(input.released(Button::Crouch), !down && last);
                last = down;
            }
        }
    }
}
