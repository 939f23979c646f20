use fpsim_input::{ButtonSet, RawFrame};
use glam::Vec2;
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Deserialize)]
struct ScriptedInputFile {
    steps: Vec<ScriptedStep>,
}

/// One held pose of the scripted controller, in seconds.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScriptedStep {
    pub duration: f32,
    #[serde(default)]
    pub move_x: f32,
    #[serde(default)]
    pub move_y: f32,
    #[serde(default)]
    pub look_x: f32,
    #[serde(default)]
    pub look_y: f32,
    #[serde(default)]
    pub sprint: bool,
    #[serde(default)]
    pub crouch: bool,
    #[serde(default)]
    pub jump: bool,
    #[serde(default)]
    pub shoot: bool,
    #[serde(default)]
    pub aim: bool,
    #[serde(default)]
    pub reload: bool,
    #[serde(default)]
    pub interact: bool,
    #[serde(default)]
    pub weapon: Option<u8>,
}

/// Plays a list of timed steps back as raw controller frames.
pub struct ScriptedInputPlayer {
    steps: Vec<ScriptedStep>,
    index: usize,
    time_in_step: f32,
    finished: bool,
}

impl ScriptedInputPlayer {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: ScriptedInputFile = serde_json::from_str(&contents)?;
        Self::new(file.steps)
    }

    pub fn new(steps: Vec<ScriptedStep>) -> anyhow::Result<Self> {
        if steps.is_empty() {
            anyhow::bail!("scripted input contains no steps");
        }
        Ok(Self {
            steps,
            index: 0,
            time_in_step: 0.0,
            finished: false,
        })
    }

    /// Walk up to a pickup, collect it, then fire, reload, switch and run.
    pub fn demo() -> Self {
        let step = |duration: f32| ScriptedStep {
            duration,
            ..ScriptedStep::default()
        };
        let steps = vec![
            step(0.2),
            ScriptedStep {
                move_y: 1.0,
                ..step(1.0)
            },
            ScriptedStep {
                interact: true,
                ..step(1.4)
            },
            step(0.2),
            ScriptedStep {
                shoot: true,
                aim: true,
                ..step(0.6)
            },
            ScriptedStep {
                reload: true,
                ..step(0.1)
            },
            step(2.2),
            ScriptedStep {
                weapon: Some(2),
                ..step(0.1)
            },
            step(0.4),
            ScriptedStep {
                shoot: true,
                ..step(0.1)
            },
            ScriptedStep {
                look_x: 90.0,
                ..step(0.5)
            },
            ScriptedStep {
                move_y: 1.0,
                sprint: true,
                ..step(1.0)
            },
            ScriptedStep {
                move_y: 1.0,
                sprint: true,
                jump: true,
                ..step(0.1)
            },
            ScriptedStep {
                move_x: -1.0,
                crouch: true,
                ..step(0.8)
            },
            step(1.5),
        ];
        Self {
            steps,
            index: 0,
            time_in_step: 0.0,
            finished: false,
        }
    }

    /// True once the last step has run for its whole duration.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frame for the next `dt` seconds. The last step keeps being returned
    /// after the script ends.
    pub fn advance(&mut self, dt: f32) -> RawFrame {
        self.time_in_step += dt;
        while self.index < self.steps.len() && self.time_in_step >= self.steps[self.index].duration
        {
            self.time_in_step -= self.steps[self.index].duration;
            if self.index + 1 < self.steps.len() {
                self.index += 1;
            } else {
                self.time_in_step = 0.0;
                self.finished = true;
                break;
            }
        }

        let step = self.steps.get(self.index).cloned().unwrap_or_default();
        step.into_raw_frame(dt)
    }
}

impl ScriptedStep {
    fn into_raw_frame(self, dt: f32) -> RawFrame {
        let mut buttons = ButtonSet::empty();
        for (on, flag) in [
            (self.sprint, ButtonSet::SPRINT),
            (self.crouch, ButtonSet::CROUCH),
            (self.jump, ButtonSet::JUMP),
            (self.shoot, ButtonSet::SHOOT),
            (self.aim, ButtonSet::AIM),
            (self.reload, ButtonSet::RELOAD),
            (self.interact, ButtonSet::INTERACT),
            (self.weapon == Some(1), ButtonSet::WEAPON_1),
            (self.weapon == Some(2), ButtonSet::WEAPON_2),
        ] {
            buttons.set(flag, on);
        }
        RawFrame {
            movement: Vec2::new(self.move_x, self.move_y).clamp_length_max(1.0),
            // look_* are degrees per second.
            look: Vec2::new(self.look_x, self.look_y) * dt,
            buttons,
        }
    }
}
