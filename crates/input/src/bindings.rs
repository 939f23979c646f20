//! Platform adapter turning winit events into [`RawFrame`]s.

use crate::{Button, ButtonSet, RawFrame};
use glam::Vec2;
use std::collections::{HashMap, HashSet};
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Physical key and mouse button bindings.
#[derive(Debug, Clone)]
pub struct Bindings {
    keys: HashMap<KeyCode, Button>,
    mouse: HashMap<MouseButton, Button>,
    /// Flip vertical look.
    pub invert_y: bool,
}

impl Default for Bindings {
    fn default() -> Self {
        let keys = HashMap::from([
            (KeyCode::Space, Button::Jump),
            (KeyCode::ControlLeft, Button::Crouch),
            (KeyCode::ShiftLeft, Button::Sprint),
            (KeyCode::KeyE, Button::Interact),
            (KeyCode::KeyR, Button::Reload),
            (KeyCode::Digit1, Button::Weapon1),
            (KeyCode::Digit2, Button::Weapon2),
        ]);
        let mouse = HashMap::from([
            (MouseButton::Left, Button::Shoot),
            (MouseButton::Right, Button::Aim),
        ]);
        Self {
            keys,
            mouse,
            invert_y: false,
        }
    }
}

impl Bindings {
    /// Bind a key, replacing any earlier binding for it.
    pub fn bind_key(&mut self, key: KeyCode, button: Button) {
        self.keys.insert(key, button);
    }

    /// Bind a mouse button, replacing any earlier binding for it.
    pub fn bind_mouse(&mut self, mouse: MouseButton, button: Button) {
        self.mouse.insert(mouse, button);
    }
}

/// Tracks winit state between frames for the owning peer.
#[derive(Debug, Default)]
pub struct WinitInputSource {
    bindings: Bindings,
    keys_down: HashSet<KeyCode>,
    mouse_down: HashSet<MouseButton>,
    mouse_delta: (f64, f64),
    /// Whether the cursor is captured; look input is ignored otherwise.
    pub cursor_locked: bool,
}

impl WinitInputSource {
    /// Create a source using `bindings`.
    pub fn new(bindings: Bindings) -> Self {
        Self {
            bindings,
            ..Self::default()
        }
    }

    /// Process a window event.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(keycode),
                        state,
                        ..
                    },
                ..
            } => match state {
                ElementState::Pressed => {
                    self.keys_down.insert(*keycode);
                }
                ElementState::Released => {
                    self.keys_down.remove(keycode);
                }
            },
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    self.mouse_down.insert(*button);
                }
                ElementState::Released => {
                    self.mouse_down.remove(button);
                }
            },
            WindowEvent::Focused(false) => {
                self.keys_down.clear();
                self.mouse_down.clear();
            }
            _ => {}
        }
    }

    /// Process a device event (raw mouse motion).
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.mouse_delta.0 += delta.0;
            self.mouse_delta.1 += delta.1;
        }
    }

    /// Toggle cursor capture.
    pub fn toggle_cursor_lock(&mut self) {
        self.cursor_locked = !self.cursor_locked;
    }

    /// Produce this frame's reading and reset the per-frame mouse delta.
    pub fn frame(&mut self) -> RawFrame {
        let (dx, dy) = std::mem::take(&mut self.mouse_delta);
        let look = if self.cursor_locked {
            // Screen y grows downward; positive pitch looks up.
            let pitch = if self.bindings.invert_y { dy } else { -dy };
            Vec2::new(dx as f32, pitch as f32)
        } else {
            Vec2::ZERO
        };

        RawFrame {
            movement: self.movement(),
            look,
            buttons: self.buttons(),
        }
    }

    fn buttons(&self) -> ButtonSet {
        let keys = self
            .keys_down
            .iter()
            .filter_map(|key| self.bindings.keys.get(key));
        let mouse = self
            .mouse_down
            .iter()
            .filter_map(|button| self.bindings.mouse.get(button));
        keys.chain(mouse)
            .fold(ButtonSet::empty(), |set, button| set | button.flag())
    }

    fn movement(&self) -> Vec2 {
        let axis = |pos: KeyCode, neg: KeyCode| {
            let mut value = 0.0;
            if self.keys_down.contains(&pos) {
                value += 1.0;
            }
            if self.keys_down.contains(&neg) {
                value -= 1.0;
            }
            value
        };
        Vec2::new(
            axis(KeyCode::KeyD, KeyCode::KeyA),
            axis(KeyCode::KeyW, KeyCode::KeyS),
        )
        .clamp_length_max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_source_produces_empty_frame() {
        let mut source = WinitInputSource::new(Bindings::default());
        assert_eq!(source.frame(), RawFrame::default());
    }

    #[test]
    fn mouse_motion_ignored_until_cursor_locked() {
        let mut source = WinitInputSource::default();
        source.handle_device_event(&DeviceEvent::MouseMotion { delta: (4.0, 2.0) });
        assert_eq!(source.frame().look, Vec2::ZERO);

        source.toggle_cursor_lock();
        source.handle_device_event(&DeviceEvent::MouseMotion { delta: (4.0, 2.0) });
        assert_eq!(source.frame().look, Vec2::new(4.0, -2.0));
        assert_eq!(source.frame().look, Vec2::ZERO);
    }

    #[test]
    fn custom_bindings_override_defaults() {
        let mut bindings = Bindings::default();
        bindings.bind_key(KeyCode::KeyF, Button::Interact);
        bindings.bind_mouse(MouseButton::Middle, Button::Reload);
        assert_eq!(bindings.keys.get(&KeyCode::KeyF), Some(&Button::Interact));
        assert_eq!(bindings.mouse.get(&MouseButton::Middle), Some(&Button::Reload));
    }
}
