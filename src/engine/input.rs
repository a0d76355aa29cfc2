// Input state tracking for keyboard and mouse.
// Abstracts winit events into a per-frame snapshot; the blob core only ever
// sees the normalized pointer vector produced here.

use std::collections::HashSet;
use glam::Vec2;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use super::mood::Mood;

pub struct InputState {
    // Keyboard
    keys_held: HashSet<KeyCode>,
    // Pressed since the last end_frame(); key repeats are ignored.
    keys_pressed: HashSet<KeyCode>,

    // Mouse, in physical pixels from the top-left corner
    pub mouse_position: (f32, f32),
    pub cursor_inside: bool,

    // Scroll: accumulated vertical scroll this frame, reset in end_frame()
    pub scroll_delta: f32,

    pub window_size: (u32, u32),
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_held: HashSet::new(),
            keys_pressed: HashSet::new(),
            mouse_position: (0.0, 0.0),
            cursor_inside: false,
            scroll_delta: 0.0,
            window_size: (0, 0),
        }
    }

    /// Feed a winit WindowEvent into the input state.
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if !event.repeat {
                                self.keys_pressed.insert(key);
                            }
                            self.keys_held.insert(key);
                        }
                        ElementState::Released => { self.keys_held.remove(&key); }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse_position = (position.x as f32, position.y as f32);
                self.cursor_inside = true;
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor_inside = false;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                self.scroll_delta += y;
            }
            WindowEvent::Resized(size) => {
                self.window_size = (size.width, size.height);
            }
            _ => {}
        }
    }

    /// Call once per frame after the frame has consumed input.
    pub fn end_frame(&mut self) {
        self.scroll_delta = 0.0;
        self.keys_pressed.clear();
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Mood selected with the number row this frame, if any. Highest wins.
    pub fn mood_selection(&self) -> Option<Mood> {
        [
            (KeyCode::Digit4, Mood::Talking),
            (KeyCode::Digit3, Mood::Thinking),
            (KeyCode::Digit2, Mood::Listening),
            (KeyCode::Digit1, Mood::Idle),
        ]
        .into_iter()
        .find(|(key, _)| self.was_key_pressed(*key))
        .map(|(_, mood)| mood)
    }

    /// Pointer in `[-1, 1]²` with +y up, or `None` while the cursor is outside.
    pub fn normalized_pointer(&self) -> Option<Vec2> {
        if !self.cursor_inside {
            return None;
        }
        normalize_cursor(self.mouse_position, self.window_size)
    }
}

/// Map a pixel position (origin top-left, y down) to normalized device
/// coordinates (origin center, y up), clamped to `[-1, 1]`.
pub fn normalize_cursor(position: (f32, f32), window_size: (u32, u32)) -> Option<Vec2> {
    let (w, h) = (window_size.0 as f32, window_size.1 as f32);
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let ndc = Vec2::new(position.0 / w * 2.0 - 1.0, 1.0 - position.1 / h * 2.0);
    Some(ndc.clamp(Vec2::NEG_ONE, Vec2::ONE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_and_center_map_to_ndc() {
        let size = (800, 600);
        assert_eq!(normalize_cursor((0.0, 0.0), size), Some(Vec2::new(-1.0, 1.0)));
        assert_eq!(normalize_cursor((800.0, 600.0), size), Some(Vec2::new(1.0, -1.0)));
        assert_eq!(normalize_cursor((400.0, 300.0), size), Some(Vec2::ZERO));
    }

    #[test]
    fn out_of_window_positions_are_clamped() {
        assert_eq!(normalize_cursor((-50.0, 900.0), (100, 100)), Some(Vec2::new(-1.0, -1.0)));
    }

    #[test]
    fn zero_sized_window_has_no_pointer() {
        assert_eq!(normalize_cursor((10.0, 10.0), (0, 600)), None);
    }

    #[test]
    fn pointer_requires_cursor_inside() {
        let mut input = InputState::new();
        input.window_size = (200, 200);
        input.mouse_position = (100.0, 100.0);
        assert_eq!(input.normalized_pointer(), None);
        input.cursor_inside = true;
        assert_eq!(input.normalized_pointer(), Some(Vec2::ZERO));
    }
}
