use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    Escape,
    Space,
}

impl KeyCode {
    pub const ALL: [KeyCode; 6] =
        [KeyCode::W, KeyCode::A, KeyCode::S, KeyCode::D, KeyCode::Escape, KeyCode::Space];

    pub fn name(self) -> &'static str {
        match self {
            KeyCode::W => "W",
            KeyCode::A => "A",
            KeyCode::S => "S",
            KeyCode::D => "D",
            KeyCode::Escape => "ESC",
            KeyCode::Space => "SPACE",
        }
    }

    /// Case-insensitive lookup used by the script API.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "W" => Some(KeyCode::W),
            "A" => Some(KeyCode::A),
            "S" => Some(KeyCode::S),
            "D" => Some(KeyCode::D),
            "ESC" | "ESCAPE" => Some(KeyCode::Escape),
            "SPACE" => Some(KeyCode::Space),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Quit,
    Key { code: KeyCode, pressed: bool },
}

/// Source of pending platform events, drained once per frame tick.
pub trait EventSource {
    /// Appends every pending event to `out` without blocking.
    fn pump(&mut self, out: &mut Vec<InputEvent>) -> Result<()>;
}

/// Cached pressed/released state for the supported keys.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pressed: [bool; KeyCode::ALL.len()],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &InputEvent) {
        if let InputEvent::Key { code, pressed } = *event {
            self.pressed[code.index()] = pressed;
        }
    }

    pub fn is_pressed(&self, code: KeyCode) -> bool {
        self.pressed[code.index()]
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = KeyCode> + '_ {
        KeyCode::ALL.into_iter().filter(|code| self.is_pressed(*code))
    }
}

/// Event source for runs without a window. Requests quit once `frame_limit`
/// pumps have happened; without a limit it never quits on its own.
#[derive(Debug, Clone, Default)]
pub struct HeadlessEvents {
    frame_limit: Option<u64>,
    pumped: u64,
    queued: Vec<InputEvent>,
}

impl HeadlessEvents {
    pub fn new(frame_limit: Option<u64>) -> Self {
        Self { frame_limit, pumped: 0, queued: Vec::new() }
    }

    /// Queues an event for the next pump.
    pub fn push(&mut self, event: InputEvent) {
        self.queued.push(event);
    }
}

impl EventSource for HeadlessEvents {
    fn pump(&mut self, out: &mut Vec<InputEvent>) -> Result<()> {
        out.append(&mut self.queued);
        if let Some(limit) = self.frame_limit {
            if self.pumped >= limit {
                out.push(InputEvent::Quit);
            }
        }
        self.pumped = self.pumped.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_events_update_state() {
        let mut state = InputState::new();
        state.apply(&InputEvent::Key { code: KeyCode::Space, pressed: true });
        state.apply(&InputEvent::Key { code: KeyCode::W, pressed: true });
        state.apply(&InputEvent::Key { code: KeyCode::W, pressed: false });
        state.apply(&InputEvent::Quit);
        assert!(state.is_pressed(KeyCode::Space));
        assert!(!state.is_pressed(KeyCode::W));
        assert_eq!(state.pressed_keys().collect::<Vec<_>>(), vec![KeyCode::Space]);
    }

    #[test]
    fn key_names_round_trip_case_insensitively() {
        for code in KeyCode::ALL {
            assert_eq!(KeyCode::from_name(&code.name().to_lowercase()), Some(code));
        }
        assert_eq!(KeyCode::from_name("escape"), Some(KeyCode::Escape));
        assert_eq!(KeyCode::from_name("F1"), None);
    }

    #[test]
    fn headless_events_quit_after_limit() {
        let mut events = HeadlessEvents::new(Some(2));
        let mut out = Vec::new();
        events.pump(&mut out).expect("pump");
        events.pump(&mut out).expect("pump");
        assert!(out.is_empty());
        events.pump(&mut out).expect("pump");
        assert_eq!(out, vec![InputEvent::Quit]);
    }
}
