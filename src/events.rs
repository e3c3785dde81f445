use bitflags::bitflags;

bitflags! {
    /// Keyboard modifier flags carried alongside key events.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const CTRL = 0b001;
        const ALT = 0b010;
        const SHIFT = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub keycode: i32,
    pub ascii: u16,
    pub flags: Modifiers,
}

impl KeyState {
    pub fn from_char(c: char) -> Self {
        KeyState {
            keycode: c as i32,
            ascii: c as u16,
            flags: Modifiers::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseState {
    pub x: i16,
    pub y: i16,
}

/// An external input the engine virtualises. Key and mouse variants come
/// from the host; `Timer`, `Delay` and `Audio` are produced by the clock
/// and audio paths. `Invalid` is the past-end-of-log sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Event {
    #[default]
    Invalid,
    KeyDown(KeyState),
    KeyUp(KeyState),
    MouseMove(MouseState),
    LButtonDown(MouseState),
    LButtonUp(MouseState),
    RButtonDown(MouseState),
    RButtonUp(MouseState),
    WheelUp(MouseState),
    WheelDown(MouseState),
    MButtonDown(MouseState),
    MButtonUp(MouseState),
    Timer,
    Delay { millis: u32 },
    Audio { samples: u32 },
}

impl Event {
    /// Stable on-disk discriminant. Changing any of these bumps the file
    /// format version.
    pub fn wire_id(&self) -> u32 {
        match self {
            Event::Invalid => 0,
            Event::KeyDown(_) => 1,
            Event::KeyUp(_) => 2,
            Event::MouseMove(_) => 3,
            Event::LButtonDown(_) => 4,
            Event::LButtonUp(_) => 5,
            Event::RButtonDown(_) => 6,
            Event::RButtonUp(_) => 7,
            Event::WheelUp(_) => 8,
            Event::WheelDown(_) => 9,
            Event::MButtonDown(_) => 10,
            Event::MButtonUp(_) => 11,
            Event::Timer => 12,
            Event::Delay { .. } => 13,
            Event::Audio { .. } => 14,
        }
    }

    /// True for events originating from the user rather than the clock or
    /// the audio path.
    pub fn is_input(&self) -> bool {
        !matches!(
            self,
            Event::Invalid | Event::Timer | Event::Delay { .. } | Event::Audio { .. }
        )
    }

    pub fn key_state(&self) -> Option<KeyState> {
        match self {
            Event::KeyDown(k) | Event::KeyUp(k) => Some(*k),
            _ => None,
        }
    }

    pub fn mouse_state(&self) -> Option<MouseState> {
        match self {
            Event::MouseMove(m)
            | Event::LButtonDown(m)
            | Event::LButtonUp(m)
            | Event::RButtonDown(m)
            | Event::RButtonUp(m)
            | Event::WheelUp(m)
            | Event::WheelDown(m)
            | Event::MButtonDown(m)
            | Event::MButtonUp(m) => Some(*m),
            _ => None,
        }
    }
}

/// An event stamped with the virtual-clock timestamp it was observed at.
///
/// `synthetic` is never serialised; the replayer sets it so the host's
/// input mapper can tell replayed events from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecorderEvent {
    pub time: u32,
    pub event: Event,
    pub synthetic: bool,
}

impl RecorderEvent {
    pub fn new(time: u32, event: Event) -> Self {
        RecorderEvent {
            time,
            event,
            synthetic: false,
        }
    }

    pub fn invalid() -> Self {
        RecorderEvent::default()
    }
}
