//! Deterministic record/replay engine for interactive applications.
//!
//! In record mode every non-deterministic input the host consumes
//! (keyboard and mouse events, clock ticks, requested delays, audio
//! sample demand, RNG seeds, save-file reads) is stamped with a virtual
//! timestamp and persisted to a chunked binary log, together with the
//! host configuration, per-game file hashes and periodic screenshots.
//! In playback mode the same history is replayed from the log, with the
//! real mixer and timer swapped for deterministic stand-ins, so the
//! application reproduces identical behaviour.

pub mod args;
pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod host;
pub mod mixer;
pub mod recorder;
pub mod saves;
pub mod timer;

pub use error::{RecorderError, Result};
pub use events::{Event, KeyState, Modifiers, MouseState, RecorderEvent};
pub use format::{FileHeader, PlaybackFile, Surface};
pub use host::{Host, SystemHost};
pub use recorder::{EventRecorder, GameDescriptor, GameFileDescription, RecordMode};
