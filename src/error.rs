use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't open record file {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Unknown record file signature")]
    BadSignature,

    #[error("Incorrect record file version: expected {expected}, got {got}")]
    UnsupportedVersion { expected: u32, got: u32 },

    #[error("Invalid format of {section} section")]
    MalformedSection { section: &'static str },

    #[error("Record file is not open for {0}")]
    WrongMode(&'static str),

    #[error("Corrupted thumbnail data: {0}")]
    BadThumbnail(String),

    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),
}
