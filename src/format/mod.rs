pub mod chunk;
pub mod header;
pub mod playback_file;
pub mod thumbnail;

pub use header::{FileHeader, FoldingMap};
pub use playback_file::{PlaybackFile, MAX_BUFFERED_RECORDS, RECORD_VERSION};
pub use thumbnail::Surface;
