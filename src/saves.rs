use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tracing::warn;

use crate::recorder::EventRecorder;

/// Seam to the persistent-save store. The engine lists, reads, embeds and
/// deletes saves through this; it never walks the filesystem itself.
pub trait SaveFileManager: Send + Sync {
    fn read_save(&self, name: &str) -> Option<Vec<u8>>;

    fn write_save(&self, name: &str, contents: &[u8]) -> io::Result<()>;

    fn open_for_loading(&self, name: &str) -> Option<Box<dyn Read + Send>> {
        self.read_save(name)
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
    }

    /// Save names matching a glob pattern (`?` one character, `*` a run).
    fn list_save_files(&self, pattern: &str) -> Vec<String>;

    fn remove_save_file(&self, name: &str) -> bool;

    /// Absolute location a named save (or record file) lives at.
    fn resolve_path(&self, name: &str) -> PathBuf;
}

/// Filesystem-backed store rooted at a single directory.
pub struct DefaultSaveFileManager {
    save_dir: PathBuf,
}

impl DefaultSaveFileManager {
    pub fn new(save_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let save_dir = save_dir.into();
        std::fs::create_dir_all(&save_dir)?;
        Ok(DefaultSaveFileManager { save_dir })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }
}

impl SaveFileManager for DefaultSaveFileManager {
    fn read_save(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.resolve_path(name)).ok()
    }

    fn write_save(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        std::fs::write(self.resolve_path(name), contents)
    }

    fn list_save_files(&self, pattern: &str) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.save_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.save_dir.display(), error = %e, "Couldn't list save directory");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| matches_pattern(name, pattern))
            .collect();
        names.sort();
        names
    }

    fn remove_save_file(&self, name: &str) -> bool {
        std::fs::remove_file(self.resolve_path(name)).is_ok()
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        self.save_dir.join(name)
    }
}

/// Adapter installed while the engine is live: loading and listing go
/// through the multiplexer so playback sees the recorded saves, while
/// writes and deletes keep hitting the real store.
pub struct RecorderSaveFileManager {
    recorder: Weak<EventRecorder>,
    real: Arc<dyn SaveFileManager>,
}

impl RecorderSaveFileManager {
    pub fn new(recorder: Weak<EventRecorder>, real: Arc<dyn SaveFileManager>) -> Self {
        RecorderSaveFileManager { recorder, real }
    }
}

impl SaveFileManager for RecorderSaveFileManager {
    fn read_save(&self, name: &str) -> Option<Vec<u8>> {
        match self.recorder.upgrade() {
            Some(recorder) => {
                let mut stream = recorder.process_save_stream(name);
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes).ok()?;
                Some(bytes)
            }
            None => self.real.read_save(name),
        }
    }

    fn open_for_loading(&self, name: &str) -> Option<Box<dyn Read + Send>> {
        match self.recorder.upgrade() {
            Some(recorder) => Some(Box::new(recorder.process_save_stream(name))),
            None => self.real.open_for_loading(name),
        }
    }

    fn write_save(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        self.real.write_save(name, contents)
    }

    fn list_save_files(&self, pattern: &str) -> Vec<String> {
        match self.recorder.upgrade() {
            Some(recorder) => recorder.list_save_files(pattern),
            None => self.real.list_save_files(pattern),
        }
    }

    fn remove_save_file(&self, name: &str) -> bool {
        self.real.remove_save_file(name)
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        self.real.resolve_path(name)
    }
}

/// Glob match with `?` for a single character and `*` for any run.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    fn matches(name: &[u8], pattern: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                matches(name, &pattern[1..])
                    || (!name.is_empty() && matches(&name[1..], pattern))
            }
            (Some(b'?'), Some(_)) => matches(&name[1..], &pattern[1..]),
            (Some(p), Some(n)) if p == n => matches(&name[1..], &pattern[1..]),
            _ => false,
        }
    }
    matches(name.as_bytes(), pattern.as_bytes())
}
