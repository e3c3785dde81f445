use std::collections::BTreeMap;

/// Map with ASCII-case-insensitive keys that remembers the spelling each
/// key was first inserted with. Iteration order follows the folded key so
/// header dumps are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldingMap<V> {
    entries: BTreeMap<String, (String, V)>,
}

impl<V> FoldingMap<V> {
    pub fn new() -> Self {
        FoldingMap {
            entries: BTreeMap::new(),
        }
    }

    fn fold(key: &str) -> String {
        key.to_ascii_lowercase()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(Self::fold(&key), (key, value))
            .map(|(_, v)| v)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&Self::fold(key)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&Self::fold(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(original_key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }
}

/// In-memory form of everything the file stores ahead of the event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHeader {
    pub author: String,
    pub name: String,
    pub notes: String,
    /// Application file name -> 32-char MD5 hex. Case-sensitive.
    pub hash_records: BTreeMap<String, String>,
    /// Configuration key -> value. Keys keep their stored spelling;
    /// playback matches them case-insensitively.
    pub settings_records: BTreeMap<String, String>,
    /// RNG source name -> seed.
    pub random_source_records: FoldingMap<u32>,
    /// Save file name -> raw contents.
    pub save_files: FoldingMap<Vec<u8>>,
}

impl FileHeader {
    /// Case-insensitive settings lookup used when pushing recorded
    /// configuration back into the host.
    pub fn setting_ignore_case(&self, key: &str) -> Option<&str> {
        self.settings_records
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn clear(&mut self) {
        *self = FileHeader::default();
    }

    /// Drops everything gathered by a previous session while keeping the
    /// author/name/notes a caller may have staged for the next one.
    pub fn clear_records(&mut self) {
        self.hash_records.clear();
        self.settings_records.clear();
        self.random_source_records = FoldingMap::new();
        self.save_files = FoldingMap::new();
    }
}
