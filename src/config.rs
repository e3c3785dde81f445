use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which configuration domain a write lands in. Transient entries shadow
/// both persistent domains and never reach disk; playback restoration
/// writes there so a replayed session can't corrupt real settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigDomain {
    Application,
    Game,
    Transient,
}

/// Key/value configuration with the domain layering the engine relies on.
/// Keys are stored verbatim; `get_ignore_case` exists for playback
/// restoration, which matches recorded keys loosely.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigManager {
    application: BTreeMap<String, String>,
    game: BTreeMap<String, String>,
    transient: BTreeMap<String, String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        ConfigManager::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.transient
            .get(key)
            .or_else(|| self.game.get(key))
            .or_else(|| self.application.get(key))
            .map(String::as_str)
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        lookup_ignore_case(&self.transient, key)
            .or_else(|| lookup_ignore_case(&self.game, key))
            .or_else(|| lookup_ignore_case(&self.application, key))
    }

    pub fn get_int(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, domain: ConfigDomain) {
        let map = match domain {
            ConfigDomain::Application => &mut self.application,
            ConfigDomain::Game => &mut self.game,
            ConfigDomain::Transient => &mut self.transient,
        };
        map.insert(key.into(), value.into());
    }

    /// Removes a key from the persistent domains, leaving transient
    /// overrides alone.
    pub fn remove_persistent(&mut self, key: &str) {
        self.application.remove(key);
        self.game.remove(key);
    }

    pub fn iter_application(&self) -> impl Iterator<Item = (&str, &str)> {
        self.application.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn iter_game(&self) -> impl Iterator<Item = (&str, &str)> {
        self.game.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All persistent keys, game domain shadowing application.
    pub fn persistent_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .application
            .keys()
            .chain(self.game.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

fn lookup_ignore_case<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// On-disk YAML configuration for the binary.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub record_mode: Option<String>,
    pub record_file_name: Option<String>,
    pub screenshot_period: Option<u32>,
    pub gameid: Option<String>,
    pub save_dir: Option<PathBuf>,
    /// Arbitrary further settings snapshotted into recordings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl From<ConfigFile> for ConfigManager {
    fn from(value: ConfigFile) -> Self {
        let mut manager = ConfigManager::new();
        if let Some(mode) = value.record_mode {
            manager.set("record_mode", mode, ConfigDomain::Application);
        }
        if let Some(name) = value.record_file_name {
            manager.set("record_file_name", name, ConfigDomain::Application);
        }
        if let Some(period) = value.screenshot_period {
            manager.set(
                "screenshot_period",
                period.to_string(),
                ConfigDomain::Application,
            );
        }
        if let Some(gameid) = value.gameid {
            manager.set("gameid", gameid, ConfigDomain::Application);
        }
        for (key, val) in value.settings {
            manager.set(key, val, ConfigDomain::Game);
        }
        manager
    }
}
