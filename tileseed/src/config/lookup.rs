//! Configuration sources.

use std::collections::HashMap;
use std::path::Path;

use ini::Ini;

use super::ConfigError;

/// Key prefix shared by every scheduler setting.
const KEY_PREFIX: &str = "TILESEED_";

/// Key prefix routed to the `[pool]` INI section.
const POOL_PREFIX: &str = "POOL_";

/// A source of raw configuration strings, keyed by environment-style names.
pub trait ConfigLookup: Send + Sync {
    /// Returns the raw value for `key`, if this source defines it.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads settings from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLookup;

impl ConfigLookup for EnvLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory settings.
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    values: HashMap<String, String>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigLookup for MapLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Reads settings from an INI file.
///
/// Keys map onto sections by name: `TILESEED_POOL_THREADS` is `threads` in
/// `[pool]`, and `TILESEED_RETRY_COUNT` is `retry_count` in `[seed]`.
///
/// ```ini
/// [seed]
/// retry_count = 3
/// retry_wait = 250
/// abort_limit = 500
///
/// [pool]
/// threads = 8
/// queue_capacity = 2048
/// ```
#[derive(Debug, Clone)]
pub struct IniLookup {
    ini: Ini,
}

impl IniLookup {
    pub fn from_ini(ini: Ini) -> Self {
        Self { ini }
    }

    /// Loads the file at `path`.
    ///
    /// A missing file behaves like an empty one.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::from_ini(Ini::new()));
        }
        let ini = Ini::load_from_file(path)?;
        Ok(Self::from_ini(ini))
    }

    fn section_key(key: &str) -> Option<(&'static str, String)> {
        let name = key.strip_prefix(KEY_PREFIX)?;
        match name.strip_prefix(POOL_PREFIX) {
            Some(rest) => Some(("pool", rest.to_ascii_lowercase())),
            None => Some(("seed", name.to_ascii_lowercase())),
        }
    }
}

impl ConfigLookup for IniLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        let (section, name) = Self::section_key(key)?;
        self.ini
            .get_from(Some(section), &name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Queries several sources in order; the first one defining a key wins.
#[derive(Default)]
pub struct ChainedLookup {
    sources: Vec<Box<dyn ConfigLookup>>,
}

impl ChainedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, source: impl ConfigLookup + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ConfigLookup for ChainedLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.lookup(key))
    }
}

impl std::fmt::Debug for ChainedLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedLookup")
            .field("sources", &self.sources.len())
            .finish()
    }
}
