//! Helpers shared by commands.

use std::path::Path;
use tileseed::config::{ChainedLookup, EnvLookup, IniLookup};

use crate::error::CliError;

/// Configuration sources in precedence order: config file, then environment.
pub fn config_lookup(config_file: Option<&Path>) -> Result<ChainedLookup, CliError> {
    let mut lookup = ChainedLookup::new();
    if let Some(path) = config_file {
        lookup = lookup.then(IniLookup::from_file(path)?);
    }
    Ok(lookup.then(EnvLookup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tileseed::config::{ConfigLookup, SeedConfig};

    #[test]
    fn test_file_overrides_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[seed]\nretry_count = 4").unwrap();

        let lookup = config_lookup(Some(file.path())).unwrap();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.lookup("TILESEED_RETRY_COUNT").as_deref(), Some("4"));
        assert_eq!(SeedConfig::resolve(&lookup).unwrap().tile_failure_retry_count, 4);
    }

    #[test]
    fn test_environment_only() {
        let lookup = config_lookup(None).unwrap();
        assert_eq!(lookup.len(), 1);
    }
}
