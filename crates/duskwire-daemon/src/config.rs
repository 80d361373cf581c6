//! Loads the startup configuration (§6 "Environment / startup") from TOML,
//! falling back to defaults when no file is present. This is the only place
//! in the workspace that touches the filesystem for configuration; the core
//! crates only ever see a parsed [`DuskwireConfig`].

use std::path::{Path, PathBuf};

use duskwire_types::config::DuskwireConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Default location for the daemon's config file, under the OS config dir.
pub fn default_config_path() -> PathBuf {
    dirs_next_data_dir().join("duskwire.toml")
}

fn dirs_next_data_dir() -> PathBuf {
    std::env::var_os("DUSKWIRE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".duskwire"))
                .unwrap_or_else(|| PathBuf::from(".duskwire"))
        })
}

/// Loads config from `path` if it exists, otherwise returns the default
/// configuration (§6: the daemon must be runnable with no config file).
pub fn load(path: &Path) -> Result<DuskwireConfig, ConfigError> {
    if !path.exists() {
        return Ok(DuskwireConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load(Path::new("/nonexistent/duskwire.toml")).expect("default config");
        assert_eq!(cfg.start_port, duskwire_types::config::DEFAULT_START_PORT);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = std::env::temp_dir().join("duskwire-config-test-malformed");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("duskwire.toml");
        std::fs::write(&path, "not = [valid toml").expect("write temp file");
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }
}
