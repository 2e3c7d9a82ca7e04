use facematch_gemini::GeminiConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest image accepted over D-Bus. Gemini caps inline request data at 20 MB.
const DEFAULT_MAX_IMAGE_BYTES: usize = 15 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Gemini(#[from] facematch_gemini::ConfigError),
}

/// Daemon configuration: optional TOML file, then `FACEMATCH_*` environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Images larger than this are rejected before encoding.
    pub max_image_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl Config {
    /// Load from the process environment. A missing API key is an error.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match config_path(&lookup) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.gemini.api_key()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        self.gemini.apply_env(lookup)?;
        if let Some(raw) = lookup("FACEMATCH_MAX_IMAGE_BYTES") {
            self.daemon.max_image_bytes =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "FACEMATCH_MAX_IMAGE_BYTES",
                    value: raw,
                })?;
        }
        Ok(())
    }
}

/// `$FACEMATCH_CONFIG`, else `$XDG_CONFIG_HOME/facematch/config.toml`,
/// else `~/.config/facematch/config.toml`.
fn config_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(path) = lookup("FACEMATCH_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let config_home = lookup("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(config_home.join("facematch").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_string_lossy().into_owned();
        let err = Config::load_with(vars(&[("HOME", home)])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Gemini(facematch_gemini::ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn test_env_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(vars(&[
            ("XDG_CONFIG_HOME", dir.path().to_string_lossy().into_owned()),
            ("GEMINI_API_KEY", "k".into()),
            ("FACEMATCH_MAX_IMAGE_BYTES", "1024".into()),
        ]))
        .unwrap();
        assert_eq!(config.gemini.api_key().unwrap(), "k");
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert_eq!(config.daemon.max_image_bytes, 1024);
    }

    #[test]
    fn test_file_then_env_overrides() {
        let (_dir, path) = write_config(
            r#"
[gemini]
api_key = "from-file"
model = "gemini-2.0-flash"
timeout_secs = 30

[daemon]
max_image_bytes = 2048
"#,
        );

        let config = Config::load_with(vars(&[
            ("FACEMATCH_CONFIG", path.to_string_lossy().into_owned()),
            ("FACEMATCH_MODEL", "gemini-2.5-pro".into()),
        ]))
        .unwrap();

        assert_eq!(config.gemini.api_key().unwrap(), "from-file");
        assert_eq!(config.gemini.model, "gemini-2.5-pro");
        assert_eq!(config.gemini.timeout_secs, 30);
        assert_eq!(config.daemon.max_image_bytes, 2048);
    }

    #[test]
    fn test_xdg_config_home_location() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("facematch");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "[gemini]\napi_key = \"xdg\"\n").unwrap();

        let config = Config::load_with(vars(&[(
            "XDG_CONFIG_HOME",
            dir.path().to_string_lossy().into_owned(),
        )]))
        .unwrap();
        assert_eq!(config.gemini.api_key().unwrap(), "xdg");
        assert_eq!(config.daemon.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
    }

    #[test]
    fn test_invalid_file() {
        let (_dir, path) = write_config("[gemini\napi_key = ");
        let err = Config::load_with(vars(&[(
            "FACEMATCH_CONFIG",
            path.to_string_lossy().into_owned(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_invalid_max_image_bytes() {
        let err = Config::load_with(vars(&[
            ("FACEMATCH_API_KEY", "k".into()),
            ("FACEMATCH_CONFIG", "/nonexistent/facematch.toml".into()),
            ("FACEMATCH_MAX_IMAGE_BYTES", "lots".into()),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "FACEMATCH_MAX_IMAGE_BYTES", .. }
        ));
    }
}
