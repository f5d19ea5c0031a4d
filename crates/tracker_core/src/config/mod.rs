use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "TRACKER_CONFIG_PATH";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot file used when neither `--store` nor the environment names one.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Upper bound on view history entries. Absent means unbounded.
    #[serde(default)]
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub store_path: Option<PathBuf>,
    /// `Some(None)` lifts a configured limit.
    pub history_limit: Option<Option<usize>>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("tracker")
            .join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("tracker")
            .join(CONFIG_FILE_NAME))
    }
}

/// Never fails: a broken config file yields defaults plus the error so the
/// caller can warn and carry on.
pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    Ok(normalize_store_path(config))
}

fn normalize_store_path(mut config: Config) -> Config {
    config.store_path = config
        .store_path
        .filter(|path| !path.as_os_str().is_empty());
    config
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(store_path) = overrides.store_path.as_ref() {
        merged.store_path = Some(store_path.clone());
    }
    if let Some(history_limit) = overrides.history_limit {
        merged.history_limit = history_limit;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::{
        Config, ConfigOverrides, load_config_from_path, load_config_with_fallback_from_path,
        merge_overrides,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("tracker-{nanos}-{file_name}"))
    }

    #[test]
    fn load_config_missing_returns_defaults() {
        let path = temp_path("missing-config.json");
        let result = load_config_with_fallback_from_path(&path);

        assert_eq!(result.config, Config::default());
        assert!(result.error.is_none());
    }

    #[test]
    fn load_config_invalid_returns_defaults_and_error() {
        let path = temp_path("invalid-config.json");
        fs::write(&path, "{ invalid json ").unwrap();

        let result = load_config_with_fallback_from_path(&path);
        fs::remove_file(&path).ok();

        assert_eq!(result.config, Config::default());
        assert_eq!(result.error.map(|err| err.code()), Some("invalid_data"));
    }

    #[test]
    fn load_config_reads_valid_file() {
        let path = temp_path("valid-config.json");
        let content = serde_json::json!({
            "store_path": "/tmp/tracker/tasks.csv",
            "history_limit": 10
        });
        fs::write(&path, serde_json::to_string(&content).unwrap()).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(
            loaded.store_path,
            Some(PathBuf::from("/tmp/tracker/tasks.csv"))
        );
        assert_eq!(loaded.history_limit, Some(10));
    }

    #[test]
    fn load_config_treats_empty_store_path_as_unset() {
        let path = temp_path("empty-store-config.json");
        fs::write(&path, r#"{ "store_path": "" }"#).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.store_path, None);
    }

    #[test]
    fn load_config_rejects_negative_history_limit() {
        let path = temp_path("negative-limit.json");
        fs::write(&path, r#"{ "history_limit": -1 }"#).unwrap();

        let err = load_config_from_path(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn merge_overrides_replaces_given_fields_only() {
        let base = Config {
            store_path: Some(PathBuf::from("base.csv")),
            history_limit: Some(5),
        };
        let overrides = ConfigOverrides {
            store_path: Some(PathBuf::from("override.csv")),
            history_limit: None,
        };

        let merged = merge_overrides(&base, &overrides);

        assert_eq!(merged.store_path, Some(PathBuf::from("override.csv")));
        assert_eq!(merged.history_limit, Some(5));
        assert_eq!(base.store_path, Some(PathBuf::from("base.csv")));
    }

    #[test]
    fn merge_overrides_can_lift_history_limit() {
        let base = Config {
            store_path: None,
            history_limit: Some(5),
        };
        let overrides = ConfigOverrides {
            store_path: None,
            history_limit: Some(None),
        };

        assert_eq!(merge_overrides(&base, &overrides).history_limit, None);
    }

    #[test]
    fn merge_overrides_with_empty_overrides_returns_clone() {
        let base = Config {
            store_path: Some(PathBuf::from("tasks.csv")),
            history_limit: Some(3),
        };

        let merged = merge_overrides(&base, &ConfigOverrides::default());

        assert_eq!(merged, base);
    }
}
