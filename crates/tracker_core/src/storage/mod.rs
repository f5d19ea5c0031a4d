pub mod snapshot;

use crate::error::AppError;
use std::path::{Path, PathBuf};

pub const STORE_ENV_VAR: &str = "TRACKER_STORE_PATH";
const STORE_FILE_NAME: &str = "tasks.csv";

/// Resolves where the snapshot lives: the environment override first, then
/// `configured`, then the per-user default.
pub fn store_path(configured: Option<&Path>) -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    default_store_path()
}

fn default_store_path() -> Result<PathBuf, AppError> {
    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("tracker").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("tracker")
            .join(STORE_FILE_NAME))
    }
}
