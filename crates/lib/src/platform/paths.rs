use crate::consts::{APP_NAME, INVENTORY_DIR_ENV, STATE_DIR_ENV};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the root of the scope state partitions.
///
/// `SCOPEDEPLOY_STATE_DIR` wins over the configured directory, which wins over
/// `{data_dir}/state`.
pub fn state_dir(configured: Option<&PathBuf>) -> PathBuf {
  if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  configured.cloned().unwrap_or_else(|| data_dir().join("state"))
}

/// Returns the directory of the local provider's simulated inventory.
pub fn inventory_dir(configured: Option<&PathBuf>) -> PathBuf {
  if let Ok(dir) = std::env::var(INVENTORY_DIR_ENV) {
    return PathBuf::from(dir);
  }
  configured.cloned().unwrap_or_else(|| data_dir().join("inventory"))
}
