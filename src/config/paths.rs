use crate::config::ConfigError;
use std::path::PathBuf;

pub const GLOBAL_STATE_DIR: &str = ".relaydesk";
pub const GLOBAL_SETTINGS_FILE_NAME: &str = "config.yaml";
pub const STORE_FILE_NAME: &str = "relaydesk.db";

fn home_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or(ConfigError::HomeDirectoryUnavailable)
}

pub fn default_state_root() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(GLOBAL_STATE_DIR))
}

pub fn default_global_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_state_root()?.join(GLOBAL_SETTINGS_FILE_NAME))
}
