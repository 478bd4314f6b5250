use super::{default_global_config_path, ConfigError, Settings};
use std::path::Path;

pub const RUNNER_URL_ENV: &str = "RELAYDESK_RUNNER_URL";
pub const CALLBACK_SECRET_ENV: &str = "RELAYDESK_CALLBACK_SECRET";

pub fn load_global_settings() -> Result<Settings, ConfigError> {
    let path = default_global_config_path()?;
    load_settings_from(&path)
}

/// Reads, applies environment overrides, then validates.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let mut settings = Settings::from_path(path)?;
    settings.apply_overrides(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}
