use super::{default_global_config_path, ConfigError, Settings};
use crate::shared::fs_atomic::write_file_atomically;
use std::path::{Path, PathBuf};

pub fn save_settings(settings: &Settings) -> Result<PathBuf, ConfigError> {
    let path = default_global_config_path()?;
    save_settings_to(&path, settings)?;
    Ok(path)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    settings.validate()?;
    let body = serde_yaml::to_string(settings).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    write_file_atomically(path, body.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.yaml");
        let mut settings = Settings::default();
        settings.runner.base_url = Some("http://127.0.0.1:5678".to_string());
        settings.side_effects.workers = 3;

        save_settings_to(&path, &settings).expect("save");
        let loaded = Settings::from_path(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn invalid_settings_are_not_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        let mut settings = Settings::default();
        settings.runner.timeout_secs = 0;

        assert!(save_settings_to(&path, &settings).is_err());
        assert!(!path.exists());
    }
}
