use crate::app::command_support::{map_config_err, open_store};
use crate::config::{default_global_config_path, load_settings_from, save_settings_to, Settings};
use crate::shared::OpsLog;
use std::fs;

/// Idempotent: an existing config is loaded and validated, never rewritten.
pub fn cmd_setup() -> Result<String, String> {
    let config_path = default_global_config_path().map_err(map_config_err)?;
    let created = !config_path.exists();
    let settings = if created {
        let settings = Settings::default();
        save_settings_to(&config_path, &settings).map_err(map_config_err)?;
        settings
    } else {
        load_settings_from(&config_path).map_err(map_config_err)?
    };

    let state_root = settings.resolve_state_root().map_err(map_config_err)?;
    fs::create_dir_all(state_root.join("logs"))
        .map_err(|e| format!("failed to create {}: {e}", state_root.display()))?;
    let store = open_store(&settings)?;
    let tables = store.table_names().map_err(|e| e.to_string())?;

    OpsLog::new(&state_root).append(
        "info",
        "setup.completed",
        "state root initialized",
        &[("configCreated", serde_json::json!(created))],
    );

    Ok(format!(
        "setup complete\nconfig={}\nconfig_created={}\nstate_root={}\nstore={}\ntables={}\nrunner_configured={}",
        config_path.display(),
        created,
        state_root.display(),
        store.db_path().display(),
        tables.join(","),
        settings.runner_base_url().is_some()
    ))
}
