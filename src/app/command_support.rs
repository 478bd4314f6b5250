use crate::config::{default_global_config_path, load_settings_from, ConfigError, Settings};
use crate::dispatch::EventType;
use crate::shared::TenantId;
use crate::store::Store;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn load_settings() -> Result<Settings, String> {
    let path = default_global_config_path().map_err(map_config_err)?;
    if !path.exists() {
        return Err(format!(
            "no config at {}; run `relaydesk setup` first",
            path.display()
        ));
    }
    load_settings_from(&path).map_err(map_config_err)
}

pub fn open_store(settings: &Settings) -> Result<Store, String> {
    let path = settings.resolve_store_path().map_err(map_config_err)?;
    let store = Store::open(&path).map_err(|e| e.to_string())?;
    store.ensure_schema().map_err(|e| e.to_string())?;
    Ok(store)
}

pub fn parse_tenant(raw: &str) -> Result<TenantId, String> {
    TenantId::parse(raw)
}

pub fn parse_event(raw: &str) -> Result<EventType, String> {
    EventType::parse(raw)
}

pub fn required<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("usage: {usage}"))
}
