use relaydesk::config::{
    save_settings_to, ConfigError, Settings, CALLBACK_SECRET_ENV, RUNNER_URL_ENV,
};
use relaydesk::dispatch::EventType;
use relaydesk::documents::{DocumentAction, DocumentKind};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
state_root: /var/lib/relaydesk
runner:
  base_url: http://runner.internal:5678/
  callback_secret: shared-secret
  timeout_secs: 12
side_effects:
  workers: 4
  queue_capacity: 32
local_fallback:
  default: false
  overrides:
    invoice_create: true
sessions:
  tok-admin:
    tenant_id: 4b4b4b4b-4b4b-4b4b-8b4b-4b4b4b4b4b4b
    user_id: u-1
    role: admin
"#;

fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(&path, body).expect("write config");
    (dir, path)
}

fn settings_error(body: &str) -> String {
    let (_dir, path) = write_config(body);
    let settings = Settings::from_path(&path).expect("parse");
    match settings.validate() {
        Err(ConfigError::Settings(message)) => message,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn a_full_config_file_loads_and_validates() {
    let (_dir, path) = write_config(FULL_CONFIG);
    let settings = Settings::from_path(&path).expect("parse");
    settings.validate().expect("valid");

    assert_eq!(settings.runner_base_url(), Some("http://runner.internal:5678"));
    assert_eq!(settings.runner.timeout(), Duration::from_secs(12));
    assert_eq!(settings.side_effects.workers, 4);
    assert_eq!(
        settings.resolve_store_path().expect("store path"),
        std::path::PathBuf::from("/var/lib/relaydesk/relaydesk.db")
    );
    assert!(settings
        .local_fallback
        .permits(&EventType::document(DocumentKind::Invoice, DocumentAction::Create)));
    assert!(!settings
        .local_fallback
        .permits(&EventType::document(DocumentKind::Quote, DocumentAction::Create)));
    assert_eq!(settings.sessions["tok-admin"].role, "admin");
}

#[test]
fn environment_overrides_replace_runner_settings_when_non_blank() {
    let (_dir, path) = write_config(FULL_CONFIG);
    let mut settings = Settings::from_path(&path).expect("parse");

    settings.apply_overrides(|key| match key {
        RUNNER_URL_ENV => Some("https://runner.example.com".to_string()),
        CALLBACK_SECRET_ENV => Some("   ".to_string()),
        _ => None,
    });
    assert_eq!(settings.runner_base_url(), Some("https://runner.example.com"));
    assert_eq!(settings.runner.callback_secret.as_deref(), Some("shared-secret"));
}

#[test]
fn invalid_values_are_reported_with_their_key() {
    assert!(settings_error("runner:\n  base_url: ftp://runner\n").contains("runner.base_url"));
    assert!(settings_error("runner:\n  timeout_secs: 0\n").contains("runner.timeout_secs"));
    assert!(settings_error("state_root: relative/dir\n").contains("state_root"));
    assert!(settings_error("side_effects:\n  workers: 0\n").contains("side_effects.workers"));
    assert!(
        settings_error("local_fallback:\n  overrides:\n    ghost_event: true\n")
            .contains("local_fallback.overrides")
    );
    assert!(settings_error(
        "sessions:\n  t:\n    tenant_id: 4b4b4b4b-4b4b-4b4b-8b4b-4b4b4b4b4b4b\n    user_id: u\n    role: owner\n"
    )
    .contains("session `u`"));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let (_dir, path) = write_config("runner: [unterminated\n");
    assert!(matches!(
        Settings::from_path(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn saved_settings_round_trip_through_the_file() {
    let (_dir, path) = write_config(FULL_CONFIG);
    let settings = Settings::from_path(&path).expect("parse");
    let target = path.with_file_name("copy.yaml");

    save_settings_to(&target, &settings).expect("save");
    assert_eq!(Settings::from_path(&target).expect("reload"), settings);
}
