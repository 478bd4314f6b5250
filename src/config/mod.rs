pub mod error;
pub mod load;
pub mod paths;
pub mod save;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_global_settings, load_settings_from, CALLBACK_SECRET_ENV, RUNNER_URL_ENV};
pub use paths::{
    default_global_config_path, default_state_root, GLOBAL_SETTINGS_FILE_NAME, GLOBAL_STATE_DIR,
    STORE_FILE_NAME,
};
pub use save::{save_settings, save_settings_to};
pub use settings::{
    LocalFallbackConfig, RunnerConfig, SessionConfig, Settings, SideEffectsConfig,
    DEFAULT_RUNNER_TIMEOUT_SECS,
};
