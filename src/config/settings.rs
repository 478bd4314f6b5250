use super::{default_state_root, ConfigError, STORE_FILE_NAME};
use crate::dispatch::EventType;
use crate::origin::Role;
use crate::shared::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RUNNER_TIMEOUT_SECS: u64 = 30;
const MAX_RUNNER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_root: Option<PathBuf>,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub side_effects: SideEffectsConfig,
    #[serde(default)]
    pub local_fallback: LocalFallbackConfig,
    /// Bearer token → session claims, for the bundled session verifier.
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Absent means no operation can be delegated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Absent means no request is ever classified as a runner callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            callback_secret: None,
            timeout_secs: DEFAULT_RUNNER_TIMEOUT_SECS,
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SideEffectsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SideEffectsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Whether a primary-caller mutation with no tenant delegation may run
/// against the local store instead of the runner's default webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocalFallbackConfig {
    #[serde(default = "default_true")]
    pub default: bool,
    #[serde(default)]
    pub overrides: BTreeMap<String, bool>,
}

impl Default for LocalFallbackConfig {
    fn default() -> Self {
        Self {
            default: true,
            overrides: BTreeMap::new(),
        }
    }
}

impl LocalFallbackConfig {
    pub fn permits(&self, event: &EventType) -> bool {
        self.overrides
            .get(&event.as_string())
            .copied()
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub tenant_id: String,
    pub user_id: String,
    pub role: String,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_RUNNER_TIMEOUT_SECS
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Replaces runner URL and callback secret with non-blank values from
    /// `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(url) = non_blank(super::RUNNER_URL_ENV) {
            self.runner.base_url = Some(url);
        }
        if let Some(secret) = non_blank(super::CALLBACK_SECRET_ENV) {
            self.runner.callback_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(root) = &self.state_root {
            if !root.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }

        if let Some(url) = &self.runner.base_url {
            let trimmed = url.trim();
            let has_host = trimmed
                .strip_prefix("http://")
                .or_else(|| trimmed.strip_prefix("https://"))
                .is_some_and(|rest| !rest.trim_matches('/').is_empty());
            if !has_host {
                return Err(ConfigError::Settings(format!(
                    "`runner.base_url` must be an http:// or https:// url, got `{url}`"
                )));
            }
        }
        if let Some(secret) = &self.runner.callback_secret {
            if secret.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`runner.callback_secret` must be non-empty when set".to_string(),
                ));
            }
        }
        if !(1..=MAX_RUNNER_TIMEOUT_SECS).contains(&self.runner.timeout_secs) {
            return Err(ConfigError::Settings(format!(
                "`runner.timeout_secs` must be between 1 and {MAX_RUNNER_TIMEOUT_SECS}"
            )));
        }

        if self.side_effects.workers == 0 {
            return Err(ConfigError::Settings(
                "`side_effects.workers` must be > 0".to_string(),
            ));
        }
        if self.side_effects.queue_capacity == 0 {
            return Err(ConfigError::Settings(
                "`side_effects.queue_capacity` must be > 0".to_string(),
            ));
        }

        for event in self.local_fallback.overrides.keys() {
            EventType::parse(event).map_err(|err| {
                ConfigError::Settings(format!("`local_fallback.overrides`: {err}"))
            })?;
        }

        for (token, session) in &self.sessions {
            if token.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`sessions` tokens must be non-empty".to_string(),
                ));
            }
            TenantId::parse(&session.tenant_id).map_err(|err| {
                ConfigError::Settings(format!("session `{}`: {err}", session.user_id))
            })?;
            if session.user_id.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "session `user_id` must be non-empty".to_string(),
                ));
            }
            Role::parse(&session.role).map_err(|err| {
                ConfigError::Settings(format!("session `{}`: {err}", session.user_id))
            })?;
        }

        Ok(())
    }

    pub fn resolve_state_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_root {
            Some(root) => Ok(root.clone()),
            None => default_state_root(),
        }
    }

    pub fn resolve_store_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.resolve_state_root()?.join(STORE_FILE_NAME))
    }

    pub fn runner_base_url(&self) -> Option<&str> {
        self.runner
            .base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}
