use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn dispatch_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/dispatch.log")
}

/// Append-only JSON-lines operational log.
///
/// Writes are best effort: a log that cannot be written never fails the
/// operation that tried to write it.
#[derive(Debug, Clone)]
pub struct OpsLog {
    path: Option<PathBuf>,
}

impl OpsLog {
    pub fn new(state_root: &Path) -> Self {
        Self {
            path: Some(dispatch_log_path(state_root)),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, event: &str, message: &str) {
        self.append("info", event, message, &[]);
    }

    pub fn warn(&self, event: &str, message: &str) {
        self.append("warn", event, message, &[]);
    }

    pub fn error(&self, event: &str, message: &str) {
        self.append("error", event, message, &[]);
    }

    pub fn append(&self, level: &str, event: &str, message: &str, fields: &[(&str, Value)]) {
        let Some(path) = &self.path else {
            return;
        };

        let mut payload = Map::new();
        payload.insert("timestamp".to_string(), Value::from(super::now_rfc3339()));
        payload.insert("level".to_string(), Value::String(level.to_string()));
        payload.insert("event".to_string(), Value::String(event.to_string()));
        payload.insert("message".to_string(), Value::String(message.to_string()));
        for (key, value) in fields {
            payload.insert((*key).to_string(), value.clone());
        }

        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };

        if let Some(parent) = path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}
