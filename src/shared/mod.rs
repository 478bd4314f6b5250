pub mod fs_atomic;
pub mod ids;
pub mod logging;

pub use ids::{generate_uuid_v4, validate_uuid_value, DocumentId, TenantId};
pub use logging::OpsLog;

use chrono::{Datelike, SecondsFormat, Utc};

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn current_year() -> i32 {
    Utc::now().year()
}
