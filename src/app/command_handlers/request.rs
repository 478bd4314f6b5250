use crate::api::ApiRequest;
use crate::app::cli::ParsedArgs;
use crate::app::command_support::{load_settings, required};
use crate::app::AppContext;
use crate::origin::RUNNER_SECRET_HEADER;
use serde_json::Value;

/// Runs one request through the same surface an HTTP server would use.
/// Queued side effects are drained before the command returns.
pub fn cmd_request(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk request <METHOD> <path> [--token T] [--callback] [--tenant T] [--body JSON]";
    let parsed = ParsedArgs::parse(
        args,
        &["--token", "--tenant", "--body"],
        &["--callback"],
    )?;
    let method = required(&parsed.positional, 0, usage)?;
    let target = required(&parsed.positional, 1, usage)?;

    let settings = load_settings()?;
    let mut request = ApiRequest::new(method, target);
    if let Some(token) = parsed.value("--token") {
        request = request.with_bearer(token);
    }
    if parsed.has("--callback") {
        let secret = settings
            .runner
            .callback_secret
            .as_deref()
            .ok_or("runner.callback_secret is not configured; callbacks are disabled")?;
        request = request.with_header(RUNNER_SECRET_HEADER, secret);
    }
    if let Some(tenant) = parsed.value("--tenant") {
        request
            .query
            .insert("tenantId".to_string(), tenant.to_string());
    }
    if let Some(raw) = parsed.value("--body") {
        let body: Value =
            serde_json::from_str(raw).map_err(|e| format!("--body is not valid json: {e}"))?;
        request = request.with_body(body);
    }

    let context = AppContext::open(settings).map_err(|e| e.to_string())?;
    let response = context.api().handle(&request);
    context.shutdown();

    let body = serde_json::to_string(&response.body)
        .map_err(|e| format!("failed to encode response: {e}"))?;
    let rendered = format!("status={}\nbody={body}", response.status);
    if response.is_success() {
        Ok(rendered)
    } else {
        Err(rendered)
    }
}
