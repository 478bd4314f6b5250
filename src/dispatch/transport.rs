use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("{0}")]
    Io(String),
}

/// Outbound HTTP to the runner. A non-2xx status is a response, not a
/// transport error; classifying it is the caller's job.
pub trait RunnerTransport: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;

    fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl RunnerTransport for UreqTransport {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let result = request("POST", url, timeout).send_json(body.clone());
        into_response(result, timeout)
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError> {
        into_response(request("GET", url, timeout).call(), timeout)
    }
}

fn request(method: &str, url: &str, timeout: Duration) -> ureq::Request {
    ureq::request(method, url)
        .timeout(timeout)
        .set("accept", "application/json")
        .set("user-agent", concat!("relaydesk/", env!("CARGO_PKG_VERSION")))
}

fn into_response(
    result: Result<ureq::Response, ureq::Error>,
    timeout: Duration,
) -> Result<TransportResponse, TransportError> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(classify_transport_error(&transport, timeout))
        }
    };

    let status = response.status();
    let body = response
        .into_string()
        .map_err(|err| read_error(&err, timeout))?;
    Ok(TransportResponse { status, body })
}

fn classify_transport_error(error: &ureq::Transport, timeout: Duration) -> TransportError {
    let mut source: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return read_error(io, timeout);
        }
        source = err.source();
    }
    let message = error.to_string();
    if message.contains("timed out") {
        return TransportError::Timeout {
            timeout_secs: timeout.as_secs(),
        };
    }
    TransportError::Io(message)
}

fn read_error(error: &std::io::Error, timeout: Duration) -> TransportError {
    match error.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportError::Timeout {
            timeout_secs: timeout.as_secs(),
        },
        _ => TransportError::Io(error.to_string()),
    }
}
