//! Transport-agnostic request surface over the document service.
//!
//! An HTTP server, the CLI `request` command and the tests all feed
//! [`ApiRequest`] values through [`Api::handle`]. The same routes serve
//! primary callers and runner callbacks; the [`OriginGuard`] tells them
//! apart.

pub mod error;
pub mod router;

pub use error::ApiError;
pub use router::{match_route, Method, Route};

use crate::dispatch::from_runner_case;
use crate::documents::{DocumentAction, DocumentListQuery, DocumentService, ServiceReply};
use crate::origin::{InboundSignals, OriginGuard, RequestOrigin};
use crate::shared::OpsLog;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// `target` may carry a query string (`/api/invoices?page=2`).
    pub fn new(method: &str, target: &str) -> Self {
        let (path, raw_query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: path.to_string(),
            headers: BTreeMap::new(),
            query: parse_query(raw_query),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.trim().to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(
            crate::origin::AUTHORIZATION_HEADER,
            &format!("Bearer {token}"),
        )
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

fn parse_query(raw: &str) -> BTreeMap<String, String> {
    let decode = |part: &str| {
        let spaced = part.replace('+', " ");
        urlencoding::decode(&spaced)
            .map(|value| value.into_owned())
            .unwrap_or(spaced)
    };
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn from_error(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            body: err.body(),
        }
    }

    fn from_reply(reply: ServiceReply) -> Self {
        let mut body = Map::new();
        body.insert("success".to_string(), json!(true));
        if let Some(message) = reply.message {
            body.insert("message".to_string(), json!(message));
        }
        body.insert("data".to_string(), reply.data);
        Self {
            status: if reply.created { 201 } else { 200 },
            body: Value::Object(body),
        }
    }
}

#[derive(Clone)]
pub struct Api {
    guard: OriginGuard,
    service: DocumentService,
    ops: OpsLog,
}

impl Api {
    pub fn new(guard: OriginGuard, service: DocumentService, ops: OpsLog) -> Self {
        Self {
            guard,
            service,
            ops,
        }
    }

    pub fn service(&self) -> &DocumentService {
        &self.service
    }

    /// Never fails: every error is rendered as a `{success: false}` body.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let mut origin_label = "unclassified";
        let (response, execution) = match self.route_and_run(request, &mut origin_label) {
            Ok(reply) => {
                let execution = reply.path.label();
                (ApiResponse::from_reply(reply), execution)
            }
            Err(err) => (ApiResponse::from_error(&err), "none"),
        };

        let fields = [
            ("method", json!(request.method)),
            ("path", json!(request.path)),
            ("status", json!(response.status)),
            ("origin", json!(origin_label)),
            ("executionPath", json!(execution)),
        ];
        if response.is_success() {
            self.ops
                .append("info", "api.request.completed", "request served", &fields);
        } else {
            let message = response
                .body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            let level = if response.status >= 500 { "error" } else { "warn" };
            self.ops
                .append(level, "api.request.failed", message, &fields);
        }
        response
    }

    fn route_and_run(
        &self,
        request: &ApiRequest,
        origin_label: &mut &'static str,
    ) -> Result<ServiceReply, ApiError> {
        let route = Method::parse(&request.method)
            .and_then(|method| match_route(method, &request.path))
            .ok_or_else(|| {
                ApiError::NotFound(format!("no route for {} {}", request.method, request.path))
            })?;

        let origin = self.guard.classify(InboundSignals {
            headers: &request.headers,
            query: &request.query,
            body: request.body.as_ref(),
        })?;
        *origin_label = origin.label();

        let body = match (&origin, &request.body) {
            (RequestOrigin::RunnerCallback(_), Some(body)) => Some(from_runner_case(body)),
            (_, body) => body.clone(),
        };

        let reply = match route.action {
            DocumentAction::List => {
                let query = DocumentListQuery::from_params(
                    request.query.get("status").map(String::as_str),
                    request.query.get("page").map(String::as_str),
                    request.query.get("limit").map(String::as_str),
                )
                .map_err(ApiError::Validation)?;
                self.service.list(&origin, route.kind, &query)?
            }
            DocumentAction::Get => {
                self.service
                    .get(&origin, route.kind, route.id.as_deref().unwrap_or_default())?
            }
            DocumentAction::Create => {
                let body = body
                    .filter(Value::is_object)
                    .ok_or_else(|| {
                        ApiError::Validation("request body must be a JSON object".to_string())
                    })?;
                self.service.create(&origin, route.kind, &body)?
            }
            action => self.service.transition(
                &origin,
                route.kind,
                route.id.as_deref().unwrap_or_default(),
                action,
            )?,
        };
        Ok(reply)
    }
}
