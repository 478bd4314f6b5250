//! Classifies inbound requests as primary-caller or runner-callback.
//!
//! The classification is carried as a [`RequestOrigin`] value through every
//! handler. Only [`RequestOrigin::PrimaryCaller`] holds a [`CallerSession`],
//! and a `CallerSession` is what synchronous delegation requires, so callback
//! handling has no way to re-enter the runner for the same operation.

use crate::config::Settings;
use crate::shared::TenantId;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RUNNER_SECRET_HEADER: &str = "x-relaydesk-runner-secret";
pub const AUTHORIZATION_HEADER: &str = "authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SuperAdmin,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err("role must be one of: super_admin, admin, member".to_string()),
        }
    }

    pub fn can_mutate(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

/// What a session verifier vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub role: Role,
}

/// An authenticated primary caller. Constructed only by [`OriginGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerSession {
    tenant_id: TenantId,
    user_id: String,
    role: Role,
}

impl CallerSession {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackContext {
    tenant_id: TenantId,
}

impl CallbackContext {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOrigin {
    PrimaryCaller(CallerSession),
    RunnerCallback(CallbackContext),
}

impl RequestOrigin {
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::PrimaryCaller(session) => session.tenant_id(),
            Self::RunnerCallback(context) => context.tenant_id(),
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Self::RunnerCallback(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PrimaryCaller(_) => "primary_caller",
            Self::RunnerCallback(_) => "runner_callback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
    #[error("missing bearer token")]
    MissingCredentials,
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("runner secret header does not match")]
    InvalidCallbackSecret,
    #[error("runner callback must carry tenantId")]
    MissingCallbackTenant,
    #[error("invalid callback tenantId: {0}")]
    InvalidCallbackTenant(String),
}

pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<SessionClaims>;
}

/// Fixed token table loaded from settings.
#[derive(Debug, Clone, Default)]
pub struct StaticSessions {
    tokens: BTreeMap<String, SessionClaims>,
}

impl StaticSessions {
    pub fn new(tokens: BTreeMap<String, SessionClaims>) -> Self {
        Self { tokens }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, String> {
        let mut tokens = BTreeMap::new();
        for (token, session) in &settings.sessions {
            tokens.insert(
                token.trim().to_string(),
                SessionClaims {
                    tenant_id: TenantId::parse(&session.tenant_id)?,
                    user_id: session.user_id.trim().to_string(),
                    role: Role::parse(&session.role)?,
                },
            );
        }
        Ok(Self { tokens })
    }
}

impl SessionVerifier for StaticSessions {
    fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.tokens.get(token).cloned()
    }
}

/// Request metadata the transport layer hands to the guard. Header names
/// are expected lowercase.
#[derive(Debug, Clone, Copy)]
pub struct InboundSignals<'a> {
    pub headers: &'a BTreeMap<String, String>,
    pub query: &'a BTreeMap<String, String>,
    pub body: Option<&'a Value>,
}

#[derive(Clone)]
pub struct OriginGuard {
    callback_secret_digest: Option<[u8; 32]>,
    sessions: Arc<dyn SessionVerifier>,
}

impl OriginGuard {
    pub fn new(callback_secret: Option<&str>, sessions: Arc<dyn SessionVerifier>) -> Self {
        let callback_secret_digest = callback_secret
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .map(digest);
        Self {
            callback_secret_digest,
            sessions,
        }
    }

    pub fn accepts_callbacks(&self) -> bool {
        self.callback_secret_digest.is_some()
    }

    pub fn classify(&self, signals: InboundSignals<'_>) -> Result<RequestOrigin, OriginError> {
        if let Some(presented) = signals.headers.get(RUNNER_SECRET_HEADER) {
            let Some(expected) = &self.callback_secret_digest else {
                return Err(OriginError::InvalidCallbackSecret);
            };
            if !constant_time_eq(&digest(presented.trim()), expected) {
                return Err(OriginError::InvalidCallbackSecret);
            }
            let tenant_id = callback_tenant(signals)?;
            return Ok(RequestOrigin::RunnerCallback(CallbackContext { tenant_id }));
        }

        let token = signals
            .headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| {
                let value = value.trim();
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(OriginError::MissingCredentials)?;
        let claims = self
            .sessions
            .verify(token)
            .ok_or(OriginError::InvalidToken)?;
        Ok(RequestOrigin::PrimaryCaller(CallerSession {
            tenant_id: claims.tenant_id,
            user_id: claims.user_id,
            role: claims.role,
        }))
    }
}

fn callback_tenant(signals: InboundSignals<'_>) -> Result<TenantId, OriginError> {
    let from_body = |key: &str| {
        signals
            .body
            .and_then(|body| body.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let raw = signals
        .query
        .get("tenantId")
        .cloned()
        .or_else(|| from_body("tenantId"))
        .or_else(|| from_body("tenant_id"))
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(OriginError::MissingCallbackTenant)?;
    TenantId::parse(&raw).map_err(OriginError::InvalidCallbackTenant)
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(left: &[u8; 32], right: &[u8; 32]) -> bool {
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (l, r)| acc | (l ^ r))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TENANT: &str = "99999999-9999-4999-8999-999999999999";

    fn guard() -> OriginGuard {
        let mut tokens = BTreeMap::new();
        tokens.insert(
            "member-token".to_string(),
            SessionClaims {
                tenant_id: TenantId::parse(TENANT).expect("tenant"),
                user_id: "u-1".to_string(),
                role: Role::Member,
            },
        );
        OriginGuard::new(Some("runner-secret"), Arc::new(StaticSessions::new(tokens)))
    }

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn secret_header_with_body_tenant_is_a_callback() {
        let headers = headers(&[(RUNNER_SECRET_HEADER, "runner-secret")]);
        let query = BTreeMap::new();
        let body = json!({"tenantId": TENANT});
        let origin = guard()
            .classify(InboundSignals {
                headers: &headers,
                query: &query,
                body: Some(&body),
            })
            .expect("classify");
        assert!(origin.is_callback());
        assert_eq!(origin.tenant_id().as_str(), TENANT);
    }

    #[test]
    fn wrong_secret_is_rejected_rather_than_downgraded() {
        let headers = headers(&[
            (RUNNER_SECRET_HEADER, "guess"),
            (AUTHORIZATION_HEADER, "Bearer member-token"),
        ]);
        let query = BTreeMap::new();
        let err = guard()
            .classify(InboundSignals {
                headers: &headers,
                query: &query,
                body: None,
            })
            .expect_err("mismatch");
        assert_eq!(err, OriginError::InvalidCallbackSecret);
    }

    #[test]
    fn bearer_token_yields_a_primary_caller_session() {
        let headers = headers(&[(AUTHORIZATION_HEADER, "Bearer member-token")]);
        let query = BTreeMap::new();
        let origin = guard()
            .classify(InboundSignals {
                headers: &headers,
                query: &query,
                body: None,
            })
            .expect("classify");
        match origin {
            RequestOrigin::PrimaryCaller(session) => {
                assert_eq!(session.user_id(), "u-1");
                assert!(!session.role().can_mutate());
            }
            other => panic!("unexpected origin {other:?}"),
        }
    }

    #[test]
    fn constant_time_comparison_matches_plain_equality() {
        assert!(constant_time_eq(&digest("a"), &digest("a")));
        assert!(!constant_time_eq(&digest("a"), &digest("b")));
    }
}
