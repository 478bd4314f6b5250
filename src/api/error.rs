use crate::dispatch::{DispatchError, RoutingError};
use crate::documents::DocumentError;
use crate::origin::OriginError;
use serde_json::{json, Value};

/// Failure taxonomy of the request surface. Each variant owns one status
/// code and one `kind` label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    State(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::Internal(_) => 500,
            Self::Upstream(_) => 502,
            Self::Validation(_) | Self::State(_) => 400,
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Upstream(_) => "upstream",
            Self::Validation(_) => "validation",
            Self::Unauthenticated(_) => "authentication",
            Self::Forbidden(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::State(_) => "state",
            Self::Internal(_) => "internal",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Dispatch misconfigured",
            Self::Upstream(_) => "Runner failure",
            Self::Validation(_) => "Invalid request",
            Self::Unauthenticated(_) => "Unauthenticated",
            Self::Forbidden(_) => "Access denied",
            Self::NotFound(_) => "Not found",
            Self::State(_) => "Illegal state transition",
            Self::Internal(_) => "Server error",
        }
    }

    pub fn body(&self) -> Value {
        json!({
            "success": false,
            "error": self.title(),
            "message": self.to_string(),
            "kind": self.kind(),
        })
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        let message = err.to_string();
        match err {
            DocumentError::Validation(_) => Self::Validation(message),
            DocumentError::NotFound { .. } => Self::NotFound(message),
            DocumentError::Forbidden { .. } => Self::Forbidden(message),
            DocumentError::State(_) | DocumentError::StateChanged { .. } => Self::State(message),
            DocumentError::Dispatch(err) => err.into(),
            DocumentError::Store(_) | DocumentError::Internal(_) => Self::Internal(message),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        if err.is_configuration() {
            return Self::Configuration(message);
        }
        match err {
            DispatchError::Routing(RoutingError::Lookup { .. }) => Self::Internal(message),
            _ => Self::Upstream(message),
        }
    }
}

impl From<OriginError> for ApiError {
    fn from(err: OriginError) -> Self {
        let message = err.to_string();
        match err {
            OriginError::InvalidCallbackTenant(_) => Self::Validation(message),
            OriginError::MissingCredentials
            | OriginError::InvalidToken
            | OriginError::InvalidCallbackSecret
            | OriginError::MissingCallbackTenant => Self::Unauthenticated(message),
        }
    }
}
