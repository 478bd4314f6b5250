pub mod domain;
pub mod lifecycle;
pub mod numbering;
pub mod service;

pub use domain::{
    round_cents, CreateDocumentInput, DocumentAction, DocumentKind, DocumentListQuery,
    DocumentStatus, DomainDocument, DEFAULT_PAGE_LIMIT, DEFAULT_TAX_RATE, MAX_PAGE_LIMIT,
};
pub use lifecycle::{plan_transition, IllegalTransition, Transition};
pub use numbering::{format_number, next_number, next_number_for_year, next_sequence};
pub use service::{DocumentService, MutationPhase, ServiceReply};

use crate::dispatch::DispatchError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("role `{role}` may not {action} documents")]
    Forbidden {
        role: &'static str,
        action: &'static str,
    },
    #[error(transparent)]
    State(#[from] IllegalTransition),
    #[error("document `{id}` changed while it was being updated")]
    StateChanged { id: String },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}
