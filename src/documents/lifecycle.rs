use super::{DocumentAction, DocumentStatus};

/// What a legal lifecycle action does to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SetStatus(DocumentStatus),
    /// Drafts never left the building; the row is removed.
    Remove,
    /// Documents with fiscal history keep their row under a tombstone.
    Tombstone,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} a document in status `{status}`")]
pub struct IllegalTransition {
    pub action: &'static str,
    pub status: &'static str,
}

pub fn plan_transition(
    current: DocumentStatus,
    action: DocumentAction,
) -> Result<Transition, IllegalTransition> {
    use DocumentAction as A;
    use DocumentStatus as S;

    let planned = match (action, current) {
        (A::Validate, S::Draft) => Some(Transition::SetStatus(S::Validated)),
        (A::Settle, S::Validated) => Some(Transition::SetStatus(S::Settled)),
        (A::Cancel, S::Draft | S::Validated) => Some(Transition::SetStatus(S::Cancelled)),
        (A::Delete, S::Draft) => Some(Transition::Remove),
        (A::Delete, S::Validated | S::Cancelled) => Some(Transition::Tombstone),
        _ => None,
    };

    planned.ok_or(IllegalTransition {
        action: action.as_str(),
        status: current.as_str(),
    })
}
