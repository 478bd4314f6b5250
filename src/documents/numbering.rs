//! Human-readable document numbers: `<PREFIX>-<year>-<sequence>`.

use super::DocumentKind;
use crate::shared::TenantId;
use crate::store::{Store, StoreError};

pub const SEQUENCE_WIDTH: usize = 6;

/// Counts observed for one (tenant, kind) while numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceState {
    /// All documents of the kind ever stored for the tenant, tombstones included.
    pub existing_count: u64,
    /// Highest sequence among stored documents with this prefix and year.
    pub highest_in_year: u64,
    /// Highest sequence ever handed out for this prefix and year, including
    /// drafts that were removed since.
    pub issued_in_year: u64,
}

/// The count drives the sequence; the other two only matter once a draft
/// has been physically removed and the count fell behind a used number.
pub fn next_sequence(state: SequenceState) -> u64 {
    state
        .existing_count
        .max(state.highest_in_year)
        .max(state.issued_in_year)
        + 1
}

pub fn format_number(prefix: &str, year: i32, sequence: u64) -> String {
    format!("{prefix}-{year}-{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Previews the number the next `kind` document created this year receives.
/// Nothing is reserved: creation re-derives the number inside its own
/// transaction.
pub fn next_number(
    store: &Store,
    tenant_id: &TenantId,
    kind: DocumentKind,
) -> Result<String, StoreError> {
    next_number_for_year(store, tenant_id, kind, crate::shared::current_year())
}

pub fn next_number_for_year(
    store: &Store,
    tenant_id: &TenantId,
    kind: DocumentKind,
    year: i32,
) -> Result<String, StoreError> {
    store.peek_document_number(tenant_id, kind, year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_zero_padded_to_six_digits() {
        assert_eq!(format_number("AVO", 2024, 1), "AVO-2024-000001");
        assert_eq!(format_number("INV", 2025, 1234567), "INV-2025-1234567");
    }

    #[test]
    fn next_sequence_never_reuses_a_higher_number() {
        assert_eq!(next_sequence(SequenceState::default()), 1);
        assert_eq!(
            next_sequence(SequenceState {
                existing_count: 5,
                ..SequenceState::default()
            }),
            6
        );
        assert_eq!(
            next_sequence(SequenceState {
                existing_count: 3,
                highest_in_year: 4,
                issued_in_year: 0
            }),
            5
        );
        assert_eq!(
            next_sequence(SequenceState {
                existing_count: 1,
                highest_in_year: 1,
                issued_in_year: 2
            }),
            3
        );
    }
}
