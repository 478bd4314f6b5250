use super::{sql, Store, StoreError};
use crate::documents::numbering::{format_number, next_sequence, SequenceState};
use crate::documents::{
    CreateDocumentInput, DocumentKind, DocumentListQuery, DocumentStatus, DomainDocument,
};
use crate::shared::{now_rfc3339, DocumentId, TenantId};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub kind: DocumentKind,
    pub input: CreateDocumentInput,
}

const DOCUMENT_COLUMNS: &str = "document_id, tenant_id, kind, number, sequence_number, status, \
     client_id, amount_excl_tax, tax_rate, amount_incl_tax, note, created_at, updated_at, deleted_at";

struct RawDocument {
    id: String,
    tenant_id: String,
    kind: String,
    number: String,
    sequence_number: i64,
    status: String,
    client_id: String,
    amount_excl_tax: f64,
    tax_rate: f64,
    amount_incl_tax: f64,
    note: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

fn raw_document(row: &Row<'_>) -> rusqlite::Result<RawDocument> {
    Ok(RawDocument {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        kind: row.get(2)?,
        number: row.get(3)?,
        sequence_number: row.get(4)?,
        status: row.get(5)?,
        client_id: row.get(6)?,
        amount_excl_tax: row.get(7)?,
        tax_rate: row.get(8)?,
        amount_incl_tax: row.get(9)?,
        note: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        deleted_at: row.get(13)?,
    })
}

impl TryFrom<RawDocument> for DomainDocument {
    type Error = StoreError;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        let invalid = |column: &'static str, value: &str| StoreError::InvalidValue {
            column,
            value: value.to_string(),
        };
        Ok(DomainDocument {
            id: DocumentId::parse(&raw.id).map_err(|_| invalid("documents.document_id", &raw.id))?,
            tenant_id: TenantId::parse(&raw.tenant_id)
                .map_err(|_| invalid("documents.tenant_id", &raw.tenant_id))?,
            kind: DocumentKind::parse(&raw.kind).map_err(|_| invalid("documents.kind", &raw.kind))?,
            number: raw.number,
            sequence_number: u64::try_from(raw.sequence_number)
                .map_err(|_| invalid("documents.sequence_number", &raw.sequence_number.to_string()))?,
            status: DocumentStatus::parse(&raw.status)
                .map_err(|_| invalid("documents.status", &raw.status))?,
            client_id: raw.client_id,
            amount_excl_tax: raw.amount_excl_tax,
            tax_rate: raw.tax_rate,
            amount_incl_tax: raw.amount_incl_tax,
            note: raw.note,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            deleted_at: raw.deleted_at,
        })
    }
}

fn sequence_state(
    connection: &Connection,
    tenant_id: &TenantId,
    kind: DocumentKind,
    year: i32,
) -> Result<SequenceState, StoreError> {
    let (count, highest): (i64, i64) = connection
        .query_row(
            "SELECT
                COUNT(*),
                COALESCE(MAX(CASE WHEN number LIKE ?3 THEN sequence_number END), 0)
             FROM documents
             WHERE tenant_id = ?1 AND kind = ?2",
            params![
                tenant_id.as_str(),
                kind.as_str(),
                format!("{}-{year}-%", kind.number_prefix())
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(super::sql)?;
    let issued: i64 = connection
        .query_row(
            "SELECT last_sequence FROM document_sequences
             WHERE tenant_id = ?1 AND kind = ?2 AND year = ?3",
            params![tenant_id.as_str(), kind.as_str(), year],
            |row| row.get(0),
        )
        .optional()
        .map_err(super::sql)?
        .unwrap_or(0);
    Ok(SequenceState {
        existing_count: u64::try_from(count).unwrap_or(0),
        highest_in_year: u64::try_from(highest).unwrap_or(0),
        issued_in_year: u64::try_from(issued).unwrap_or(0),
    })
}

impl Store {
    /// Number the next document of `kind` for `year` would receive, without
    /// reserving it.
    pub fn peek_document_number(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<String, StoreError> {
        let connection = self.connect()?;
        let state = sequence_state(&connection, tenant_id, kind, year)?;
        Ok(format_number(kind.number_prefix(), year, next_sequence(state)))
    }

    /// Numbers and inserts a draft in one immediate transaction, which
    /// serializes concurrent numbering against the same database.
    pub fn insert_numbered_document(
        &self,
        new: &NewDocument,
        year: i32,
    ) -> Result<DomainDocument, StoreError> {
        let now = now_rfc3339();
        let mut connection = self.connect()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql)?;

        let state = sequence_state(&tx, &new.tenant_id, new.kind, year)?;
        let sequence_number = next_sequence(state);
        let number = format_number(new.kind.number_prefix(), year, sequence_number);
        let amount_incl_tax = new.input.amount_incl_tax();

        tx.execute(
            &format!(
                "INSERT INTO documents ({DOCUMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, NULL)"
            ),
            params![
                new.id.as_str(),
                new.tenant_id.as_str(),
                new.kind.as_str(),
                number,
                i64::try_from(sequence_number).unwrap_or(i64::MAX),
                DocumentStatus::Draft.as_str(),
                new.input.client_id.trim(),
                new.input.amount_excl_tax,
                new.input.tax_rate,
                amount_incl_tax,
                new.input.note,
                now,
            ],
        )
        .map_err(sql)?;
        tx.execute(
            "INSERT INTO document_sequences (tenant_id, kind, year, last_sequence)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tenant_id, kind, year)
             DO UPDATE SET last_sequence = MAX(last_sequence, excluded.last_sequence)",
            params![
                new.tenant_id.as_str(),
                new.kind.as_str(),
                year,
                i64::try_from(sequence_number).unwrap_or(i64::MAX)
            ],
        )
        .map_err(sql)?;
        tx.commit().map_err(sql)?;

        Ok(DomainDocument {
            id: new.id.clone(),
            tenant_id: new.tenant_id.clone(),
            kind: new.kind,
            number,
            sequence_number,
            status: DocumentStatus::Draft,
            client_id: new.input.client_id.trim().to_string(),
            amount_excl_tax: new.input.amount_excl_tax,
            tax_rate: new.input.tax_rate,
            amount_incl_tax,
            note: new.input.note.clone(),
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Includes tombstoned rows; callers decide how to present them.
    pub fn get_document(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
        id: &DocumentId,
    ) -> Result<Option<DomainDocument>, StoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE tenant_id = ?1 AND kind = ?2 AND document_id = ?3"
                ),
                params![tenant_id.as_str(), kind.as_str(), id.as_str()],
                raw_document,
            )
            .optional()
            .map_err(sql)?;
        raw.map(DomainDocument::try_from).transpose()
    }

    /// Live (non-tombstoned) documents, newest first, plus the total match
    /// count before pagination.
    pub fn list_documents(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
        query: &DocumentListQuery,
    ) -> Result<(Vec<DomainDocument>, u64), StoreError> {
        let connection = self.connect()?;
        let status = query.status.map(DocumentStatus::as_str);
        let total: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM documents
                 WHERE tenant_id = ?1 AND kind = ?2 AND deleted_at IS NULL
                   AND (?3 IS NULL OR status = ?3)",
                params![tenant_id.as_str(), kind.as_str(), status],
                |row| row.get(0),
            )
            .map_err(sql)?;

        let mut statement = connection
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE tenant_id = ?1 AND kind = ?2 AND deleted_at IS NULL
                   AND (?3 IS NULL OR status = ?3)
                 ORDER BY sequence_number DESC, rowid DESC
                 LIMIT ?4 OFFSET ?5"
            ))
            .map_err(sql)?;
        let rows = statement
            .query_map(
                params![
                    tenant_id.as_str(),
                    kind.as_str(),
                    status,
                    i64::from(query.limit),
                    i64::try_from(query.offset()).unwrap_or(i64::MAX),
                ],
                raw_document,
            )
            .map_err(sql)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(DomainDocument::try_from(row.map_err(sql)?)?);
        }
        Ok((out, u64::try_from(total).unwrap_or(0)))
    }

    pub fn count_documents(
        &self,
        tenant_id: &TenantId,
        kind: Option<DocumentKind>,
    ) -> Result<u64, StoreError> {
        let connection = self.connect()?;
        let count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM documents
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR kind = ?2)",
                params![tenant_id.as_str(), kind.map(DocumentKind::as_str)],
                |row| row.get(0),
            )
            .map_err(sql)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Compare-and-set on status so two racing transitions cannot both win.
    pub fn update_document_status(
        &self,
        tenant_id: &TenantId,
        id: &DocumentId,
        expected: DocumentStatus,
        next: DocumentStatus,
    ) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE documents SET status = ?4, updated_at = ?5
                 WHERE tenant_id = ?1 AND document_id = ?2 AND status = ?3
                   AND deleted_at IS NULL",
                params![
                    tenant_id.as_str(),
                    id.as_str(),
                    expected.as_str(),
                    next.as_str(),
                    now_rfc3339()
                ],
            )
            .map_err(sql)?;
        Ok(changed > 0)
    }

    pub fn remove_draft_document(
        &self,
        tenant_id: &TenantId,
        id: &DocumentId,
    ) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "DELETE FROM documents
                 WHERE tenant_id = ?1 AND document_id = ?2 AND status = 'draft'
                   AND deleted_at IS NULL",
                params![tenant_id.as_str(), id.as_str()],
            )
            .map_err(sql)?;
        Ok(changed > 0)
    }

    pub fn tombstone_document(
        &self,
        tenant_id: &TenantId,
        id: &DocumentId,
    ) -> Result<bool, StoreError> {
        let now = now_rfc3339();
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE documents SET deleted_at = ?3, updated_at = ?3
                 WHERE tenant_id = ?1 AND document_id = ?2 AND deleted_at IS NULL
                   AND status IN ('validated', 'cancelled')",
                params![tenant_id.as_str(), id.as_str(), now],
            )
            .map_err(sql)?;
        Ok(changed > 0)
    }
}
