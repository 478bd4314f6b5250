use crate::shared::{DocumentId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TAX_RATE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
    Quote,
    PurchaseOrder,
    Proforma,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        Self::Invoice,
        Self::CreditNote,
        Self::Quote,
        Self::PurchaseOrder,
        Self::Proforma,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::CreditNote => "credit_note",
            Self::Quote => "quote",
            Self::PurchaseOrder => "purchase_order",
            Self::Proforma => "proforma",
        }
    }

    /// Prefix of the human-readable document number.
    pub fn number_prefix(self) -> &'static str {
        match self {
            Self::Invoice => "INV",
            Self::CreditNote => "AVO",
            Self::Quote => "DEV",
            Self::PurchaseOrder => "BDC",
            Self::Proforma => "PRO",
        }
    }

    /// Collection segment used by the API surface.
    pub fn route_segment(self) -> &'static str {
        match self {
            Self::Invoice => "invoices",
            Self::CreditNote => "credit-notes",
            Self::Quote => "quotes",
            Self::PurchaseOrder => "purchase-orders",
            Self::Proforma => "proformas",
        }
    }

    pub fn entity_type(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::CreditNote => "CreditNote",
            Self::Quote => "Quote",
            Self::PurchaseOrder => "PurchaseOrder",
            Self::Proforma => "Proforma",
        }
    }

    /// Accepts the stable name, the route segment, or the number prefix.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| {
                normalized == kind.as_str()
                    || normalized == kind.route_segment()
                    || normalized == kind.number_prefix().to_ascii_lowercase()
            })
            .ok_or_else(|| {
                "document kind must be one of: invoice, credit_note, quote, purchase_order, proforma"
                    .to_string()
            })
    }

    pub fn from_route_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.route_segment() == segment)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentAction {
    List,
    Get,
    Create,
    Validate,
    Settle,
    Cancel,
    Delete,
}

impl DocumentAction {
    pub const ALL: [DocumentAction; 7] = [
        Self::List,
        Self::Get,
        Self::Create,
        Self::Validate,
        Self::Settle,
        Self::Cancel,
        Self::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Create => "create",
            Self::Validate => "validate",
            Self::Settle => "settle",
            Self::Cancel => "cancel",
            Self::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| {
                "document action must be one of: list, get, create, validate, settle, cancel, delete"
                    .to_string()
            })
    }

    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::List | Self::Get)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Validated,
    Settled,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Settled => "settled",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "validated" | "sent" => Ok(Self::Validated),
            "settled" | "paid" => Ok(Self::Settled),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err("status must be one of: draft, validated, settled, cancelled".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDocument {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub kind: DocumentKind,
    pub number: String,
    pub sequence_number: u64,
    pub status: DocumentStatus,
    pub client_id: String,
    pub amount_excl_tax: f64,
    pub tax_rate: f64,
    pub amount_incl_tax: f64,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentInput {
    pub client_id: String,
    pub amount_excl_tax: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}

impl CreateDocumentInput {
    /// Parses a request body, ignoring transport-level fields such as
    /// `tenantId` that callbacks carry alongside the document fields.
    pub fn from_body(body: &Value) -> Result<Self, String> {
        let input: Self = serde_json::from_value(body.clone())
            .map_err(|err| format!("invalid document body: {err}"))?;
        input.validate()?;
        Ok(input)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("clientId must be non-empty".to_string());
        }
        if !self.amount_excl_tax.is_finite() || self.amount_excl_tax <= 0.0 {
            return Err("amountExclTax must be a positive number".to_string());
        }
        if !self.tax_rate.is_finite() || !(0.0..=100.0).contains(&self.tax_rate) {
            return Err("taxRate must be between 0 and 100".to_string());
        }
        Ok(())
    }

    pub fn amount_incl_tax(&self) -> f64 {
        round_cents(self.amount_excl_tax * (1.0 + self.tax_rate / 100.0))
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentListQuery {
    pub status: Option<DocumentStatus>,
    pub page: u32,
    pub limit: u32,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

impl DocumentListQuery {
    pub fn from_params(
        status: Option<&str>,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Self, String> {
        let status = status
            .filter(|raw| !raw.trim().is_empty())
            .map(DocumentStatus::parse)
            .transpose()?;
        let page = parse_positive(page, "page")?.unwrap_or(1);
        let limit = parse_positive(limit, "limit")?
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);
        Ok(Self {
            status,
            page,
            limit,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

fn parse_positive(raw: Option<&str>, field: &str) -> Result<Option<u32>, String> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(format!("{field} must be a positive integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_parse_accepts_name_segment_and_prefix() {
        assert_eq!(
            DocumentKind::parse("credit_note").expect("name"),
            DocumentKind::CreditNote
        );
        assert_eq!(
            DocumentKind::parse("credit-notes").expect("segment"),
            DocumentKind::CreditNote
        );
        assert_eq!(
            DocumentKind::parse("AVO").expect("prefix"),
            DocumentKind::CreditNote
        );
        assert!(DocumentKind::parse("receipt").is_err());
    }

    #[test]
    fn create_input_computes_tax_inclusive_amount() {
        let input = CreateDocumentInput::from_body(&json!({
            "clientId": "client-1",
            "amountExclTax": 100.0,
            "tenantId": "ignored-by-input"
        }))
        .expect("input");
        assert_eq!(input.tax_rate, DEFAULT_TAX_RATE);
        assert_eq!(input.amount_incl_tax(), 120.0);

        let reduced = CreateDocumentInput {
            client_id: "c".to_string(),
            amount_excl_tax: 10.01,
            tax_rate: 5.5,
            note: None,
        };
        assert_eq!(reduced.amount_incl_tax(), 10.56);
    }

    #[test]
    fn create_input_rejects_missing_client_and_bad_amounts() {
        assert!(CreateDocumentInput::from_body(&json!({"amountExclTax": 10})).is_err());
        assert!(
            CreateDocumentInput::from_body(&json!({"clientId": " ", "amountExclTax": 10})).is_err()
        );
        assert!(
            CreateDocumentInput::from_body(&json!({"clientId": "c", "amountExclTax": 0})).is_err()
        );
        assert!(CreateDocumentInput::from_body(
            &json!({"clientId": "c", "amountExclTax": 5, "taxRate": 120})
        )
        .is_err());
    }

    #[test]
    fn list_query_defaults_and_caps_limit() {
        let query = DocumentListQuery::from_params(None, None, None).expect("defaults");
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(query.offset(), 0);

        let capped =
            DocumentListQuery::from_params(Some("draft"), Some("3"), Some("500")).expect("capped");
        assert_eq!(capped.status, Some(DocumentStatus::Draft));
        assert_eq!(capped.limit, MAX_PAGE_LIMIT);
        assert_eq!(capped.offset(), 200);

        assert!(DocumentListQuery::from_params(None, Some("0"), None).is_err());
        assert!(DocumentListQuery::from_params(Some("archived"), None, None).is_err());
    }
}
