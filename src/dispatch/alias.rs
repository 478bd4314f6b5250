//! Static mapping from stable event identifiers to runner-facing webhook
//! paths.
//!
//! Internal identifiers and webhook paths evolve independently: a rename on
//! either side adds an entry here instead of breaking tenants that have no
//! explicit delegation record. Bump [`ALIAS_TABLE_VERSION`] on every edit.

use super::EventType;

pub const ALIAS_TABLE_VERSION: u32 = 3;

const WEBHOOK_ALIASES: &[(&str, &str)] = &[
    // Invoices
    ("invoice_list", "invoices-list"),
    ("invoice_get", "invoice-get"),
    ("invoice_create", "invoice-created"),
    ("invoice_validate", "invoice-validated"),
    ("invoice_settle", "invoice-paid"),
    ("invoice_cancel", "invoice-cancelled"),
    ("invoice_delete", "invoice-deleted"),
    // Credit notes
    ("credit_note_list", "avoir-list"),
    ("credit_note_get", "avoir-get"),
    ("credit_note_create", "avoir-created"),
    ("credit_note_validate", "avoir-validated"),
    ("credit_note_settle", "avoir-settled"),
    ("credit_note_cancel", "avoir-cancelled"),
    ("credit_note_delete", "avoir-deleted"),
    // Quotes
    ("quote_list", "devis-list"),
    ("quote_get", "devis-get"),
    ("quote_create", "devis-created"),
    ("quote_validate", "devis-sent"),
    ("quote_settle", "devis-accepted"),
    ("quote_cancel", "devis-cancelled"),
    ("quote_delete", "devis-deleted"),
    // Purchase orders
    ("purchase_order_list", "bdc-list"),
    ("purchase_order_get", "bdc-get"),
    ("purchase_order_create", "bdc-created"),
    ("purchase_order_validate", "bdc-validated"),
    ("purchase_order_settle", "bdc-settled"),
    ("purchase_order_cancel", "bdc-cancelled"),
    ("purchase_order_delete", "bdc-deleted"),
    // Proformas
    ("proforma_list", "proforma-list"),
    ("proforma_get", "proforma-get"),
    ("proforma_create", "proforma-created"),
    ("proforma_validate", "proforma-sent"),
    ("proforma_settle", "proforma-accepted"),
    ("proforma_cancel", "proforma-cancelled"),
    ("proforma_delete", "proforma-deleted"),
    // Side effects
    ("accounting_auto_post", "compta-auto-facture"),
    ("accounting_init", "compta-init"),
    ("invoice_render_pdf", "invoice-generate-pdf"),
];

/// Identifiers from earlier table versions that delegation records may
/// still carry.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("invoices_list", "invoices-list"),
    ("invoice_paid", "invoice-paid"),
    ("invoice_generate_pdf", "invoice-generate-pdf"),
    ("avoir_list", "avoir-list"),
    ("avoir_get", "avoir-get"),
    ("avoir_create", "avoir-created"),
    ("avoir_validate", "avoir-validated"),
    ("avoir_delete", "avoir-deleted"),
    ("devis_list", "devis-list"),
    ("devis_get", "devis-get"),
    ("devis_create", "devis-created"),
    ("devis_send", "devis-sent"),
    ("devis_accept", "devis-accepted"),
    ("devis_delete", "devis-deleted"),
    ("bdc_list", "bdc-list"),
    ("bdc_get", "bdc-get"),
    ("bdc_create", "bdc-created"),
    ("bdc_validate", "bdc-validated"),
    ("bdc_delete", "bdc-deleted"),
    ("proforma_send", "proforma-sent"),
    ("proforma_accept", "proforma-accepted"),
    ("compta_auto_facture", "compta-auto-facture"),
    ("compta_init", "compta-init"),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no webhook alias for `{identifier}` in alias table v{version}")]
pub struct AliasNotFound {
    pub identifier: String,
    pub version: u32,
}

pub fn resolve(identifier: &str) -> Result<&'static str, AliasNotFound> {
    let key = identifier.trim();
    WEBHOOK_ALIASES
        .iter()
        .chain(LEGACY_ALIASES.iter())
        .find(|(id, _)| *id == key)
        .map(|(_, path)| *path)
        .ok_or_else(|| AliasNotFound {
            identifier: key.to_string(),
            version: ALIAS_TABLE_VERSION,
        })
}

pub fn resolve_event(event: &EventType) -> Result<&'static str, AliasNotFound> {
    resolve(&event.as_string())
}

/// Current (non-legacy) entries, in table order.
pub fn current_entries() -> impl Iterator<Item = (&'static str, &'static str)> {
    WEBHOOK_ALIASES.iter().copied()
}
