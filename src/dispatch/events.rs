use crate::documents::{DocumentAction, DocumentKind};

/// Auxiliary workflows issued after a local mutation has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SideEffectKind {
    AccountingAutoPost,
    AccountingInit,
    InvoiceRenderPdf,
}

impl SideEffectKind {
    pub const ALL: [SideEffectKind; 3] = [
        Self::AccountingAutoPost,
        Self::AccountingInit,
        Self::InvoiceRenderPdf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccountingAutoPost => "accounting_auto_post",
            Self::AccountingInit => "accounting_init",
            Self::InvoiceRenderPdf => "invoice_render_pdf",
        }
    }
}

/// Stable internal identifier of a business event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    Document {
        kind: DocumentKind,
        action: DocumentAction,
    },
    SideEffect(SideEffectKind),
}

impl EventType {
    pub fn document(kind: DocumentKind, action: DocumentAction) -> Self {
        Self::Document { kind, action }
    }

    /// Every event the system defines.
    pub fn all() -> Vec<EventType> {
        let mut out = Vec::new();
        for kind in DocumentKind::ALL {
            for action in DocumentAction::ALL {
                out.push(Self::document(kind, action));
            }
        }
        out.extend(SideEffectKind::ALL.into_iter().map(Self::SideEffect));
        out
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Document { kind, action } => format!("{}_{}", kind.as_str(), action.as_str()),
            Self::SideEffect(kind) => kind.as_str().to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|event| event.as_string() == normalized)
            .ok_or_else(|| format!("unknown event type `{}`", raw.trim()))
    }

    /// Mutations are the events with fiscal relevance; they are audited.
    pub fn is_mutation(&self) -> bool {
        match self {
            Self::Document { action, .. } => action.is_mutation(),
            Self::SideEffect(_) => true,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}
