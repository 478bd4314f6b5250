use crate::documents::{DocumentAction, DocumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A matched document route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: DocumentKind,
    pub action: DocumentAction,
    pub id: Option<String>,
}

/// `None` means the path/method pair is not served.
pub fn match_route(method: Method, path: &str) -> Option<Route> {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let ["api", collection, rest @ ..] = segments.as_slice() else {
        return None;
    };
    let kind = DocumentKind::from_route_segment(collection)?;

    let (action, id) = match (method, rest) {
        (Method::Get, []) => (DocumentAction::List, None),
        (Method::Post, []) => (DocumentAction::Create, None),
        (Method::Get, [id]) => (DocumentAction::Get, Some(*id)),
        (Method::Delete, [id]) => (DocumentAction::Delete, Some(*id)),
        (Method::Put, [id, verb]) => {
            let action = match *verb {
                "validate" => DocumentAction::Validate,
                "settle" => DocumentAction::Settle,
                "cancel" => DocumentAction::Cancel,
                _ => return None,
            };
            (action, Some(*id))
        }
        _ => return None,
    };

    Some(Route {
        kind,
        action,
        id: id.map(str::to_string),
    })
}
