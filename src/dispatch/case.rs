//! Key casing across the store/runner boundary.
//!
//! Locally, keys are camelCase; the runner speaks snake_case. The mapping is
//! escaped so it inverts exactly for arbitrary keys:
//!
//! * outbound, an ASCII uppercase `X` becomes `_x` and a literal `_` becomes `__`;
//! * inbound, `__` becomes `_`, `_x` (lowercase ASCII) becomes `X`, and any
//!   other `_` is kept.
//!
//! Ordinary camelCase keys therefore produce ordinary snake_case keys
//! (`clientId` ⇄ `client_id`); only keys that already contain `_` pick up
//! the doubled escape.

use serde_json::{Map, Value};

pub fn to_runner_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch == '_' {
            out.push_str("__");
        } else if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn from_runner_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '_' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('_') => {
                chars.next();
                out.push('_');
            }
            Some(next) if next.is_ascii_lowercase() => {
                chars.next();
                out.push(next.to_ascii_uppercase());
            }
            _ => out.push('_'),
        }
    }
    out
}

pub fn to_runner_case(value: &Value) -> Value {
    rewrite_keys(value, &to_runner_key)
}

pub fn from_runner_case(value: &Value) -> Value {
    rewrite_keys(value, &from_runner_key)
}

fn rewrite_keys(value: &Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, nested) in map {
                out.insert(rename(key), rewrite_keys(nested, rename));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_keys(item, rename))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}
