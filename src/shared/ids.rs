use getrandom::getrandom;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

const UUID_LEN: usize = 36;
const UUID_DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

pub fn validate_uuid_value(kind: &str, value: &str) -> Result<(), String> {
    if value.len() != UUID_LEN {
        return Err(format!("{kind} must be a 36-character UUID"));
    }
    for (idx, byte) in value.bytes().enumerate() {
        if UUID_DASH_POSITIONS.contains(&idx) {
            if byte != b'-' {
                return Err(format!("{kind} must use UUID dash layout 8-4-4-4-12"));
            }
        } else if !byte.is_ascii_hexdigit() {
            return Err(format!("{kind} must contain only hexadecimal digits"));
        }
    }
    Ok(())
}

/// Random version-4 UUID in canonical lowercase form.
pub fn generate_uuid_v4() -> Result<String, String> {
    let mut bytes = [0_u8; 16];
    getrandom(&mut bytes).map_err(|err| format!("failed to generate id randomness: {err}"))?;
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex = bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

macro_rules! define_uuid_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                let trimmed = raw.trim();
                validate_uuid_value($kind, trimmed)?;
                Ok(Self(trimmed.to_ascii_lowercase()))
            }

            pub fn generate() -> Result<Self, String> {
                generate_uuid_v4().map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(|err| {
                    D::Error::custom(format!("invalid {} `{}`: {}", $kind, raw, err))
                })
            }
        }
    };
}

define_uuid_type!(TenantId, "tenant id");
define_uuid_type!(DocumentId, "document id");
