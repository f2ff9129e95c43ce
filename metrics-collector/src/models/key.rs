//! Composite aggregation key.

use crate::error::BillingError;
use serde::Serialize;
use std::fmt;

/// Separator between key components. Kubernetes names, plan names and
/// service types never contain it.
pub const KEY_DELIMITER: char = ':';

const KEY_ARITY: usize = 3;

/// Encoded `namespace:plan:resource_type` token.
///
/// Only [`Key::new`] builds keys, so every value decodes back into its parts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Key(String);

/// Decoded key components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    pub namespace: String,
    pub plan: String,
    pub resource_type: String,
}

impl Key {
    /// Encode the three components into a key.
    pub fn new(namespace: &str, plan: &str, resource_type: &str) -> Result<Self, BillingError> {
        let parts = [namespace, plan, resource_type];
        if let Some(part) = parts.iter().find(|p| p.contains(KEY_DELIMITER)) {
            return Err(BillingError::MalformedKey {
                key: parts.join(&KEY_DELIMITER.to_string()),
                reason: format!("component {:?} contains {:?}", part, KEY_DELIMITER),
            });
        }
        Ok(Self(parts.join(&KEY_DELIMITER.to_string())))
    }

    /// Split the key back into its components.
    pub fn decode(&self) -> Result<KeyParts, BillingError> {
        decode_token(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Decode a raw token, e.g. one read back from logs or a report.
pub fn decode_token(token: &str) -> Result<KeyParts, BillingError> {
    let tokens: Vec<&str> = token.split(KEY_DELIMITER).collect();
    match tokens.as_slice() {
        [namespace, plan, resource_type] => Ok(KeyParts {
            namespace: namespace.to_string(),
            plan: plan.to_string(),
            resource_type: resource_type.to_string(),
        }),
        _ => Err(BillingError::MalformedKey {
            key: token.to_string(),
            reason: format!("expected {} tokens, found {}", KEY_ARITY, tokens.len()),
        }),
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_components() {
        let cases = [
            ("ns1", "p1", "pg"),
            ("example-company-prod", "hobbyist-2", "mysql"),
            ("a", "", "object-storage-storage"),
        ];
        for (namespace, plan, resource_type) in cases {
            let key = Key::new(namespace, plan, resource_type).unwrap();
            let parts = key.decode().unwrap();
            assert_eq!(parts.namespace, namespace);
            assert_eq!(parts.plan, plan);
            assert_eq!(parts.resource_type, resource_type);
        }
    }

    #[test]
    fn equal_components_give_equal_keys() {
        let a = Key::new("ns1", "p1", "pg").unwrap();
        let b = Key::new("ns1", "p1", "pg").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ns1:p1:pg");
        assert_ne!(a, Key::new("ns1", "p1", "mysql").unwrap());
    }

    #[test]
    fn rejects_delimiter_inside_component() {
        let err = Key::new("ns:1", "p1", "pg").unwrap_err();
        assert!(matches!(err, BillingError::MalformedKey { .. }));
    }

    #[test]
    fn decode_rejects_wrong_arity() {
        for token in ["ns1:p1", "ns1:p1:pg:extra", "ns1"] {
            let err = decode_token(token).unwrap_err();
            match err {
                BillingError::MalformedKey { key, .. } => assert_eq!(key, token),
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
