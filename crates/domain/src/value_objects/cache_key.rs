//! Cache key value object

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Separator between the operation prefix and the parameter digest
pub const KEY_SEPARATOR: char = ':';

/// A cache key of the form `{operation}:{digest}`
///
/// The operation prefix stays readable so that every entry belonging to one
/// operation can be invalidated by substring. The digest is produced by the
/// key derivation in the infrastructure layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from an operation name and a parameter digest
    pub fn new(operation: &str, digest: &str) -> Result<Self, DomainError> {
        validate_operation(operation)?;
        if digest.is_empty() || digest.chars().any(char::is_whitespace) {
            return Err(DomainError::ValidationError(format!(
                "invalid cache key digest: {digest:?}"
            )));
        }
        Ok(Self(format!("{operation}{KEY_SEPARATOR}{digest}")))
    }

    /// Parse a key previously rendered with `as_str`
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let (operation, digest) = raw.split_once(KEY_SEPARATOR).ok_or_else(|| {
            DomainError::ValidationError(format!("cache key without separator: {raw:?}"))
        })?;
        Self::new(operation, digest)
    }

    /// Operation prefix of this key
    #[must_use]
    pub fn operation(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map_or(self.0.as_str(), |(op, _)| op)
    }

    /// Parameter digest part of this key
    #[must_use]
    pub fn digest(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map_or("", |(_, digest)| digest)
    }

    /// Full key string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the rendered key contains `pattern`
    #[must_use]
    pub fn contains(&self, pattern: &str) -> bool {
        self.0.contains(pattern)
    }
}

/// Check that an operation name can be used as a key prefix
pub fn validate_operation(operation: &str) -> Result<(), DomainError> {
    if operation.is_empty() {
        return Err(DomainError::ValidationError(
            "operation name must not be empty".to_string(),
        ));
    }
    if operation.contains(KEY_SEPARATOR) || operation.chars().any(char::is_whitespace) {
        return Err(DomainError::ValidationError(format!(
            "operation name must not contain ':' or whitespace: {operation:?}"
        )));
    }
    Ok(())
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_joins_operation_and_digest() {
        let key = CacheKey::new("volume_ranking", "abc123").unwrap();
        assert_eq!(key.as_str(), "volume_ranking:abc123");
        assert_eq!(key.operation(), "volume_ranking");
        assert_eq!(key.digest(), "abc123");
    }

    #[test]
    fn empty_operation_is_rejected() {
        assert!(CacheKey::new("", "abc").is_err());
    }

    #[test]
    fn operation_with_separator_is_rejected() {
        assert!(CacheKey::new("volume:ranking", "abc").is_err());
    }

    #[test]
    fn operation_with_whitespace_is_rejected() {
        assert!(CacheKey::new("volume ranking", "abc").is_err());
    }

    #[test]
    fn empty_digest_is_rejected() {
        assert!(CacheKey::new("volume_ranking", "").is_err());
    }

    #[test]
    fn parse_roundtrips_display() {
        let key = CacheKey::new("market_cap", "ff00").unwrap();
        let parsed = CacheKey::parse(&key.to_string()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn parse_without_separator_fails() {
        assert!(CacheKey::parse("no-separator").is_err());
    }

    #[test]
    fn contains_matches_substring() {
        let key = CacheKey::new("investor_ranking", "1234").unwrap();
        assert!(key.contains("investor_"));
        assert!(key.contains(":12"));
        assert!(!key.contains("volume"));
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<CacheKey, _> = serde_json::from_str("\"sector_volume:aa\"");
        assert!(ok.is_ok());
        let bad: Result<CacheKey, _> = serde_json::from_str("\"missing\"");
        assert!(bad.is_err());
    }
}
