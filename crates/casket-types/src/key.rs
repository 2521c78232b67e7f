use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of a blob within one store's namespace.
///
/// Keys are opaque to casket: they are either supplied by the caller (keyed
/// uploads) or derived from a [`ContentHash`](crate::ContentHash) by a key
/// generator (content-addressed uploads). The only invariant enforced here is
/// that a key is never empty.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobKey(String);

impl BlobKey {
    /// Create a key, rejecting the empty string.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TypeError::EmptyKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for BlobKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for BlobKey {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BlobKey> for String {
    fn from(key: BlobKey) -> Self {
        key.0
    }
}

impl AsRef<str> for BlobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({:?})", self.0)
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert_eq!(BlobKey::new(""), Err(TypeError::EmptyKey));
    }

    #[test]
    fn keys_are_opaque() {
        let key = BlobKey::new("a/b/../c d").unwrap();
        assert_eq!(key.as_str(), "a/b/../c d");
        assert_eq!(key.to_string(), "a/b/../c d");
    }

    #[test]
    fn serde_rejects_empty_key() {
        let parsed: Result<BlobKey, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());

        let key: BlobKey = serde_json::from_str("\"photos/cat\"").unwrap();
        assert_eq!(key.as_str(), "photos/cat");
    }

    #[test]
    fn ordering_follows_string_order() {
        let a = BlobKey::new("a").unwrap();
        let b = BlobKey::new("b").unwrap();
        assert!(a < b);
    }
}
