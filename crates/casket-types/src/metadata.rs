use serde::{Deserialize, Serialize};

use crate::properties::Properties;

/// Read-only snapshot of a stored blob's metadata.
///
/// Returned by download and describe operations. Never mutated after
/// construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    content_length: u64,
    content_type: Option<String>,
    properties: Properties,
}

impl BlobMetadata {
    pub fn new(content_length: u64, content_type: Option<String>, properties: Properties) -> Self {
        Self {
            content_length,
            content_type,
            properties,
        }
    }

    /// Build a snapshot whose content type is taken from the properties.
    pub fn from_properties(content_length: u64, properties: Properties) -> Self {
        let content_type = properties.content_type().map(str::to_string);
        Self::new(content_length, content_type, properties)
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn into_properties(self) -> Properties {
        self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_properties_lifts_content_type() {
        let props = Properties::new().with(Properties::CONTENT_TYPE, "text/plain");
        let meta = BlobMetadata::from_properties(5, props.clone());
        assert_eq!(meta.content_length(), 5);
        assert_eq!(meta.content_type(), Some("text/plain"));
        assert_eq!(meta.properties(), &props);
    }

    #[test]
    fn missing_content_type_is_none() {
        let meta = BlobMetadata::from_properties(0, Properties::new());
        assert!(meta.content_type().is_none());
    }
}
