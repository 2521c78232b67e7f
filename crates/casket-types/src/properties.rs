use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

/// Name/value pairs attached to a blob at upload time.
///
/// A handful of well-known names ([`Properties::CONTENT_TYPE`],
/// [`Properties::CONTENT_ENCODING`], [`Properties::CONTENT_DISPOSITION`]) get
/// special treatment from backing stores; everything else is carried
/// verbatim. Well-known names are matched case-insensitively. A later upload
/// to the same key replaces the whole map, it never merges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub const CONTENT_TYPE: &'static str = "Content-Type";
    pub const CONTENT_ENCODING: &'static str = "Content-Encoding";
    pub const CONTENT_DISPOSITION: &'static str = "Content-Disposition";

    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Case-insensitive lookup, used for the well-known header-like names.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_ignore_case(Self::CONTENT_TYPE)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_ignore_case(Self::CONTENT_ENCODING)
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.get_ignore_case(Self::CONTENT_DISPOSITION)
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.insert(Self::CONTENT_TYPE, content_type);
    }

    /// Union of two maps. Where both define a name, `self` wins.
    #[must_use]
    pub fn merged_over(mut self, secondary: &Properties) -> Self {
        for (name, value) in &secondary.0 {
            self.0
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Properties {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
