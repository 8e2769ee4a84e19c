//! In-memory representation of a single directory entry.
//!
//! Directory attributes are multi-valued strings. [`DirectoryEntry`] keeps
//! them that way and offers typed accessors so that parsing happens in one
//! place, at the boundary, instead of leaking raw strings into the domain.

use std::collections::{BTreeMap, HashSet};

use ldap3::SearchEntry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the standard LDAP object class attribute.
pub const OBJECT_CLASS_ATTRIBUTE: &str = "objectClass";

/// Literal token a directory stores for boolean `true`.
pub const TRUE_TOKEN: &str = "TRUE";

/// Literal token a directory stores for boolean `false`.
pub const FALSE_TOKEN: &str = "FALSE";

/// A distinguished name plus its multi-valued attributes.
///
/// Attribute names are matched case-insensitively, as LDAP does. The stored
/// spelling is whatever was inserted first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    dn: String,
    #[serde(default)]
    attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(name, values);
        self
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }

    /// Set an attribute, replacing any existing values under the same name.
    ///
    /// An empty value list removes the attribute; directories reject
    /// attributes with zero values.
    pub fn insert<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let key = self.key_for(&name).unwrap_or(name);
        if values.is_empty() {
            debug!(attribute = %key, "dropping attribute with no values");
            self.attributes.remove(&key);
            return;
        }
        self.attributes.insert(key, values);
    }

    /// Remove an attribute, returning its values if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let key = self.key_for(name)?;
        self.attributes.remove(&key)
    }

    /// All values of an attribute, or `None` if it is absent.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        let key = self.key_for(name)?;
        self.attributes.get(&key).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.key_for(name).is_some()
    }

    /// First value of an attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Boolean attribute using the directory convention: only the exact
    /// token `TRUE` is true. Lowercase, numeric and absent values are false.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get_string(name) == Some(TRUE_TOKEN)
    }

    /// Integer attribute. `None` when absent or not a valid integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get_string(name).and_then(|v| v.trim().parse().ok())
    }

    /// Every value of an attribute, or an empty list when absent.
    pub fn get_all(&self, name: &str) -> Vec<String> {
        self.values(name).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// Attributes in the shape `ldap3` expects for add requests.
    pub fn to_ldap_attributes(&self) -> Vec<(String, HashSet<String>)> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().cloned().collect()))
            .collect()
    }

    fn key_for(&self, name: &str) -> Option<String> {
        if self.attributes.contains_key(name) {
            return Some(name.to_string());
        }
        self.attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// Format a boolean using the directory's uppercase convention.
pub fn bool_token(value: bool) -> &'static str {
    if value {
        TRUE_TOKEN
    } else {
        FALSE_TOKEN
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        if !entry.bin_attrs.is_empty() {
            debug!(
                dn = %entry.dn,
                count = entry.bin_attrs.len(),
                "ignoring binary attributes"
            );
        }
        let mut out = DirectoryEntry::new(entry.dn);
        for (name, values) in entry.attrs {
            out.insert(name, values);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> DirectoryEntry {
        DirectoryEntry::new("uid=1,ou=services,dc=example,dc=org")
            .with_attribute("uid", ["1"])
            .with_attribute("casServiceEnabled", ["TRUE"])
            .with_attribute("casEvaluationOrder", [" 42 "])
            .with_attribute("casRequiredHandlers", ["ldap", "radius"])
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let entry = sample();
        assert_eq!(entry.get_string("UID"), Some("1"));
        assert!(entry.contains("casserviceenabled"));
        assert!(!entry.contains("cn"));
    }

    #[test]
    fn test_insert_replaces_existing_spelling() {
        let mut entry = sample();
        entry.insert("UID", ["2"]);
        assert_eq!(entry.attributes().len(), 4);
        assert_eq!(entry.values("uid"), Some(&["2".to_string()][..]));
    }

    #[test]
    fn test_insert_empty_removes() {
        let mut entry = sample();
        entry.insert("casRequiredHandlers", Vec::<String>::new());
        assert!(!entry.contains("casRequiredHandlers"));
    }

    #[test]
    fn test_bool_convention_is_exact() {
        let entry = DirectoryEntry::new("cn=x")
            .with_attribute("a", ["TRUE"])
            .with_attribute("b", ["true"])
            .with_attribute("c", ["1"]);
        assert!(entry.get_bool("a"));
        assert!(!entry.get_bool("b"));
        assert!(!entry.get_bool("c"));
        assert!(!entry.get_bool("missing"));
        assert_eq!(bool_token(true), "TRUE");
        assert_eq!(bool_token(false), "FALSE");
    }

    #[test]
    fn test_integer_parsing() {
        let entry = sample().with_attribute("bad", ["forty"]);
        assert_eq!(entry.get_i64("casEvaluationOrder"), Some(42));
        assert_eq!(entry.get_i64("bad"), None);
        assert_eq!(entry.get_i64("missing"), None);
    }

    #[test]
    fn test_multi_values() {
        let entry = sample();
        assert_eq!(entry.get_all("casRequiredHandlers"), vec!["ldap", "radius"]);
        assert!(entry.get_all("missing").is_empty());
    }

    #[test]
    fn test_from_search_entry() {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec!["Portal".to_string()]);
        attrs.insert("objectClass".to_string(), vec!["top".to_string()]);
        let search = SearchEntry {
            dn: "uid=7,ou=services".to_string(),
            attrs,
            bin_attrs: HashMap::new(),
        };
        let entry = DirectoryEntry::from(search);
        assert_eq!(entry.dn(), "uid=7,ou=services");
        assert_eq!(entry.get_string("cn"), Some("Portal"));
    }

    #[test]
    fn test_to_ldap_attributes() {
        let attrs = sample().to_ldap_attributes();
        let handlers = attrs
            .iter()
            .find(|(name, _)| name == "casRequiredHandlers")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(handlers.len(), 2);
        assert!(handlers.contains("radius"));
    }

    #[test]
    fn test_json_shape() {
        let entry = DirectoryEntry::new("uid=1,ou=s").with_attribute("cn", ["A"]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["dn"], "uid=1,ou=s");
        assert_eq!(json["attributes"]["cn"][0], "A");
    }
}
