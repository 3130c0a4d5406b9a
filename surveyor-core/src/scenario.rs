//! Scenarios: immutable parameter bindings used for template substitution

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An immutable key/value mapping. Distinct scenarios are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario(BTreeMap<String, Value>);

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used while constructing a scenario
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolve a dotted path such as `["person", "name"]`
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let root = self.0.get(first.as_ref())?;
        crate::value::lookup_path(root, rest)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// The whole scenario as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl From<BTreeMap<String, Value>> for Scenario {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Scenario {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_lookup() {
        let scenario =
            Scenario::new().with("product", "coffee").with("person", json!({"name": "Ada"}));
        assert_eq!(scenario.get("product"), Some(&json!("coffee")));
        assert_eq!(scenario.get_path(&["person", "name"]), Some(&json!("Ada")));
        assert_eq!(scenario.get_path(&["missing"]), None);
        assert_eq!(scenario.len(), 2);
    }

    #[test]
    fn test_scenario_serializes_as_plain_map() {
        let scenario: Scenario = [("b", json!(2)), ("a", json!(1))].into_iter().collect();
        assert_eq!(serde_json::to_string(&scenario).unwrap(), r#"{"a":1,"b":2}"#);
        let parsed: Scenario = serde_json::from_str(r#"{"x":"y"}"#).unwrap();
        assert_eq!(parsed.get("x"), Some(&json!("y")));
    }
}
