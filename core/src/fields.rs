//! Translation between human field labels and API field codes.
//!
//! # Design
//! Solve360 addresses every field by an opaque code (`firstname`,
//! `custom12345`, …) while callers work with the labels shown in the CRM
//! ("First Name", "Shoe Size"). `FieldMapping` is the single place the two
//! vocabularies meet: record types own one mapping each, fixed at definition
//! time, and everything above this module sees human labels only.
//!
//! The pairs keep their declaration order so a serialized request lists
//! fields deterministically.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value};

/// Ordered, immutable pairs of (human label, API field code) for one record
/// type.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    pairs: Vec<(String, String)>,
}

impl FieldMapping {
    /// Builds a mapping from `(human label, API code)` pairs, kept in the
    /// given order.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(human, api)| (human.into(), api.into()))
                .collect(),
        }
    }

    /// A mapping with no entries. `to_api` and `from_api` still work; the
    /// former yields nothing and the latter only picks up labeled custom
    /// fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The `(human label, API code)` pairs in declaration order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Looks up the API code for a human label.
    pub fn api_code(&self, human: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(h, _)| h == human)
            .map(|(_, api)| api.as_str())
    }

    /// Maps human-labeled fields to API-coded pairs for a write request.
    ///
    /// A mapping entry is included only when the input carries a non-blank
    /// value for its label; blank or absent values are omitted entirely
    /// (the API distinguishes "field present" from "field omitted"). Input
    /// labels with no mapping entry are silently dropped. Output order is
    /// mapping declaration order.
    pub fn to_api(&self, fields: &BTreeMap<String, String>) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter_map(|(human, api)| {
                fields
                    .get(human)
                    .filter(|value| !is_blank(value))
                    .map(|value| (api.clone(), value.clone()))
            })
            .collect()
    }

    /// Maps raw API fields back to human labels, consuming what it maps.
    ///
    /// Two passes over `raw`:
    /// 1. every mapping entry whose code is present as an object with a
    ///    non-blank `__content__` is emitted under its human label and
    ///    removed from `raw`;
    /// 2. every remaining object entry carrying a non-blank `label`
    ///    attribute — a custom field this mapping does not know about — is
    ///    emitted under that label (content may be empty) and removed.
    ///
    /// Entries that match neither pass are left in `raw` for the caller,
    /// which is how scalar item attributes (`id`, `name`, …) survive the
    /// flat collection shape.
    pub fn from_api(&self, raw: &mut JsonMap<String, Value>) -> BTreeMap<String, String> {
        let mut mapped = BTreeMap::new();

        for (human, api) in &self.pairs {
            let content = raw
                .get(api.as_str())
                .and_then(Value::as_object)
                .and_then(|entry| entry.get("__content__"))
                .and_then(scalar_string)
                .filter(|content| !is_blank(content));
            if let Some(content) = content {
                raw.remove(api.as_str());
                mapped.insert(human.clone(), content);
            }
        }

        let labeled: Vec<String> = raw
            .iter()
            .filter(|(_, value)| {
                value
                    .as_object()
                    .and_then(|entry| entry.get("label"))
                    .and_then(scalar_string)
                    .is_some_and(|label| !is_blank(&label))
            })
            .map(|(code, _)| code.clone())
            .collect();

        for code in labeled {
            if let Some(Value::Object(entry)) = raw.remove(&code) {
                let label = entry
                    .get("label")
                    .and_then(scalar_string)
                    .unwrap_or_default();
                let content = entry
                    .get("__content__")
                    .and_then(scalar_string)
                    .unwrap_or_default();
                mapped.insert(label, content);
            }
        }

        mapped
    }
}

/// Blank the way the API treats it: empty or whitespace-only.
pub(crate) fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Coerces a scalar JSON value to its string form. Objects, arrays, and
/// nulls have no string form and yield `None`.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping() -> FieldMapping {
        FieldMapping::new([
            ("First Name", "firstname"),
            ("Last Name", "lastname"),
            ("Description", "custom12345"),
        ])
    }

    fn human(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn raw(value: Value) -> JsonMap<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn to_api_maps_in_mapping_order() {
        let fields = human(&[("Description", "Web Developer"), ("First Name", "Steve")]);
        let api = mapping().to_api(&fields);
        assert_eq!(
            api,
            vec![
                ("firstname".to_string(), "Steve".to_string()),
                ("custom12345".to_string(), "Web Developer".to_string()),
            ]
        );
    }

    #[test]
    fn to_api_omits_blank_values() {
        let fields = human(&[("First Name", ""), ("Last Name", "  "), ("Description", "v")]);
        let api = mapping().to_api(&fields);
        assert_eq!(api, vec![("custom12345".to_string(), "v".to_string())]);
    }

    #[test]
    fn to_api_drops_unmapped_labels() {
        let fields = human(&[("First Name", "Steve"), ("Not A Field", "x")]);
        let api = mapping().to_api(&fields);
        assert_eq!(api, vec![("firstname".to_string(), "Steve".to_string())]);
    }

    #[test]
    fn to_api_with_empty_mapping_is_empty() {
        let fields = human(&[("First Name", "Steve")]);
        assert!(FieldMapping::empty().to_api(&fields).is_empty());
    }

    #[test]
    fn from_api_maps_and_consumes_known_codes() {
        let mut fields = raw(json!({
            "firstname": {"__content__": "Steve"},
            "id": 42,
        }));
        let mapped = mapping().from_api(&mut fields);
        assert_eq!(mapped.get("First Name").map(String::as_str), Some("Steve"));
        assert!(!fields.contains_key("firstname"));
        assert!(fields.contains_key("id"), "unrelated entries survive");
    }

    #[test]
    fn from_api_skips_blank_content() {
        let mut fields = raw(json!({
            "firstname": {"__content__": "  "},
            "lastname": {"__content__": "Jobs"},
        }));
        let mapped = mapping().from_api(&mut fields);
        assert!(!mapped.contains_key("First Name"));
        assert_eq!(mapped.get("Last Name").map(String::as_str), Some("Jobs"));
        assert!(
            fields.contains_key("firstname"),
            "blank entry is not consumed by the static pass"
        );
    }

    #[test]
    fn from_api_picks_up_labeled_custom_fields() {
        let mut fields = raw(json!({
            "custom99999": {"__content__": "11", "label": "Shoe Size"},
        }));
        let mapped = mapping().from_api(&mut fields);
        assert_eq!(mapped.get("Shoe Size").map(String::as_str), Some("11"));
        assert!(fields.is_empty());
    }

    #[test]
    fn from_api_labeled_field_without_content_maps_to_empty() {
        let mut fields = raw(json!({
            "custom88888": {"label": "Nickname"},
        }));
        let mapped = mapping().from_api(&mut fields);
        assert_eq!(mapped.get("Nickname").map(String::as_str), Some(""));
    }

    #[test]
    fn from_api_coerces_numeric_content() {
        let mut fields = raw(json!({
            "custom12345": {"__content__": 7},
        }));
        let mapped = mapping().from_api(&mut fields);
        assert_eq!(mapped.get("Description").map(String::as_str), Some("7"));
    }

    #[test]
    fn from_api_ignores_plain_scalar_values() {
        // A mapped code whose value is a bare string has no nested
        // `__content__`; it stays behind untouched.
        let mut fields = raw(json!({"firstname": "Steve"}));
        let mapped = mapping().from_api(&mut fields);
        assert!(mapped.is_empty());
        assert!(fields.contains_key("firstname"));
    }

    #[test]
    fn round_trip_through_both_directions() {
        let mapping = FieldMapping::new([("A", "a1")]);
        let api = mapping.to_api(&human(&[("A", "x")]));
        let mut raw_fields = JsonMap::new();
        for (code, value) in api {
            raw_fields.insert(code, json!({"__content__": value}));
        }
        let back = mapping.from_api(&mut raw_fields);
        assert_eq!(back.get("A").map(String::as_str), Some("x"));
    }

    #[test]
    fn api_code_lookup() {
        let m = mapping();
        assert_eq!(m.api_code("First Name"), Some("firstname"));
        assert_eq!(m.api_code("Missing"), None);
    }
}
