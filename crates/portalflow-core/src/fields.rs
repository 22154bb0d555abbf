//! Caller-supplied task fields.
//!
//! Values arrive as arbitrary JSON scalars and are normalised to strings.
//! `null` and empty strings count as absent so callers can send a full form
//! object without tripping step inference.

use crate::error::{OrchestratorError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Request keys that steer the orchestrator and are never task fields.
pub const RESERVED_KEYS: [&str; 3] = ["taskType", "sessionId", "step"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    values: BTreeMap<String, String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(object: &Map<String, Value>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (name, value) in object {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text.trim().to_string(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(OrchestratorError::InputInvalid(format!(
                        "Field '{}' must be a string, number or boolean",
                        name
                    )));
                }
            };
            if !text.is_empty() {
                values.insert(name.clone(), text);
            }
        }
        Ok(Self { values })
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.values.insert(name.into(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

/// Fields gathered over a session's lifetime. Each field is written once
/// unless the running step lists it as overwritable.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedFields {
    values: FieldSet,
}

impl AccumulatedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| OrchestratorError::InputInvalid(format!("Field '{}' is required", name)))
    }

    pub fn as_set(&self) -> &FieldSet {
        &self.values
    }

    /// Accumulated fields overlaid with `incoming`, without committing anything.
    pub fn overlay(&self, incoming: &FieldSet) -> FieldSet {
        let mut merged = self.values.clone();
        for (name, value) in incoming.iter() {
            merged.insert(name, value);
        }
        merged
    }

    pub fn merge(&mut self, incoming: &FieldSet, overwritable: &[&str]) -> Result<()> {
        for (name, value) in incoming.iter() {
            if let Some(existing) = self.values.get(name)
                && existing != value
                && !overwritable.contains(&name)
            {
                return Err(OrchestratorError::InputInvalid(format!(
                    "Field '{}' was already provided for this task and cannot be changed",
                    name
                )));
            }
        }
        for (name, value) in incoming.iter() {
            self.values.insert(name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn scalars_are_stringified_and_blanks_dropped() {
        let fields = FieldSet::from_json(&object(json!({
            "taskType": "search",
            "sessionId": "abc",
            "regNo": " DL01AB1234 ",
            "pincode": 110085,
            "agree": true,
            "color": "",
            "price": null
        })))
        .unwrap();

        assert_eq!(fields.get("regNo"), Some("DL01AB1234"));
        assert_eq!(fields.get("pincode"), Some("110085"));
        assert_eq!(fields.get("agree"), Some("true"));
        assert!(!fields.contains("color"));
        assert!(!fields.contains("price"));
        assert!(!fields.contains("taskType"));
        assert!(!fields.contains("sessionId"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = FieldSet::from_json(&object(json!({"address": {"city": "Delhi"}}))).unwrap_err();
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn fields_are_write_once_unless_overwritable() {
        let mut fields = AccumulatedFields::new();
        fields
            .merge(&FieldSet::new().with("email", "a@b.in"), &[])
            .unwrap();

        // Same value again is not a write.
        fields
            .merge(&FieldSet::new().with("email", "a@b.in"), &[])
            .unwrap();

        let err = fields
            .merge(&FieldSet::new().with("email", "c@d.in"), &[])
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InputInvalid(_)));
        assert_eq!(fields.get("email"), Some("a@b.in"));

        fields
            .merge(&FieldSet::new().with("captcha", "X1"), &["captcha"])
            .unwrap();
        fields
            .merge(&FieldSet::new().with("captcha", "Y2"), &["captcha"])
            .unwrap();
        assert_eq!(fields.get("captcha"), Some("Y2"));
    }

    #[test]
    fn rejected_merge_commits_nothing() {
        let mut fields = AccumulatedFields::new();
        fields.merge(&FieldSet::new().with("otp", "1234"), &[]).unwrap();

        let incoming = FieldSet::new().with("otp", "9999").with("regNo", "DL01AB1234");
        assert!(fields.merge(&incoming, &[]).is_err());
        assert!(fields.get("regNo").is_none());
    }

    #[test]
    fn overlay_does_not_commit() {
        let fields = AccumulatedFields::new();
        let view = fields.overlay(&FieldSet::new().with("regNo", "DL01AB1234"));
        assert!(view.contains("regNo"));
        assert!(fields.get("regNo").is_none());
    }
}
