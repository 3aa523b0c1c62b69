//! Transient request/response records exchanged with the flow engine.

#![allow(dead_code)]

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::flows::media::MediaRef;

/// A single field value in a flow record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Media(MediaRef),
    /// A value restricted to an enumerated set by the schema.
    Category(String),
    TextList(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Category(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&MediaRef> {
        match self {
            FieldValue::Media(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Number(_) => "number",
            FieldValue::Media(_) => "media",
            FieldValue::Category(_) => "category",
            FieldValue::TextList(_) => "list of text",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<MediaRef> for FieldValue {
    fn from(value: MediaRef) -> Self {
        FieldValue::Media(value)
    }
}

/// Named input fields for one flow invocation.
///
/// Media fields may be supplied either as [`FieldValue::Media`] or as a data
/// URI string; validation normalises them to `Media`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowInputRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl FlowInputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds a record from a JSON object body. Strings become text, numbers
    /// become numbers; anything else is reported by name.
    pub fn from_json(value: Value) -> Result<Self, JsonFieldError> {
        let Value::Object(map) = value else {
            return Err(JsonFieldError {
                field: None,
                reason: "request body must be a JSON object".to_string(),
            });
        };

        let mut record = Self::new();
        for (name, value) in map {
            let field_value = match value {
                Value::String(s) => FieldValue::Text(s),
                Value::Number(n) => match n.as_f64() {
                    Some(n) => FieldValue::Number(n),
                    None => {
                        return Err(JsonFieldError {
                            field: Some(name),
                            reason: "number is out of range".to_string(),
                        })
                    }
                },
                Value::Null => continue,
                other => {
                    return Err(JsonFieldError {
                        field: Some(name),
                        reason: format!("unsupported value {other}"),
                    })
                }
            };
            record.fields.insert(name, field_value);
        }
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonFieldError {
    pub field: Option<String>,
    pub reason: String,
}

/// Validated output of a flow. Only ever constructed by schema validation, so
/// every declared field is present and well-typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowOutputRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl FlowOutputRecord {
    pub(crate) fn from_validated(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.fields).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_json_reads_strings_and_numbers() {
        let record =
            FlowInputRecord::from_json(json!({"cropType": "Durian", "hectares": 2.5})).unwrap();
        assert_eq!(record.get("cropType"), Some(&FieldValue::from("Durian")));
        assert_eq!(record.get("hectares"), Some(&FieldValue::Number(2.5)));
    }

    #[test]
    fn test_from_json_skips_nulls() {
        let record = FlowInputRecord::from_json(json!({"cropType": null})).unwrap();
        assert!(record.get("cropType").is_none());
    }

    #[test]
    fn test_from_json_rejects_nested_values() {
        let err = FlowInputRecord::from_json(json!({"cropType": ["Durian"]})).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("cropType"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = FlowInputRecord::from_json(json!("Durian")).unwrap_err();
        assert!(err.field.is_none());
    }

    #[test]
    fn test_output_serializes_media_and_lists_as_plain_json() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "recommendations".to_string(),
            FieldValue::TextList(vec!["Prune".to_string(), "Spray".to_string()]),
        );
        fields.insert("severityLevel".to_string(), FieldValue::Category("High".into()));
        fields.insert("confidenceLevel".to_string(), FieldValue::Number(0.8));
        let record = FlowOutputRecord::from_validated(fields);
        assert_eq!(
            record.to_json(),
            json!({
                "recommendations": ["Prune", "Spray"],
                "severityLevel": "High",
                "confidenceLevel": 0.8
            })
        );
    }
}
