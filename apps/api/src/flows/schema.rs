//! Declarative input/output schemas for flows.
//!
//! A [`Schema`] is an ordered list of required fields. Input validation
//! normalises a [`FlowInputRecord`] (media strings become [`MediaRef`]s);
//! output validation turns the service's JSON object into a
//! [`FlowOutputRecord`] without coercing anything.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::flows::media::MediaRef;
use crate::flows::record::{FieldValue, FlowInputRecord, FlowOutputRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text { non_empty: bool },
    Number,
    /// Embedded binary payload; `accept` is the required top-level MIME type.
    Media { accept: &'static str },
    Category { values: &'static [&'static str] },
    TextList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub description: &'static str,
}

impl FieldSpec {
    /// Required text that must contain something other than whitespace.
    pub const fn text(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text { non_empty: true },
            description,
        }
    }

    /// Required text that may be blank.
    pub const fn free_text(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text { non_empty: false },
            description,
        }
    }

    pub const fn number(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Number,
            description,
        }
    }

    pub const fn image(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Media { accept: "image" },
            description,
        }
    }

    pub const fn category(
        name: &'static str,
        values: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Category { values },
            description,
        }
    }

    pub const fn text_list(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::TextList,
            description,
        }
    }
}

/// A field that failed validation, and why.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {reason}")]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Every declared field is required.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks an input record and returns it with media fields decoded.
    pub fn validate_input(
        &self,
        record: &FlowInputRecord,
    ) -> Result<FlowInputRecord, SchemaViolation> {
        if let Some((name, _)) = record.iter().find(|(name, _)| self.field(name).is_none()) {
            return Err(SchemaViolation::new(name, "field is not part of this flow's input"));
        }

        let mut normalised = FlowInputRecord::new();
        for spec in &self.fields {
            let value = record
                .get(spec.name)
                .ok_or_else(|| SchemaViolation::new(spec.name, "required field is missing"))?;
            normalised.insert(spec.name, check_input_value(spec, value)?);
        }
        Ok(normalised)
    }

    /// Checks a structured response against this schema. Undeclared keys are
    /// dropped; declared ones must be present with exactly the declared type.
    pub fn validate_output(&self, value: &Value) -> Result<FlowOutputRecord, SchemaViolation> {
        let Value::Object(object) = value else {
            return Err(SchemaViolation::new(
                "<response>",
                format!("expected a JSON object, got {}", json_type(value)),
            ));
        };

        let mut fields = BTreeMap::new();
        for spec in &self.fields {
            let value = match object.get(spec.name) {
                None | Some(Value::Null) => {
                    return Err(SchemaViolation::new(spec.name, "required field is missing"))
                }
                Some(v) => v,
            };
            fields.insert(spec.name.to_string(), check_output_value(spec, value)?);
        }
        Ok(FlowOutputRecord::from_validated(fields))
    }
}

fn check_input_value(spec: &FieldSpec, value: &FieldValue) -> Result<FieldValue, SchemaViolation> {
    let mismatch = || {
        SchemaViolation::new(
            spec.name,
            format!("expected {}, got {}", expected_name(&spec.kind), value.kind_name()),
        )
    };

    match (&spec.kind, value) {
        (FieldKind::Text { non_empty }, FieldValue::Text(s)) => {
            check_text(spec.name, s, *non_empty)?;
            Ok(value.clone())
        }
        (FieldKind::Number, FieldValue::Number(n)) => {
            check_number(spec.name, *n)?;
            Ok(value.clone())
        }
        (FieldKind::Media { accept }, FieldValue::Text(uri)) => {
            let media =
                MediaRef::parse(uri).map_err(|e| SchemaViolation::new(spec.name, e.to_string()))?;
            check_media(spec.name, &media, accept)?;
            Ok(FieldValue::Media(media))
        }
        (FieldKind::Media { accept }, FieldValue::Media(media)) => {
            check_media(spec.name, media, accept)?;
            Ok(value.clone())
        }
        (FieldKind::Category { values }, FieldValue::Text(s) | FieldValue::Category(s)) => {
            check_category(spec.name, s, values)?;
            Ok(FieldValue::Category(s.clone()))
        }
        (FieldKind::TextList, FieldValue::TextList(_)) => Ok(value.clone()),
        _ => Err(mismatch()),
    }
}

fn check_output_value(spec: &FieldSpec, value: &Value) -> Result<FieldValue, SchemaViolation> {
    let mismatch = || {
        SchemaViolation::new(
            spec.name,
            format!("expected {}, got {}", expected_name(&spec.kind), json_type(value)),
        )
    };

    match (&spec.kind, value) {
        (FieldKind::Text { non_empty }, Value::String(s)) => {
            check_text(spec.name, s, *non_empty)?;
            Ok(FieldValue::Text(s.clone()))
        }
        (FieldKind::Number, Value::Number(n)) => {
            let n = n.as_f64().ok_or_else(mismatch)?;
            check_number(spec.name, n)?;
            Ok(FieldValue::Number(n))
        }
        (FieldKind::Media { accept }, Value::String(uri)) => {
            let media =
                MediaRef::parse(uri).map_err(|e| SchemaViolation::new(spec.name, e.to_string()))?;
            check_media(spec.name, &media, accept)?;
            Ok(FieldValue::Media(media))
        }
        (FieldKind::Category { values }, Value::String(s)) => {
            check_category(spec.name, s, values)?;
            Ok(FieldValue::Category(s.clone()))
        }
        (FieldKind::TextList, Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(SchemaViolation::new(
                    spec.name,
                    format!("item {i} must be text, got {}", json_type(other)),
                )),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::TextList),
        _ => Err(mismatch()),
    }
}

fn check_text(field: &str, text: &str, non_empty: bool) -> Result<(), SchemaViolation> {
    if non_empty && text.trim().is_empty() {
        return Err(SchemaViolation::new(field, "must not be empty"));
    }
    Ok(())
}

fn check_number(field: &str, n: f64) -> Result<(), SchemaViolation> {
    if !n.is_finite() {
        return Err(SchemaViolation::new(field, "must be a finite number"));
    }
    Ok(())
}

fn check_media(field: &str, media: &MediaRef, accept: &str) -> Result<(), SchemaViolation> {
    if media.top_level_type() != accept {
        return Err(SchemaViolation::new(
            field,
            format!("expected {accept}/* media, got {}", media.mime_type()),
        ));
    }
    Ok(())
}

fn check_category(field: &str, value: &str, values: &[&str]) -> Result<(), SchemaViolation> {
    if !values.contains(&value) {
        return Err(SchemaViolation::new(
            field,
            format!("'{value}' is not one of {}", values.join(", ")),
        ));
    }
    Ok(())
}

fn expected_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Text { .. } => "text",
        FieldKind::Number => "number",
        FieldKind::Media { .. } => "a data URI",
        FieldKind::Category { .. } => "category",
        FieldKind::TextList => "list of text",
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
