//! Prompt templates with named slots.
//!
//! Two slot forms are recognised:
//! - `{{{field}}}` interpolates a text (or number / category / list) field;
//! - `{{media url=field}}` attaches a media field as a separate prompt part.

use thiserror::Error;

use crate::flows::media::MediaRef;
use crate::flows::record::{FieldValue, FlowInputRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed tag starting at '{0}'")]
    Unclosed(String),

    #[error("unknown tag '{{{{{0}}}}}'")]
    UnknownTag(String),

    #[error("invalid slot name '{0}'")]
    InvalidSlotName(String),

    #[error("slot '{0}' has no value")]
    MissingValue(String),

    #[error("slot '{slot}' expects {expected}")]
    WrongValueKind { slot: String, expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Media,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Slot { name: String, kind: SlotKind },
}

/// One part of a rendered prompt, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Media(MediaRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub parts: Vec<PromptPart>,
}

impl RenderedPrompt {
    pub fn media_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Media(_)))
            .count()
    }

    /// Text parts joined, with media shown as placeholders. Used for logging.
    pub fn text_preview(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                PromptPart::Text(t) => t.clone(),
                PromptPart::Media(m) => format!("[{}]", m.mime_type()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let tag = &rest[start..];

            if let Some(body) = tag.strip_prefix("{{{") {
                let end = body.find("}}}").ok_or_else(|| unclosed(tag))?;
                segments.push(Segment::Slot {
                    name: slot_name(&body[..end])?,
                    kind: SlotKind::Text,
                });
                rest = &body[end + 3..];
            } else {
                let body = &tag[2..];
                let end = body.find("}}").ok_or_else(|| unclosed(tag))?;
                let inner = body[..end].trim();
                let target = inner
                    .strip_prefix("media")
                    .map(str::trim_start)
                    .and_then(|s| s.strip_prefix("url="))
                    .ok_or_else(|| TemplateError::UnknownTag(inner.to_string()))?;
                segments.push(Segment::Slot {
                    name: slot_name(target)?,
                    kind: SlotKind::Media,
                });
                rest = &body[end + 2..];
            }
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Slots in template order (a field used twice appears twice).
    pub fn slots(&self) -> impl Iterator<Item = (&str, SlotKind)> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot { name, kind } => Some((name.as_str(), *kind)),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, record: &FlowInputRecord) -> Result<RenderedPrompt, TemplateError> {
        let mut parts = Vec::new();
        let mut text = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => text.push_str(literal),
                Segment::Slot { name, kind } => {
                    let value = record
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingValue(name.clone()))?;
                    match kind {
                        SlotKind::Text => text.push_str(&interpolate(name, value)?),
                        SlotKind::Media => {
                            let media =
                                value.as_media().ok_or_else(|| TemplateError::WrongValueKind {
                                    slot: name.clone(),
                                    expected: "a media value",
                                })?;
                            if !text.is_empty() {
                                parts.push(PromptPart::Text(std::mem::take(&mut text)));
                            }
                            parts.push(PromptPart::Media(media.clone()));
                        }
                    }
                }
            }
        }

        if !text.is_empty() {
            parts.push(PromptPart::Text(text));
        }
        Ok(RenderedPrompt { parts })
    }
}

fn interpolate(slot: &str, value: &FieldValue) -> Result<String, TemplateError> {
    match value {
        FieldValue::Text(s) | FieldValue::Category(s) => Ok(s.clone()),
        FieldValue::Number(n) => Ok(n.to_string()),
        FieldValue::TextList(items) => Ok(items.join("\n")),
        FieldValue::Media(_) => Err(TemplateError::WrongValueKind {
            slot: slot.to_string(),
            expected: "a text value; use {{media url=...}} for media",
        }),
    }
}

fn slot_name(raw: &str) -> Result<String, TemplateError> {
    let name = raw.trim();
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(TemplateError::InvalidSlotName(name.to_string()));
    }
    Ok(name.to_string())
}

fn unclosed(tag: &str) -> TemplateError {
    TemplateError::Unclosed(tag.chars().take(24).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan() -> MediaRef {
        MediaRef::parse("data:image/png;base64,AAAA").unwrap()
    }

    #[test]
    fn test_parse_lists_slots_in_order() {
        let template =
            PromptTemplate::parse("Crop: {{{cropType}}}\nScan: {{media url=scan}}\n{{{ notes }}}")
                .unwrap();
        let slots: Vec<_> = template.slots().collect();
        assert_eq!(
            slots,
            vec![
                ("cropType", SlotKind::Text),
                ("scan", SlotKind::Media),
                ("notes", SlotKind::Text)
            ]
        );
    }

    #[test]
    fn test_render_text_slots() {
        let template = PromptTemplate::parse("Crop: {{{cropType}}}, region {{{region}}}.").unwrap();
        let record = FlowInputRecord::new()
            .with("cropType", "Cacao")
            .with("region", "Davao de Oro");
        let rendered = template.render(&record).unwrap();
        assert_eq!(
            rendered.parts,
            vec![PromptPart::Text("Crop: Cacao, region Davao de Oro.".to_string())]
        );
    }

    #[test]
    fn test_render_media_as_separate_part() {
        let template = PromptTemplate::parse("Scan:\n{{media url=scan}}\nHistory: {{{history}}}")
            .unwrap();
        let record = FlowInputRecord::new()
            .with("scan", scan())
            .with("history", "none");
        let rendered = template.render(&record).unwrap();
        assert_eq!(
            rendered.parts,
            vec![
                PromptPart::Text("Scan:\n".to_string()),
                PromptPart::Media(scan()),
                PromptPart::Text("\nHistory: none".to_string()),
            ]
        );
        assert_eq!(rendered.media_count(), 1);
        assert_eq!(rendered.text_preview(), "Scan:\n[image/png]\nHistory: none");
    }

    #[test]
    fn test_render_missing_value() {
        let template = PromptTemplate::parse("{{{cropType}}}").unwrap();
        assert_eq!(
            template.render(&FlowInputRecord::new()),
            Err(TemplateError::MissingValue("cropType".to_string()))
        );
    }

    #[test]
    fn test_media_slot_requires_media_value() {
        let template = PromptTemplate::parse("{{media url=scan}}").unwrap();
        let record = FlowInputRecord::new().with("scan", "data:image/png;base64,AAAA");
        assert!(matches!(
            template.render(&record),
            Err(TemplateError::WrongValueKind { .. })
        ));
    }

    #[test]
    fn test_text_slot_rejects_media_value() {
        let template = PromptTemplate::parse("{{{scan}}}").unwrap();
        let record = FlowInputRecord::new().with("scan", scan());
        assert!(matches!(
            template.render(&record),
            Err(TemplateError::WrongValueKind { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            PromptTemplate::parse("Crop: {{{cropType}}"),
            Err(TemplateError::Unclosed(_))
        ));
        assert!(matches!(
            PromptTemplate::parse("{{#each items}}"),
            Err(TemplateError::UnknownTag(_))
        ));
        assert!(matches!(
            PromptTemplate::parse("{{{crop type}}}"),
            Err(TemplateError::InvalidSlotName(_))
        ));
    }

    #[test]
    fn test_template_without_slots() {
        let template = PromptTemplate::parse("No slots here.").unwrap();
        assert_eq!(template.slots().count(), 0);
        let rendered = template.render(&FlowInputRecord::new()).unwrap();
        assert_eq!(rendered.parts, vec![PromptPart::Text("No slots here.".into())]);
    }
}
