use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::IntakeError;

/// Extractor confidence attached to a field. Informational only: nothing in the
/// classifier or the review workflow branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[serde(alias = "definitely wrong")]
    DefinitelyWrong,
    #[serde(alias = "low confidence")]
    Low,
    #[serde(alias = "medium confidence")]
    Medium,
    #[serde(alias = "strong confidence")]
    Strong,
}

impl Confidence {
    /// Accepts both the short tags and the labels the extraction prompt asks for.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "definitely_wrong" | "definitely wrong" => Some(Self::DefinitelyWrong),
            "low" | "low confidence" => Some(Self::Low),
            "medium" | "medium confidence" => Some(Self::Medium),
            "strong" | "strong confidence" => Some(Self::Strong),
            _ => None,
        }
    }
}

/// Primitive payload of an extracted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Text(flag.to_string()),
            Value::Number(number) => number
                .as_f64()
                .map(Self::Number)
                .unwrap_or_else(|| Self::Text(number.to_string())),
            Value::String(text) => Self::Text(text.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// Missing values, blank strings and empty lists all count as "not provided".
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// One extracted invoice field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFieldValue {
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl InvoiceFieldValue {
    pub fn new(value: FieldValue, confidence: Option<Confidence>) -> Self {
        Self { value, confidence }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(FieldValue::Text(value.into()), None)
    }
}

/// Named invoice fields as delivered by extraction, normalised to one shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    fields: BTreeMap<String, InvoiceFieldValue>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise a raw extractor object.
    ///
    /// Reasoning keys are dropped, bare values and `{value, confidence}` wrappers are
    /// both accepted, and empty values without a confidence are skipped.
    pub fn from_extraction(raw: &Value) -> Result<Self, IntakeError> {
        let object = raw.as_object().ok_or(IntakeError::NotAnObject)?;
        let mut fields = BTreeMap::new();

        for (name, entry) in object {
            if name.contains("reasoning") {
                continue;
            }

            let (value, confidence) = match entry {
                Value::Object(wrapper) if wrapper.contains_key("value") => (
                    wrapper.get("value").cloned().unwrap_or(Value::Null),
                    wrapper
                        .get("confidence")
                        .and_then(Value::as_str)
                        .and_then(Confidence::parse),
                ),
                other => (other.clone(), None),
            };

            if confidence.is_none() && is_empty_json(&value) {
                continue;
            }

            fields.insert(
                name.clone(),
                InvoiceFieldValue::new(FieldValue::from_json(&value), confidence),
            );
        }

        Ok(Self { fields })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: InvoiceFieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&InvoiceFieldValue> {
        self.fields.get(name)
    }

    /// The field's value, or `None` when the key is missing or blank.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .get(name)
            .map(|field| &field.value)
            .filter(|value| !value.is_blank())
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.value(name).is_none()
    }

    /// Non-blank text rendering of a field, used for code-like fields.
    pub fn text(&self, name: &str) -> Option<String> {
        self.value(name).map(|value| match value.as_text() {
            Some(text) => text.to_string(),
            None => value.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InvoiceFieldValue)> {
        self.fields.iter()
    }

    /// JSON object form persisted as a submission's `invoice_data`.
    pub fn to_json(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(name, field)| {
                serde_json::to_value(field)
                    .ok()
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }
}

impl FromIterator<(String, InvoiceFieldValue)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (String, InvoiceFieldValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
