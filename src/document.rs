use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::cli::TemplateMode;

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const MODEL_ID_FIELD: &str = "model_id";
pub const PROVIDER_ID_FIELD: &str = "provider_id";
pub const SCORE_FIELD: &str = "normalized_score";
pub const AVG_SCORE_FIELD: &str = "avg_benchmark_score";

const EXTJSON_NUMBER_WRAPPERS: [&str; 4] =
    ["$numberDouble", "$numberInt", "$numberLong", "$numberDecimal"];

/// Join key for `model_id`. Strings and numbers never compare equal to each other.
/// Strings match exactly; numbers match by value, so `1` and `1.0` are one key,
/// the same equality an upsert filter applies in storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelKey {
    Text(String),
    Number(String),
}

impl ModelKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Number(number) => number
                .as_f64()
                .filter(|value| value.is_finite())
                // -0.0 and 0.0 are the same key
                .map(|value| if value == 0.0 { 0.0 } else { value })
                .map(|value| Self::Number(value.to_string())),
            _ => None,
        }
    }

    pub fn of(document: &Document) -> Option<Self> {
        document.get(MODEL_ID_FIELD).and_then(Self::from_value)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => f.write_str(number),
        }
    }
}

/// Field names used to default one-sided records, never including `_id`.
pub fn field_template(documents: &[Document], mode: TemplateMode) -> BTreeSet<String> {
    let sources: &[Document] = match mode {
        TemplateMode::FirstRecord => documents.get(..1).unwrap_or_default(),
        TemplateMode::Union => documents,
    };

    sources
        .iter()
        .flat_map(|document| document.keys())
        .filter(|name| name.as_str() != ID_FIELD)
        .cloned()
        .collect()
}

/// Reads a numeric score, accepting plain JSON numbers and extended-JSON number
/// wrappers. Anything else, and non-finite values, yield `None`.
pub fn numeric_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::Object(map) if map.len() == 1 => EXTJSON_NUMBER_WRAPPERS
            .iter()
            .find_map(|wrapper| map.get(*wrapper))
            .and_then(Value::as_str)
            .and_then(|raw| raw.trim().parse::<f64>().ok()),
        _ => None,
    };

    parsed.filter(|score| score.is_finite())
}
