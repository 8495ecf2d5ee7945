//! Submission value model
//!
//! One [`FieldValue`] per schema field, created fresh per mount. Text-like
//! fields start as the empty string, checkboxes as `false`.

use crate::{FieldType, FormField};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single field's current input value.
///
/// Serializes untagged: a bare JSON string or bool, which is the shape the
/// public submit endpoint expects inside the `fields` map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// The text content, if this is a text-shaped value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Checked(_) => None,
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self, FieldValue::Checked(true))
    }

    /// Empty in the "nothing entered" sense: the empty string. A checkbox
    /// is never empty, only unchecked.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.is_empty())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Checked(b)
    }
}

/// Build the fresh per-mount value map: one entry per schema field, empty
/// string for text-like fields, `false` for checkboxes.
pub fn initial_values(fields: &[FormField]) -> HashMap<String, FieldValue> {
    fields
        .iter()
        .map(|f| {
            let value = match f.field_type {
                FieldType::Checkbox => FieldValue::Checked(false),
                _ => FieldValue::Text(String::new()),
            };
            (f.field_key.clone(), value)
        })
        .collect()
}
