//! FlowTrack Public Form Schema
//!
//! Shared model for FlowTrack's embeddable lead-capture forms. The schema
//! is authored in the form builder, served by the public forms API, and
//! consumed by the embed runtime, which validates input against it before
//! any submission leaves the page.
//!
//! ## Features
//! - Wire-compatible schema types (camelCase JSON)
//! - Per-field-type validation engine
//! - Submission value model (fresh empty values per mount)
//! - Allow-list HTML sanitizer for rich header/description content

pub mod sanitize;
pub mod validation;
pub mod values;

pub use sanitize::sanitize_html;
pub use validation::{validate_field, validate_form, FieldError};
pub use values::{initial_values, FieldValue};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Core Types
// =============================================================================

/// A published form as served by `GET /forms/public/{slug}`.
///
/// Immutable for the lifetime of a mount; the embed fetches it once and
/// never re-reads it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    #[serde(default)]
    pub slug: String,
    /// Schema revision, echoed back as `formVersion` in submissions.
    #[serde(default = "default_version")]
    pub version: u32,
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub settings: FormSettings,
    /// Inactive forms are served but must not accept submissions.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl FormSchema {
    /// Look up a field by its key.
    pub fn field(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.field_key == key)
    }

    /// Fields in display order (stable for equal `display_order`).
    pub fn sorted_fields(&self) -> Vec<&FormField> {
        let mut fields: Vec<&FormField> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.display_order);
        fields
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Unique key within the schema; submission values are keyed by it.
    pub field_key: String,
    #[serde(default)]
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_rules: Option<ValidationRules>,
    /// Declared choices for DROPDOWN fields; empty for everything else.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default)]
    pub display_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Number,
    Url,
    Textarea,
    Dropdown,
    Date,
    Checkbox,
    /// Types this build does not know about; validation passes them through.
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Custom regex applied to TEXT / TEXTAREA / PHONE values. A pattern
    /// that fails to compile disables the rule rather than failing the
    /// field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Message shown when `pattern` rejects the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Rendering hint for numeric inputs; not validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldOption {
    pub label: String,
    pub value: String,
}

/// Presentation settings attached to a schema. Every field has a default
/// so a sparse `settings` object from the API still deserializes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormSettings {
    pub submit_button_text: String,
    pub success_message: String,
    /// Navigated to 1.5s after a successful submission when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Rich content; untrusted until it crosses [`sanitize_html`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_html: Option<String>,
    pub show_header: bool,
    pub show_description: bool,
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            submit_button_text: "Submit".to_string(),
            success_message: "Thank you for your submission.".to_string(),
            redirect_url: None,
            header_html: None,
            description_html: None,
            show_header: true,
            show_description: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}
