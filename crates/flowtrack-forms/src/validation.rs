//! Field validation engine
//!
//! Pure per-field-type rules, mirroring what the public submit endpoint
//! enforces server-side. The embed runs these on edit and again before
//! submission; a form with a non-empty error map never reaches the network.

use crate::values::FieldValue;
use crate::{FieldOption, FieldType, FormField, ValidationRules};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use url::Url;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Machine-readable reasons attached to a [`FieldError`]. Server-side
/// validation responses carry their own codes, which pass through verbatim.
pub mod code {
    pub const REQUIRED: &str = "required";
    pub const INVALID_FORMAT: &str = "invalid_format";
    pub const OUT_OF_RANGE: &str = "out_of_range";
    pub const TOO_SHORT: &str = "too_short";
    pub const TOO_LONG: &str = "too_long";
    pub const NOT_AN_OPTION: &str = "not_an_option";
}

/// A single field's validation failure. Maps returned by the engine key
/// these by `field_key`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(message: impl Into<String>, code: &str) -> Self {
        Self {
            message: message.into(),
            code: code.to_string(),
        }
    }
}

/// Validate one field against its current value.
///
/// `None` means the value is acceptable. A missing value (field never
/// rendered) counts as empty. Never panics: malformed custom patterns
/// disable their rule instead of failing the field.
pub fn validate_field(field: &FormField, value: Option<&FieldValue>) -> Option<FieldError> {
    let empty = match value {
        None => true,
        Some(v) => v.is_empty_text(),
    };

    if empty {
        if field.is_required {
            return Some(FieldError::new(
                format!("{} is required", field.label),
                code::REQUIRED,
            ));
        }
        // Optional and empty: no further rule applies
        return None;
    }

    let value = value?;
    let rules = field.validation_rules.as_ref();

    match field.field_type {
        FieldType::Text | FieldType::Textarea => text_rules(value.as_text()?, rules),
        FieldType::Email => email_rules(value.as_text()?, rules),
        FieldType::Phone => phone_rules(value.as_text()?, rules),
        FieldType::Number => number_rules(value.as_text()?, rules),
        FieldType::Url => url_rules(value.as_text()?),
        FieldType::Date => date_rules(value.as_text()?, rules),
        FieldType::Dropdown => dropdown_rules(value.as_text()?, &field.options),
        FieldType::Checkbox => checkbox_rule(field, value),
        FieldType::Other => None,
    }
}

/// Validate a whole value map against the schema's fields.
///
/// Every field is evaluated independently; an early failure never hides a
/// later one. An empty result means the form is submittable.
pub fn validate_form(
    fields: &[FormField],
    values: &HashMap<String, FieldValue>,
) -> BTreeMap<String, FieldError> {
    let mut errors = BTreeMap::new();
    for field in fields {
        if let Some(err) = validate_field(field, values.get(&field.field_key)) {
            errors.insert(field.field_key.clone(), err);
        }
    }
    errors
}

// =============================================================================
// Per-type rules
// =============================================================================

fn text_rules(value: &str, rules: Option<&ValidationRules>) -> Option<FieldError> {
    let rules = rules?;
    let length = value.chars().count() as u32;

    if let Some(min) = rules.min_length {
        if length < min {
            return Some(FieldError::new(
                format!("Must be at least {} characters", min),
                code::TOO_SHORT,
            ));
        }
    }
    if let Some(max) = rules.max_length {
        if length > max {
            return Some(FieldError::new(
                format!("Must be at most {} characters", max),
                code::TOO_LONG,
            ));
        }
    }
    pattern_rule(value, rules)
}

fn email_rules(value: &str, rules: Option<&ValidationRules>) -> Option<FieldError> {
    if let Ok(re) = Regex::new(EMAIL_PATTERN) {
        if !re.is_match(value) {
            return Some(FieldError::new(
                "Please enter a valid email address",
                code::INVALID_FORMAT,
            ));
        }
    }
    if let Some(max) = rules.and_then(|r| r.max_length) {
        if value.chars().count() as u32 > max {
            return Some(FieldError::new(
                format!("Must be at most {} characters", max),
                code::TOO_LONG,
            ));
        }
    }
    None
}

fn phone_rules(value: &str, rules: Option<&ValidationRules>) -> Option<FieldError> {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 10 {
        return Some(FieldError::new(
            "Please enter a valid phone number",
            code::INVALID_FORMAT,
        ));
    }
    rules.and_then(|r| pattern_rule(value, r))
}

fn number_rules(value: &str, rules: Option<&ValidationRules>) -> Option<FieldError> {
    let parsed: f64 = match value.trim().parse() {
        Ok(n) => n,
        Err(_) => {
            return Some(FieldError::new("Please enter a number", code::INVALID_FORMAT));
        }
    };
    // "inf" and "NaN" parse successfully but are not acceptable input
    if !parsed.is_finite() {
        return Some(FieldError::new("Please enter a number", code::INVALID_FORMAT));
    }

    let rules = rules?;
    if let Some(min) = rules.min {
        if parsed < min {
            return Some(FieldError::new(
                format!("Must be at least {}", min),
                code::OUT_OF_RANGE,
            ));
        }
    }
    if let Some(max) = rules.max {
        if parsed > max {
            return Some(FieldError::new(
                format!("Must be at most {}", max),
                code::OUT_OF_RANGE,
            ));
        }
    }
    None
}

fn url_rules(value: &str) -> Option<FieldError> {
    let acceptable = match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    };
    if acceptable {
        None
    } else {
        Some(FieldError::new(
            "Please enter a valid URL starting with http:// or https://",
            code::INVALID_FORMAT,
        ))
    }
}

fn date_rules(value: &str, rules: Option<&ValidationRules>) -> Option<FieldError> {
    let date = match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => {
            return Some(FieldError::new("Please enter a valid date", code::INVALID_FORMAT));
        }
    };

    let rules = rules?;
    if let Some(min) = rules.min_date {
        if date < min {
            return Some(FieldError::new(
                format!("Date must be on or after {}", min),
                code::OUT_OF_RANGE,
            ));
        }
    }
    if let Some(max) = rules.max_date {
        if date > max {
            return Some(FieldError::new(
                format!("Date must be on or before {}", max),
                code::OUT_OF_RANGE,
            ));
        }
    }
    None
}

fn dropdown_rules(value: &str, options: &[FieldOption]) -> Option<FieldError> {
    // A dropdown without declared options cannot reject anything
    if options.is_empty() {
        return None;
    }
    if options.iter().any(|o| o.value == value) {
        None
    } else {
        Some(FieldError::new(
            "Please select a valid option",
            code::NOT_AN_OPTION,
        ))
    }
}

fn checkbox_rule(field: &FormField, value: &FieldValue) -> Option<FieldError> {
    if field.is_required && !value.is_checked() {
        return Some(FieldError::new(
            "Please check this box to continue",
            code::REQUIRED,
        ));
    }
    None
}

fn pattern_rule(value: &str, rules: &ValidationRules) -> Option<FieldError> {
    let pattern = rules.pattern.as_deref()?;
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            debug!("ignoring malformed validation pattern: {}", e);
            return None;
        }
    };

    if re.is_match(value) {
        None
    } else {
        let message = rules
            .custom_error
            .clone()
            .unwrap_or_else(|| "Invalid format".to_string());
        Some(FieldError::new(message, code::INVALID_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(key: &str, field_type: FieldType, required: bool) -> FormField {
        FormField {
            field_key: key.to_string(),
            label: key.to_string(),
            field_type,
            is_required: required,
            validation_rules: None,
            options: Vec::new(),
            display_order: 0,
            placeholder: None,
        }
    }

    fn with_rules(mut f: FormField, rules: ValidationRules) -> FormField {
        f.validation_rules = Some(rules);
        f
    }

    fn text(v: &str) -> FieldValue {
        FieldValue::text(v)
    }

    #[test]
    fn test_empty_fails_iff_required() {
        let all_types = [
            FieldType::Text,
            FieldType::Email,
            FieldType::Phone,
            FieldType::Number,
            FieldType::Url,
            FieldType::Textarea,
            FieldType::Dropdown,
            FieldType::Date,
            FieldType::Checkbox,
            FieldType::Other,
        ];

        for t in all_types {
            let required = field("f", t, true);
            let optional = field("f", t, false);
            assert!(
                validate_field(&required, Some(&text(""))).is_some(),
                "required {:?} must reject empty",
                t
            );
            assert!(
                validate_field(&optional, Some(&text(""))).is_none(),
                "optional {:?} must accept empty",
                t
            );
            // Absent value behaves like empty
            assert!(validate_field(&required, None).is_some());
            assert!(validate_field(&optional, None).is_none());
        }
    }

    #[test]
    fn test_required_message_uses_label() {
        let mut f = field("email", FieldType::Email, true);
        f.label = "Work Email".to_string();
        let err = validate_field(&f, Some(&text(""))).unwrap();
        assert_eq!(err.message, "Work Email is required");
        assert_eq!(err.code, code::REQUIRED);
    }

    #[test]
    fn test_email_format() {
        let f = field("email", FieldType::Email, true);
        assert!(validate_field(&f, Some(&text("a@b.co"))).is_none());
        assert!(validate_field(&f, Some(&text("user.name+tag@example.org"))).is_none());

        for bad in ["not-an-email", "a@b", "a b@c.com", "a@b c.com", "@b.com"] {
            let err = validate_field(&f, Some(&text(bad)));
            assert!(err.is_some(), "{:?} should be rejected", bad);
            assert_eq!(err.unwrap().code, code::INVALID_FORMAT);
        }
    }

    #[test]
    fn test_email_respects_max_length() {
        let f = with_rules(
            field("email", FieldType::Email, true),
            ValidationRules {
                max_length: Some(12),
                ..Default::default()
            },
        );
        assert!(validate_field(&f, Some(&text("a@b.co"))).is_none());
        let err = validate_field(&f, Some(&text("long.address@example.com"))).unwrap();
        assert_eq!(err.code, code::TOO_LONG);
    }

    #[test]
    fn test_phone_needs_ten_digits() {
        let f = field("phone", FieldType::Phone, true);
        assert!(validate_field(&f, Some(&text("(555) 123-4567"))).is_none());
        assert!(validate_field(&f, Some(&text("+1 555 123 4567"))).is_none());

        let err = validate_field(&f, Some(&text("555-1234"))).unwrap();
        assert_eq!(err.message, "Please enter a valid phone number");
    }

    #[test]
    fn test_phone_custom_pattern_and_message() {
        let f = with_rules(
            field("phone", FieldType::Phone, true),
            ValidationRules {
                pattern: Some(r"^\+44".to_string()),
                custom_error: Some("UK numbers only".to_string()),
                ..Default::default()
            },
        );
        assert!(validate_field(&f, Some(&text("+44 20 7946 0958"))).is_none());
        let err = validate_field(&f, Some(&text("+1 555 123 4567"))).unwrap();
        assert_eq!(err.message, "UK numbers only");
    }

    #[test]
    fn test_number_bounds() {
        let f = with_rules(
            field("qty", FieldType::Number, true),
            ValidationRules {
                min: Some(5.0),
                max: Some(20.0),
                ..Default::default()
            },
        );

        assert!(validate_field(&f, Some(&text("10"))).is_none());
        // Bounds are inclusive
        assert!(validate_field(&f, Some(&text("5"))).is_none());
        assert!(validate_field(&f, Some(&text("20"))).is_none());

        let low = validate_field(&f, Some(&text("3"))).unwrap();
        assert!(low.message.contains("at least 5"), "{}", low.message);
        let high = validate_field(&f, Some(&text("21"))).unwrap();
        assert!(high.message.contains("at most 20"), "{}", high.message);
    }

    #[test]
    fn test_number_rejects_non_numeric() {
        let f = field("qty", FieldType::Number, true);
        for bad in ["abc", "1.2.3", "inf", "NaN"] {
            let err = validate_field(&f, Some(&text(bad)));
            assert!(err.is_some(), "{:?} should be rejected", bad);
            assert!(err.unwrap().message.contains("enter a number"));
        }
        assert!(validate_field(&f, Some(&text("-3.5"))).is_none());
    }

    #[test]
    fn test_url_scheme() {
        let f = field("site", FieldType::Url, true);
        assert!(validate_field(&f, Some(&text("https://example.com"))).is_none());
        assert!(validate_field(&f, Some(&text("http://example.com/path?q=1"))).is_none());

        for bad in ["example.com", "ftp://example.com", "javascript:alert(1)", "not a url"] {
            assert!(
                validate_field(&f, Some(&text(bad))).is_some(),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_text_length_rules() {
        let f = with_rules(
            field("name", FieldType::Text, true),
            ValidationRules {
                min_length: Some(2),
                max_length: Some(5),
                ..Default::default()
            },
        );
        assert!(validate_field(&f, Some(&text("abc"))).is_none());
        assert_eq!(
            validate_field(&f, Some(&text("a"))).unwrap().code,
            code::TOO_SHORT
        );
        assert_eq!(
            validate_field(&f, Some(&text("abcdef"))).unwrap().code,
            code::TOO_LONG
        );
    }

    #[test]
    fn test_text_custom_pattern() {
        let f = with_rules(
            field("code", FieldType::Text, true),
            ValidationRules {
                pattern: Some(r"^[A-Z]{3}-\d{4}$".to_string()),
                custom_error: Some("Use the format ABC-1234".to_string()),
                ..Default::default()
            },
        );
        assert!(validate_field(&f, Some(&text("XYZ-9876"))).is_none());
        let err = validate_field(&f, Some(&text("nope"))).unwrap();
        assert_eq!(err.message, "Use the format ABC-1234");
    }

    #[test]
    fn test_malformed_pattern_disables_rule() {
        let f = with_rules(
            field("code", FieldType::Text, true),
            ValidationRules {
                pattern: Some("(unclosed".to_string()),
                ..Default::default()
            },
        );
        assert!(validate_field(&f, Some(&text("anything"))).is_none());
    }

    #[test]
    fn test_date_parse_and_bounds() {
        let f = with_rules(
            field("when", FieldType::Date, true),
            ValidationRules {
                min_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                max_date: NaiveDate::from_ymd_opt(2024, 12, 31),
                ..Default::default()
            },
        );

        assert!(validate_field(&f, Some(&text("2024-06-15"))).is_none());
        // Boundary dates pass
        assert!(validate_field(&f, Some(&text("2024-01-01"))).is_none());
        assert!(validate_field(&f, Some(&text("2024-12-31"))).is_none());

        assert_eq!(
            validate_field(&f, Some(&text("2023-12-31"))).unwrap().code,
            code::OUT_OF_RANGE
        );
        assert_eq!(
            validate_field(&f, Some(&text("2025-01-01"))).unwrap().code,
            code::OUT_OF_RANGE
        );
        assert_eq!(
            validate_field(&f, Some(&text("June 15"))).unwrap().code,
            code::INVALID_FORMAT
        );
    }

    #[test]
    fn test_dropdown_membership() {
        let mut f = field("plan", FieldType::Dropdown, true);
        f.options = vec![
            FieldOption {
                label: "Starter".to_string(),
                value: "starter".to_string(),
            },
            FieldOption {
                label: "Pro".to_string(),
                value: "pro".to_string(),
            },
        ];

        assert!(validate_field(&f, Some(&text("pro"))).is_none());
        let err = validate_field(&f, Some(&text("enterprise"))).unwrap();
        assert_eq!(err.code, code::NOT_AN_OPTION);

        // No declared options: nothing to enforce
        let open = field("plan", FieldType::Dropdown, true);
        assert!(validate_field(&open, Some(&text("anything"))).is_none());
    }

    #[test]
    fn test_checkbox_required_message() {
        let f = field("consent", FieldType::Checkbox, true);
        assert!(validate_field(&f, Some(&FieldValue::Checked(true))).is_none());

        let err = validate_field(&f, Some(&FieldValue::Checked(false))).unwrap();
        assert_eq!(err.message, "Please check this box to continue");

        let optional = field("consent", FieldType::Checkbox, false);
        assert!(validate_field(&optional, Some(&FieldValue::Checked(false))).is_none());
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let f = field("sig", FieldType::Other, false);
        assert!(validate_field(&f, Some(&text("whatever"))).is_none());
    }

    #[test]
    fn test_validate_form_evaluates_every_field() {
        let fields = vec![
            field("email", FieldType::Email, true),
            field("phone", FieldType::Phone, true),
            field("note", FieldType::Text, false),
        ];
        let mut values = HashMap::new();
        values.insert("email".to_string(), text("bad"));
        values.insert("phone".to_string(), text("123"));
        values.insert("note".to_string(), text(""));

        let errors = validate_form(&fields, &values);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("phone"));
    }

    #[test]
    fn test_validate_form_clean() {
        let fields = vec![
            field("email", FieldType::Email, true),
            field("name", FieldType::Text, false),
        ];
        let mut values = HashMap::new();
        values.insert("email".to_string(), text("a@b.com"));
        values.insert("name".to_string(), text(""));

        assert!(validate_form(&fields, &values).is_empty());
    }
}
