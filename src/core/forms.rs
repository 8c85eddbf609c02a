//! JSON serialization of form validation errors for AJAX responses.
//!
//! A form reports errors as `field -> [messages]`. Only the first message
//! of each field is kept.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormErrors {
    /// A single form.
    Form(FieldErrors),
    /// A form set, one entry per sub-form in order.
    FormSet(Vec<FieldErrors>),
}

fn first_messages(errors: &FieldErrors) -> Value {
    let fields: Map<String, Value> = errors
        .iter()
        .filter_map(|(field, messages)| {
            messages
                .first()
                .map(|message| (field.clone(), Value::String(message.clone())))
        })
        .collect();
    Value::Object(fields)
}

/// `{"success": false, "errors": {...}}` for a form,
/// `{"success": false, "errors": [{...}, ...]}` for a form set.
pub fn errors_to_json(errors: &FormErrors) -> Value {
    let errors = match errors {
        FormErrors::Form(fields) => first_messages(fields),
        FormErrors::FormSet(forms) => Value::Array(forms.iter().map(first_messages).collect()),
    };
    json!({ "success": false, "errors": errors })
}

/// Same as [`errors_to_json`], as a response body.
pub fn errors_to_json_string(errors: &FormErrors) -> String {
    errors_to_json(errors).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_required() -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.insert("email".to_string(), vec!["Required".to_string()]);
        errors
    }

    #[test]
    fn single_form_keeps_first_message() {
        let mut errors = email_required();
        errors
            .get_mut("email")
            .unwrap()
            .push("Enter a valid email address".to_string());

        assert_eq!(
            errors_to_json(&FormErrors::Form(errors)),
            json!({"success": false, "errors": {"email": "Required"}})
        );
    }

    #[test]
    fn form_set_produces_one_entry_per_form() {
        let set = FormErrors::FormSet(vec![email_required(), FieldErrors::new()]);
        assert_eq!(
            errors_to_json(&set),
            json!({"success": false, "errors": [{"email": "Required"}, {}]})
        );
    }

    #[test]
    fn string_body_is_valid_json() {
        let body = errors_to_json_string(&FormErrors::Form(email_required()));
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["success"], false);
    }
}
