use crate::error::{ApiError, FieldError};
use crate::schemas::RecordId;
use actix_web::{error::JsonPayloadError, HttpRequest};
use uuid::Uuid;

/// Collects field-level problems so a request is rejected with all of them
/// at once.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field,
                message: message.to_string(),
            });
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

pub fn parse_id(raw: &str, field: &'static str) -> Result<RecordId, ApiError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| ApiError::invalid(field, "Invalid ID format"))
}

pub fn char_len_between(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.chars().count())
}

pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

pub fn is_username(value: &str) -> bool {
    char_len_between(value, 3, 30)
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

pub fn is_valid_amount(amount: f64, min: f64) -> bool {
    amount.is_finite() && amount >= min
}

/// Turns malformed JSON bodies into the same 400 shape as field errors.
pub fn json_error_handler(err: JsonPayloadError, _: &HttpRequest) -> actix_web::Error {
    ApiError::invalid("body", err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failure() {
        let result = Checks::new()
            .check(false, "title", "Title is required")
            .check(true, "description", "unused")
            .check(false, "date", "Date must be valid")
            .finish();
        match result {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, vec!["title", "date"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ids_must_be_uuids() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_id(&id, "id").unwrap(), id);
        assert!(parse_id("507f1f77bcf86cd799439011", "id").is_err());
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("ana@example.com"));
        assert!(!is_email("ana.example.com"));
        assert!(!is_email("ana@localhost"));
        assert!(!is_email("a na@example.com"));
        assert!(!is_email("@example.com"));
    }

    #[test]
    fn usernames() {
        assert!(is_username("ana_99"));
        assert!(!is_username("an"));
        assert!(!is_username("ana-99"));
        assert!(!is_username(&"a".repeat(31)));
    }

    #[test]
    fn colors_and_amounts() {
        assert!(is_hex_color("#3B82F6"));
        assert!(is_hex_color("#fff"));
        assert!(!is_hex_color("3B82F6"));
        assert!(is_valid_amount(0.01, 0.01));
        assert!(!is_valid_amount(0.0, 0.01));
        assert!(!is_valid_amount(f64::NAN, 0.0));
    }
}
