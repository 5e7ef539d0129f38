use crate::errors::ChallengeError;
use crate::stats::parse_duration;
use validator::{ValidationError, ValidationErrors};

const MAX_FEELING_CHARS: usize = 16;
const MAX_URL_LEN: usize = 1024;

pub fn validate_display_name(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("display_name_blank"));
    }
    Ok(())
}

/// Optional leading `+`, then 7 to 15 digits with spaces or dashes between.
/// An empty value is allowed and means "no phone number".
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') {
        return Err(ValidationError::new("phone_chars"));
    }
    let digits = body.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::new("phone_length"));
    }
    Ok(())
}

pub fn validate_idempotency_key(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("idempotency_key_blank"));
    }
    Ok(())
}

pub fn validate_duration(value: &str) -> Result<(), ValidationError> {
    parse_duration(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("duration_format"))
}

pub fn validate_feeling(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_FEELING_CHARS {
        return Err(ValidationError::new("feeling_length"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("feeling_whitespace"));
    }
    Ok(())
}

/// An empty value is allowed and means "no proof".
pub fn validate_proof_url(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(ValidationError::new("proof_url_length"));
    }
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ValidationError::new("proof_url_scheme"));
    }
    Ok(())
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Trims an optional field, mapping blank to `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl From<ValidationErrors> for ChallengeError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let codes: Vec<String> = errs.iter().map(|err| err.code.to_string()).collect();
                format!("{field}: {}", codes.join(", "))
            })
            .collect();
        fields.sort();
        ChallengeError::Validation(format!("invalid request ({})", fields.join("; ")))
    }
}
