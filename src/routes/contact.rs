// src/routes/contact.rs
//
// Contact-field validation shared by the patient and owner endpoints.

use crate::error::ApiError;

pub fn normalize_e164_strict(raw: &str) -> Result<String, ApiError> {
    let mut s = raw.trim().to_string();

    s = s.replace(' ', "")
        .replace('-', "")
        .replace('(', "")
        .replace(')', "")
        .replace('.', "");

    // Support "00" prefix
    if let Some(rest) = s.strip_prefix("00") {
        s = format!("+{rest}");
    }

    if !s.starts_with('+') {
        return Err(ApiError::validation(
            "phone number must start with + (E.164), e.g. +15551001",
        ));
    }

    let digits = &s[1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation("phone number must contain only digits after +"));
    }

    if digits.len() > 15 {
        return Err(ApiError::validation(
            "phone number too long for E.164 (max 15 digits)",
        ));
    }

    Ok(s)
}

/// Blank means "not provided".
pub fn optional_phone(raw: Option<String>) -> Result<Option<String>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) => normalize_e164_strict(p).map(Some),
    }
}

pub fn optional_email(raw: Option<String>) -> Result<Option<String>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(e) => {
            let valid = e
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
            if valid {
                Ok(Some(e.to_ascii_lowercase()))
            } else {
                Err(ApiError::validation(format!("invalid email address: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers_are_normalized() {
        assert_eq!(normalize_e164_strict("+1-555-0100").unwrap(), "+15550100");
        assert_eq!(normalize_e164_strict("0044 (20) 7946.0958").unwrap(), "+442079460958");
        assert!(normalize_e164_strict("555-0100").is_err());
        assert!(normalize_e164_strict("+1234567890123456").is_err());
        assert!(normalize_e164_strict("+1abc").is_err());
    }

    #[test]
    fn blank_contacts_are_absent() {
        assert_eq!(optional_phone(Some("  ".into())).unwrap(), None);
        assert_eq!(optional_email(None).unwrap(), None);
    }

    #[test]
    fn emails_get_a_light_check() {
        assert_eq!(
            optional_email(Some("Jane.Doe@Email.com".into())).unwrap().as_deref(),
            Some("jane.doe@email.com")
        );
        assert!(optional_email(Some("jane".into())).is_err());
        assert!(optional_email(Some("@x.com".into())).is_err());
    }
}
