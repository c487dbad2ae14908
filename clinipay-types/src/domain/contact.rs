//! Customer identifier validation.
//!
//! Both checks run before any network call or state change: a malformed
//! email (card rail) or a phone number that cannot be normalized to
//! international form (mobile-money rail) is a validation error, distinct
//! from any provider-side failure.

use crate::error::DomainError;

/// Validates an email address well enough to hand to the card gateway.
pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::Validation(format!(
            "invalid email address: {}",
            email
        )));
    };

    if local.is_empty()
        || domain.is_empty()
        || domain.starts_with('.')
        || domain.ends_with('.')
        || !domain.contains('.')
        || email.contains(char::is_whitespace)
    {
        return Err(DomainError::Validation(format!(
            "invalid email address: {}",
            email
        )));
    }

    Ok(())
}

/// Normalizes a Kenyan MSISDN to international `254…` form.
///
/// Accepts `+2547XXXXXXXX`, `2547XXXXXXXX`, `07XXXXXXXX` and `01XXXXXXXX`
/// (and their `1` prefixed mobile ranges). Anything else fails fast.
pub fn normalize_phone(phone: &str) -> Result<String, DomainError> {
    let digits: String = phone
        .trim()
        .strip_prefix('+')
        .unwrap_or(phone.trim())
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::Validation(format!(
            "phone number contains non-digits: {}",
            phone
        )));
    }

    let normalized = if let Some(rest) = digits.strip_prefix("254") {
        if rest.len() == 9 && (rest.starts_with('7') || rest.starts_with('1')) {
            digits.clone()
        } else {
            return Err(DomainError::Validation(format!(
                "phone number not a valid mobile MSISDN: {}",
                phone
            )));
        }
    } else if digits.len() == 10 && (digits.starts_with("07") || digits.starts_with("01")) {
        format!("254{}", &digits[1..])
    } else {
        return Err(DomainError::Validation(format!(
            "phone number not normalizable to international format: {}",
            phone
        )));
    };

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("patient@example.com").is_ok());
        assert!(validate_email("a.b+tag@clinic.co.ke").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("user@.com").is_err());
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("0112345678").unwrap(), "254112345678");
        assert_eq!(normalize_phone("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("0712 345 678").unwrap(), "254712345678");
    }

    #[test]
    fn test_phone_rejections() {
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("0812345678").is_err());
        assert!(normalize_phone("25471234567").is_err());
        assert!(normalize_phone("07123456xx").is_err());
    }
}
