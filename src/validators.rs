/// Input validators for account credentials and planner text fields
///
/// Emails are normalized (trimmed, lowercased) before any comparison or
/// storage, so lookups are case-insensitive. Free-text fields are trimmed and
/// bounded in characters.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt reads at most 72 bytes of input
pub const MAX_PASSWORD_LENGTH: usize = 72;

pub const MAX_NAME_LENGTH: usize = 100;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*$"
    ).unwrap();
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize and validate an email address for registration.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let normalized = normalize_email(email);

    if normalized.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if normalized.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if normalized.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(&normalized) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(normalized)
}

/// Check password length bounds, in bytes.
///
/// Anything past `MAX_PASSWORD_LENGTH` would be ignored by bcrypt, so longer
/// passwords are refused instead of silently truncated.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    Ok(())
}

/// Trim a required text field and check its length in characters.
pub fn required_text(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }
    optional_text(field, trimmed, max)
}

/// Trim an optional text field and check its length in characters.
///
/// An empty value is allowed and comes back empty.
pub fn optional_text(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong(field.to_string(), max));
    }
    Ok(trimmed.to_string())
}

/// Trim the optional display name given at registration. Blank means none.
pub fn display_name(name: Option<&str>) -> Result<Option<String>, ValidationError> {
    match name {
        None => Ok(None),
        Some(name) => {
            let name = optional_text("name", name, MAX_NAME_LENGTH)?;
            Ok(Some(name).filter(|n| !n.is_empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@Example.COM "), "a@example.com");
    }

    #[test]
    fn test_valid_emails() {
        for email in ["a@example.com", "john.doe+tag@mail.example.org", " Bob@Example.com"] {
            assert!(is_valid_email(email).is_ok(), "should accept {}", email);
        }
        assert_eq!(is_valid_email(" Bob@Example.com").unwrap(), "bob@example.com");
    }

    #[test]
    fn test_invalid_emails() {
        for email in ["", "   ", "notanemail", "user@", "@example.com", "user@@example.com"] {
            assert!(is_valid_email(email).is_err(), "should reject {:?}", email);
        }
    }

    #[test]
    fn test_email_too_long() {
        let email = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            is_valid_email(&email),
            Err(ValidationError::TooLong(_, MAX_EMAIL_LENGTH))
        ));
    }

    #[test]
    fn test_password_bounds() {
        assert!(is_valid_password("password123").is_ok());
        assert!(matches!(
            is_valid_password(""),
            Err(ValidationError::EmptyField(_))
        ));
        assert!(matches!(
            is_valid_password("short"),
            Err(ValidationError::TooShort(_, MIN_PASSWORD_LENGTH))
        ));
        assert!(matches!(
            is_valid_password(&"a".repeat(MAX_PASSWORD_LENGTH + 1)),
            Err(ValidationError::TooLong(_, MAX_PASSWORD_LENGTH))
        ));
    }

    #[test]
    fn test_password_limit_counts_bytes() {
        assert!(is_valid_password(&"a".repeat(72)).is_ok());
        // 36 two-byte characters fill the limit, one more goes over
        assert!(is_valid_password(&"é".repeat(36)).is_ok());
        assert!(is_valid_password(&"é".repeat(37)).is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(None).unwrap(), None);
        assert_eq!(display_name(Some("   ")).unwrap(), None);
        assert_eq!(display_name(Some("  Ada ")).unwrap(), Some("Ada".to_string()));
        assert!(matches!(
            display_name(Some(&"n".repeat(MAX_NAME_LENGTH + 1))),
            Err(ValidationError::TooLong(_, MAX_NAME_LENGTH))
        ));
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("title", "  Buy milk ", 10).unwrap(), "Buy milk");
        assert!(matches!(
            required_text("title", "   ", 10),
            Err(ValidationError::EmptyField(_))
        ));
        // Limits count characters, not bytes
        assert!(required_text("title", &"é".repeat(10), 10).is_ok());
        assert!(required_text("title", &"é".repeat(11), 10).is_err());
    }
}
