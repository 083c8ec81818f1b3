//! # Request Validation and Identifier Normalization
//!
//! Utilities for validating incoming request data using the `validator`
//! crate, plus the single place where login identifiers are normalized.
//!
//! ## Overview
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`validate_request`] | Validate a struct implementing `Validate` |
//! | [`normalize_email`] | Lowercase + trim email addresses |
//! | [`normalize_phone`] | Canonicalize phone numbers to E.164 |
//! | [`validators`] | Custom validation functions |
//!
//! ## Why Normalization Lives Here
//!
//! Email, username, and phone all uniquely identify a user. Uniqueness only
//! holds if the same canonical form is used on **both writes and reads**, so
//! every repository and service must route identifiers through this module
//! before touching the database.
//!
//! ## Error Response Format
//!
//! When validation fails, the API returns a 400 Bad Request with details:
//!
//! ```json
//! {
//!   "code": "VALIDATION_ERROR",
//!   "message": "Validation error",
//!   "details": {
//!     "email": [
//!       { "code": "email", "message": "Invalid email format" }
//!     ]
//!   }
//! }
//! ```

use crate::errors::ApiError;
use validator::Validate;

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// This is the primary validation function. Use it in handlers to
/// validate incoming data.
///
/// ## Example
///
/// ```rust,ignore
/// async fn sign_in(body: Json<SignInRequest>) -> Result<impl Responder, ApiError> {
///     validate_request(&body)?;  // Returns early if invalid
///
///     // Continue with validated data
/// }
/// ```
///
/// ## Errors
///
/// Returns `ApiError::ValidationError` with field-level details if validation fails.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

// =============================================================================
// Identifier Normalization
// =============================================================================

/// Canonicalizes an email address: trimmed, lowercased.
///
/// Applied on registration, sign-in, OTP delivery, and every repository
/// lookup, so `Alice@Example.COM` and `alice@example.com` collapse to one
/// identity.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Canonicalizes a phone number to E.164 (`+` followed by digits).
///
/// Strips spaces, dashes, dots, and parentheses. A leading `00` prefix is
/// rewritten to `+`. Numbers that already start with `+` keep it.
///
/// ## Examples
///
/// - `"+1 (555) 123-4567"` → `"+15551234567"`
/// - `"0049 30 123456"` → `"+4930123456"`
///
/// ## Errors
///
/// Returns `ApiError::BadRequest` when anything but formatting characters
/// and digits remains, or when no digits are present.
pub fn normalize_phone(phone: &str) -> Result<String, ApiError> {
    let trimmed = phone.trim();
    let has_plus = trimmed.starts_with('+');

    let digits: String = trimmed
        .chars()
        .skip(usize::from(has_plus))
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::BadRequest {
            message: "Invalid phone number".to_string(),
        });
    }

    let digits = if !has_plus && digits.starts_with("00") {
        digits[2..].to_string()
    } else {
        digits
    };

    if digits.is_empty() || digits.len() > 15 {
        return Err(ApiError::BadRequest {
            message: "Invalid phone number".to_string(),
        });
    }

    Ok(format!("+{}", digits))
}

/// The kind of identifier a user presented at sign-in.
///
/// Email, username, and phone all uniquely identify a user; classification
/// decides which canonical form and which lookup column applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    /// Normalized email address
    Email(String),
    /// Normalized E.164 phone number
    Phone(String),
    /// Username, matched verbatim
    Username(String),
}

/// Classifies and normalizes a raw login identifier.
///
/// Anything containing `@` is an email; a leading `+` or all-digits string
/// is a phone number; everything else is a username.
pub fn classify_identifier(raw: &str) -> Result<LoginIdentifier, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest {
            message: "Identifier is required".to_string(),
        });
    }

    if trimmed.contains('@') {
        return Ok(LoginIdentifier::Email(normalize_email(trimmed)));
    }

    let digits_only = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
    if digits_only && trimmed.chars().any(|c| c.is_ascii_digit()) {
        return Ok(LoginIdentifier::Phone(normalize_phone(trimmed)?));
    }

    Ok(LoginIdentifier::Username(trimmed.to_string()))
}

// =============================================================================
// Custom Validators
// =============================================================================

/// Custom validation functions for use with `#[validate(custom)]`.
///
/// These functions follow the validator crate's signature:
/// `fn(&T) -> Result<(), ValidationError>`
pub mod validators {
    use validator::ValidationError;

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Validates an OAuth/API scope label.
    ///
    /// ## Rules
    ///
    /// - Only lowercase letters, digits, `:`, `_`, `-`, and `.`
    /// - Must not be blank
    ///
    /// ## Valid Examples
    ///
    /// - `"users:read"` ✓
    /// - `"auth:register"` ✓
    /// - `"openid"` ✓
    /// - `"all"` ✓ (wildcard)
    ///
    /// ## Invalid Examples
    ///
    /// - `"Users:Read"` ✗ (uppercase)
    /// - `"users read"` ✗ (space)
    pub fn valid_scope(value: &str) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::new("invalid_scope"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ':' | '_' | '-' | '.'))
        {
            return Err(ValidationError::new("invalid_scope"));
        }
        Ok(())
    }

    /// Validates a username: 3-64 chars, letters/digits/`_`/`-`/`.`,
    /// starting with a letter or digit.
    pub fn valid_username(value: &str) -> Result<(), ValidationError> {
        if value.len() < 3 || value.len() > 64 {
            return Err(ValidationError::new("invalid_username"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ValidationError::new("invalid_username"));
        }
        if !value
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::new("invalid_username"));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::validators::*;
    use super::*;

    #[test]
    fn test_not_blank_valid() {
        assert!(not_blank("hello").is_ok());
        assert!(not_blank("  hello  ").is_ok());
    }

    #[test]
    fn test_not_blank_invalid() {
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("\t\n").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("Alice@Example.COM"), "alice@example.com");
        assert_eq!(normalize_email("  bob@example.com  "), "bob@example.com");
    }

    #[test]
    fn test_normalize_phone_formats() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize_phone("0049 30 123456").unwrap(), "+4930123456");
        assert_eq!(normalize_phone("+4930123456").unwrap(), "+4930123456");
    }

    #[test]
    fn test_normalize_phone_rejects_garbage() {
        assert!(normalize_phone("not-a-number").is_err());
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("+").is_err());
        // E.164 caps at 15 digits
        assert!(normalize_phone("+1234567890123456").is_err());
    }

    #[test]
    fn test_classify_identifier() {
        assert_eq!(
            classify_identifier("Alice@Example.com").unwrap(),
            LoginIdentifier::Email("alice@example.com".to_string())
        );
        assert_eq!(
            classify_identifier("+1 555 123 4567").unwrap(),
            LoginIdentifier::Phone("+15551234567".to_string())
        );
        assert_eq!(
            classify_identifier("alice_1").unwrap(),
            LoginIdentifier::Username("alice_1".to_string())
        );
        assert!(classify_identifier("   ").is_err());
    }

    #[test]
    fn test_valid_scope() {
        assert!(valid_scope("users:read").is_ok());
        assert!(valid_scope("auth:register").is_ok());
        assert!(valid_scope("openid").is_ok());
        assert!(valid_scope("all").is_ok());
        assert!(valid_scope("offline_access").is_ok());

        assert!(valid_scope("").is_err());
        assert!(valid_scope("Users:Read").is_err());
        assert!(valid_scope("users read").is_err());
    }

    #[test]
    fn test_valid_username() {
        assert!(valid_username("alice").is_ok());
        assert!(valid_username("alice_1").is_ok());
        assert!(valid_username("a.b-c").is_ok());

        assert!(valid_username("ab").is_err()); // too short
        assert!(valid_username("_alice").is_err()); // leading symbol
        assert!(valid_username("alice bob").is_err()); // space
    }
}
