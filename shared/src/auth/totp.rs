//! # Time-Based One-Time Passwords (RFC 6238)
//!
//! Second-factor verification for accounts with `totp_enabled`.
//!
//! ## Parameters
//!
//! | Parameter | Value | Notes |
//! |-----------|-------|-------|
//! | Step | 30 s | Industry default, matches authenticator apps |
//! | Digits | 6 | |
//! | Algorithm | SHA-1 | Required for Google Authenticator compatibility |
//! | Skew | ±1 step | Tolerates client clock drift |
//!
//! ## Enrollment Flow
//!
//! ```text
//! ┌──────────┐   generate_secret()   ┌───────────────┐
//! │ Gateway  │──────────────────────►│ base32 secret │
//! └────┬─────┘                       └───────┬───────┘
//!      │ provisioning_uri()                  │ scanned as QR
//!      ▼                                     ▼
//!  otpauth://totp/...              Authenticator app
//!      │                                     │
//!      └────────── verify(secret, code) ◄────┘
//! ```
//!
//! The secret is stored on the user row (`totp_secret`) and only flips
//! `totp_enabled` after the user proves possession with one valid code.

use crate::errors::ApiError;
use totp_rs::{Secret, TOTP};

/// TOTP step length in seconds.
const STEP_SECONDS: u64 = 30;

/// Number of code digits.
const DIGITS: usize = 6;

/// Accepted clock skew in steps (±1).
const SKEW: u8 = 1;

/// Stateless RFC 6238 verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotpVerifier;

impl TotpVerifier {
    /// Generates a fresh base32-encoded 160-bit secret for enrollment.
    pub fn generate_secret() -> Result<String, ApiError> {
        let Secret::Encoded(encoded) = Secret::generate_secret().to_encoded() else {
            return Err(ApiError::InternalError {
                message: "TOTP secret encoding failed".to_string(),
            });
        };
        Ok(encoded)
    }

    /// Builds the `otpauth://` provisioning URI rendered as a QR code.
    ///
    /// `issuer` and `account` must be display-safe strings (no `:` or `?`).
    pub fn provisioning_uri(secret_base32: &str, issuer: &str, account: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret_base32}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}"
        )
    }

    /// Verifies a user-supplied code against the stored secret.
    ///
    /// Accepts the current step plus one step in either direction.
    pub fn verify(secret_base32: &str, code: &str) -> Result<bool, ApiError> {
        let totp = Self::build(secret_base32)?;

        totp.check_current(code).map_err(|_| ApiError::InternalError {
            message: "System clock is before the Unix epoch".to_string(),
        })
    }

    /// Generates the code for the current step.
    ///
    /// Used by enrollment tests and the CLI; verification always goes
    /// through [`TotpVerifier::verify`].
    pub fn current_code(secret_base32: &str) -> Result<String, ApiError> {
        let totp = Self::build(secret_base32)?;

        totp.generate_current().map_err(|_| ApiError::InternalError {
            message: "System clock is before the Unix epoch".to_string(),
        })
    }

    fn build(secret_base32: &str) -> Result<TOTP, ApiError> {
        let secret = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|_| ApiError::BadRequest {
                message: "Invalid TOTP secret".to_string(),
            })?;

        TOTP::new(totp_rs::Algorithm::SHA1, DIGITS, SKEW, STEP_SECONDS, secret).map_err(|_| {
            ApiError::BadRequest {
                message: "Invalid TOTP secret".to_string(),
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_is_base32() {
        let secret = TotpVerifier::generate_secret().unwrap();
        assert!(!secret.is_empty());
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn test_current_code_verifies() {
        let secret = TotpVerifier::generate_secret().unwrap();
        let code = TotpVerifier::current_code(&secret).unwrap();

        assert_eq!(code.len(), 6);
        assert!(TotpVerifier::verify(&secret, &code).unwrap());
    }

    #[test]
    fn test_wrong_code_fails() {
        let secret = TotpVerifier::generate_secret().unwrap();
        let code = TotpVerifier::current_code(&secret).unwrap();

        // Flip one digit
        let wrong: String = code
            .chars()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    char::from_digit((c.to_digit(10).unwrap() + 1) % 10, 10).unwrap()
                } else {
                    c
                }
            })
            .collect();

        assert!(!TotpVerifier::verify(&secret, &wrong).unwrap());
    }

    #[test]
    fn test_codes_differ_between_secrets() {
        let a = TotpVerifier::generate_secret().unwrap();
        let b = TotpVerifier::generate_secret().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_secret_is_rejected() {
        assert!(TotpVerifier::verify("not base32 !!!", "123456").is_err());
    }

    #[test]
    fn test_provisioning_uri_format() {
        let uri = TotpVerifier::provisioning_uri("JBSWY3DPEHPK3PXP", "AuthGateway", "alice");
        assert!(uri.starts_with("otpauth://totp/AuthGateway:alice?"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("algorithm=SHA1"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
    }
}
