//! # Password Hashing with Argon2id
//!
//! Secure password storage using the Argon2id algorithm.
//!
//! ## Why Argon2id?
//!
//! Argon2 won the [Password Hashing Competition](https://www.password-hashing.net/)
//! and is recommended by [OWASP](https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html).
//! The `id` variant resists both GPU cracking and side-channel attacks.
//!
//! ## Security Parameters (OWASP Recommended)
//!
//! | Parameter | Value | Purpose |
//! |-----------|-------|---------|
//! | Memory | 64 MiB | Makes attacks expensive (GPU memory) |
//! | Iterations | 3 | Time cost (slows brute force) |
//! | Parallelism | 4 | CPU lanes (matches typical cores) |
//! | Output | 32 bytes | Hash length |
//!
//! These settings balance security with acceptable response time (~100ms).
//!
//! ## PHC String Format
//!
//! ```text
//! $argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>
//! ```
//!
//! The stored string is self-describing, which enables the **rehash hint**:
//! when stored parameters drift from the current configuration (e.g. after
//! a cost bump), [`PasswordHasher::needs_rehash`] tells the caller to
//! re-hash on the next successful sign-in.
//!
//! ## Security Notes
//!
//! - **Never store plaintext passwords**
//! - **Each hash includes a unique salt** - same password → different hashes
//! - **Verification is constant-time** - prevents timing attacks

use crate::errors::ApiError;
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

// =============================================================================
// Password Hasher
// =============================================================================

/// Secure password hashing service using Argon2id.
///
/// ## Thread Safety
///
/// This type is `Clone` and `Send + Sync`, safe for concurrent use.
/// Each hash operation generates a new random salt.
///
/// ## Example
///
/// ```rust,ignore
/// let hasher = PasswordHasher::new();
///
/// let hash = hasher.hash("MySecureP@ssw0rd!")?;
/// let is_valid = hasher.verify("MySecureP@ssw0rd!", &hash)?;
/// if is_valid && hasher.needs_rehash(&hash) {
///     // Re-hash with current parameters and update storage
/// }
/// ```
#[derive(Clone)]
pub struct PasswordHasher {
    /// Pre-configured Argon2 instance
    argon2: Argon2<'static>,
    /// Current cost parameters, for rehash detection
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// Creates a new hasher with OWASP-recommended parameters.
    pub fn new() -> Self {
        // OWASP-recommended parameters for password hashing
        let params = Params::new(
            64 * 1024, // 64 MiB memory cost
            3,         // 3 iterations (time cost)
            4,         // 4 lanes (parallelism)
            None,      // Default output length (32 bytes)
        )
        .expect("Invalid Argon2 params"); // Safe: these params are always valid

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());

        Self { argon2, params }
    }

    /// Hashes a password for secure storage.
    ///
    /// ## Returns
    ///
    /// A PHC-formatted string containing the algorithm, version,
    /// parameters, salt, and hash.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::InternalError` if hashing fails (rare).
    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::InternalError {
                message: format!("Password hashing failed: {}", e),
            })
    }

    /// Verifies a password against a stored hash.
    ///
    /// The comparison is constant-time; an attacker cannot determine how
    /// "close" a guess was.
    ///
    /// ## Returns
    ///
    /// - `Ok(true)` - Password matches
    /// - `Ok(false)` - Password doesn't match
    /// - `Err(...)` - Invalid hash format or other error
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| ApiError::InternalError {
            message: format!("Invalid password hash format: {}", e),
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::InternalError {
                message: format!("Password verification failed: {}", e),
            }),
        }
    }

    /// Returns `true` if a stored hash was produced with parameters that
    /// differ from the current configuration.
    ///
    /// Callers should re-hash on the next successful verification so the
    /// whole corpus migrates to the new cost without a reset campaign.
    /// Unparseable hashes also report `true`.
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };

        if parsed.algorithm.as_str() != "argon2id" {
            return true;
        }

        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

// Implement Debug manually to avoid exposing internal state
impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Password Validator
// =============================================================================

/// Validates password strength before hashing.
///
/// ## Requirements
///
/// | Requirement | Reason |
/// |-------------|--------|
/// | 10+ characters | Increases search space |
/// | 1+ uppercase | Increases character set |
/// | 1+ lowercase | Increases character set |
/// | 1+ digit | Increases character set |
/// | 1+ symbol | Increases character set |
pub struct PasswordValidator;

impl PasswordValidator {
    /// Validates that a password meets minimum strength requirements.
    ///
    /// ## Returns
    ///
    /// - `Ok(())` - Password meets all requirements
    /// - `Err(Vec<&str>)` - List of failed requirements
    pub fn validate(password: &str) -> Result<(), Vec<&'static str>> {
        let mut errors = Vec::new();

        if password.len() < 10 {
            errors.push("Password must be at least 10 characters long");
        }

        if !password.chars().any(|c| c.is_uppercase()) {
            errors.push("Password must contain at least one uppercase letter");
        }

        if !password.chars().any(|c| c.is_lowercase()) {
            errors.push("Password must contain at least one lowercase letter");
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one digit");
        }

        if !password.chars().any(|c| "!@#$%^&*".contains(c)) {
            errors.push("Password must contain at least one special character (!@#$%^&*)");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_correct_password() {
        let hasher = PasswordHasher::new();
        let password = "MySecureP@ssw0rd!";

        let hash = hasher.hash(password).unwrap();

        assert_ne!(hash, password);
        assert!(hasher.verify(password, &hash).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("MySecureP@ssw0rd!").unwrap();

        assert!(!hasher.verify("WrongP@ssw0rd!", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = PasswordHasher::new();
        let password = "MySecureP@ssw0rd!";

        let hash1 = hasher.hash(password).unwrap();
        let hash2 = hasher.hash(password).unwrap();

        // Each hash is unique due to the random salt
        assert_ne!(hash1, hash2);
        assert!(hasher.verify(password, &hash1).unwrap());
        assert!(hasher.verify(password, &hash2).unwrap());
    }

    #[test]
    fn test_hash_is_phc_format() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("TestP@ssw0rd!").unwrap();

        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_current_hash_does_not_need_rehash() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("TestP@ssw0rd!").unwrap();

        assert!(!hasher.needs_rehash(&hash));
    }

    #[test]
    fn test_drifted_params_need_rehash() {
        // Hash produced with lower memory cost than the current config
        let weak_params = Params::new(32 * 1024, 2, 2, None).unwrap();
        let weak = Argon2::new(Algorithm::Argon2id, Version::V0x13, weak_params);
        let salt = SaltString::generate(&mut OsRng);
        let old_hash = weak
            .hash_password(b"TestP@ssw0rd!", &salt)
            .unwrap()
            .to_string();

        let hasher = PasswordHasher::new();
        assert!(hasher.needs_rehash(&old_hash));
        // But the old hash still verifies (parameters come from the PHC string)
        assert!(hasher.verify("TestP@ssw0rd!", &old_hash).unwrap());
    }

    #[test]
    fn test_garbage_hash_needs_rehash() {
        let hasher = PasswordHasher::new();
        assert!(hasher.needs_rehash("not-a-phc-string"));
    }

    #[test]
    fn test_password_validator_valid_password() {
        assert!(PasswordValidator::validate("MyP@ssw0rd!").is_ok());
        assert!(PasswordValidator::validate("Str0ng&Pass!").is_ok());
    }

    #[test]
    fn test_password_validator_too_short() {
        let result = PasswordValidator::validate("Short1!");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .contains(&"Password must be at least 10 characters long"));
    }

    #[test]
    fn test_password_validator_missing_classes() {
        assert!(PasswordValidator::validate("myp@ssw0rd!").is_err()); // no uppercase
        assert!(PasswordValidator::validate("MYP@SSW0RD!").is_err()); // no lowercase
        assert!(PasswordValidator::validate("MyP@ssword!").is_err()); // no digit
        assert!(PasswordValidator::validate("MyPassw0rd1").is_err()); // no symbol
    }

    #[test]
    fn test_password_validator_multiple_errors() {
        let errors = PasswordValidator::validate("short").unwrap_err();
        assert!(errors.len() > 1);
    }
}
