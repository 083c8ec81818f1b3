//! # Credential Hashing and Generation
//!
//! The gateway's non-password crypto toolbox:
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`TokenHasher`] | HMAC-SHA256 hashing-at-rest for opaque credentials |
//! | [`generate_api_key`] / [`generate_app_secret`] | Prefixed random credentials |
//! | [`generate_otp_code`] | 6-digit one-time PIN codes |
//! | [`generate_user_code`] | Human-typable device grant codes |
//! | [`SecretBox`] | AES-256-GCM encryption of provider secrets at rest |
//!
//! ## Hashing at Rest
//!
//! Every non-JWT credential (API keys, refresh tokens, OAuth codes, OTP
//! codes, app secrets) is stored as `hex(HMAC-SHA256(pepper, plaintext))`.
//! The pepper is server-side configuration, so a database dump alone cannot
//! be used to forge or verify credentials.
//!
//! ```text
//! plaintext ──► HMAC-SHA256(pepper, ·) ──► hex digest ──► stored
//!     │
//!     └──► returned to the caller exactly once, never persisted
//! ```
//!
//! ## Credential Formats (wire-observable)
//!
//! | Credential | Format |
//! |-----------|--------|
//! | API key | `agw_` + 43 base64url chars (256-bit) |
//! | Application secret | `app_` + 43 base64url chars |
//! | OTP code | 6 decimal digits |
//! | Device user code | `XXXX-XXXX`, alphanumeric minus `0 O 1 I` |

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::Sha256;

use crate::errors::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Fixed prefix of user-bound API keys.
pub const API_KEY_PREFIX: &str = "agw_";

/// Fixed prefix of application secrets (machine credentials).
pub const APP_SECRET_PREFIX: &str = "app_";

/// How many leading characters of an API key are stored for operator UX.
pub const KEY_PREFIX_LEN: usize = 12;

/// Alphabet for device user codes: uppercase alphanumerics minus the
/// visually ambiguous glyphs `0`, `O`, `1`, `I`.
const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

// =============================================================================
// Token Hasher
// =============================================================================

/// Keyed hasher for opaque credentials.
///
/// ## Thread Safety
///
/// `Clone + Send + Sync`; the pepper is immutable after construction.
///
/// ## Example
///
/// ```rust,ignore
/// let hasher = TokenHasher::new(&config.security.token_pepper);
/// let digest = hasher.hash(&api_key_plaintext);
/// // store digest; look up rows by hashing the presented plaintext again
/// ```
#[derive(Clone)]
pub struct TokenHasher {
    pepper: Vec<u8>,
}

impl TokenHasher {
    /// Creates a hasher over the configured server pepper.
    pub fn new(pepper: &str) -> Self {
        Self {
            pepper: pepper.as_bytes().to_vec(),
        }
    }

    /// Computes `hex(HMAC-SHA256(pepper, plaintext))`.
    pub fn hash(&self, plaintext: &str) -> String {
        // HMAC accepts keys of any length
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.pepper).expect("HMAC key of any size");
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a plaintext against a stored digest.
    pub fn verify(&self, plaintext: &str, stored_digest: &str) -> bool {
        let computed = self.hash(plaintext);
        constant_time_eq::constant_time_eq(computed.as_bytes(), stored_digest.as_bytes())
    }
}

impl std::fmt::Debug for TokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Random Generation
// =============================================================================

/// Generates a 256-bit opaque token, base64url-encoded without padding
/// (43 characters).
///
/// Used for refresh-token envelopes, OAuth codes, and token-exchange codes.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates an API key: `agw_` + 43 base64url chars.
///
/// The plaintext is returned to the caller exactly once at issuance; only
/// its HMAC digest and its first [`KEY_PREFIX_LEN`] characters are stored.
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, generate_token())
}

/// Generates an application secret: `app_` + 43 base64url chars.
pub fn generate_app_secret() -> String {
    format!("{}{}", APP_SECRET_PREFIX, generate_token())
}

/// Returns the stored identification prefix of a credential (first
/// [`KEY_PREFIX_LEN`] characters).
pub fn key_prefix(plaintext: &str) -> String {
    plaintext.chars().take(KEY_PREFIX_LEN).collect()
}

/// Generates a 6-digit OTP code from a uniform distribution.
pub fn generate_otp_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Generates a device grant user code in `XXXX-XXXX` format.
///
/// Eight characters from a 32-glyph alphabet that excludes `0 O 1 I`, so
/// the code survives being read aloud or typed from a TV screen.
pub fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    let mut chars = Vec::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            chars.push(b'-');
        }
        let idx = rng.gen_range(0..USER_CODE_ALPHABET.len());
        chars.push(USER_CODE_ALPHABET[idx]);
    }
    String::from_utf8(chars).expect("alphabet is ASCII")
}

/// Constant-time string equality.
///
/// Use for any comparison involving a secret that did not go through
/// [`TokenHasher::verify`].
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    constant_time_eq::constant_time_eq(a.as_bytes(), b.as_bytes())
}

// =============================================================================
// Secret Box (AES-256-GCM)
// =============================================================================

/// Symmetric encryption for third-party provider secrets at rest.
///
/// Output format: `base64(nonce || ciphertext)` with a random 96-bit nonce
/// per encryption, so encrypting the same secret twice yields different
/// blobs.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl SecretBox {
    /// Creates a secret box from a hex-encoded 32-byte key.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::InternalError` if the key is not exactly 32 bytes
    /// of valid hex. Misconfiguration here must fail startup, not requests.
    pub fn new(hex_key: &str) -> Result<Self, ApiError> {
        let key_bytes = hex::decode(hex_key).map_err(|_| ApiError::InternalError {
            message: "secret_encryption_key is not valid hex".to_string(),
        })?;

        if key_bytes.len() != 32 {
            return Err(ApiError::InternalError {
                message: "secret_encryption_key must be 32 bytes".to_string(),
            });
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypts a plaintext secret.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ApiError> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| ApiError::InternalError {
                message: "secret encryption failed".to_string(),
            })?;

        let mut blob = Vec::with_capacity(12 + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypts a blob produced by [`SecretBox::encrypt`].
    pub fn decrypt(&self, blob: &str) -> Result<String, ApiError> {
        let bytes = STANDARD.decode(blob).map_err(|_| ApiError::InternalError {
            message: "encrypted secret is not valid base64".to_string(),
        })?;

        if bytes.len() < 12 {
            return Err(ApiError::InternalError {
                message: "encrypted secret is truncated".to_string(),
            });
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext =
            self.cipher
                .decrypt(nonce, ciphertext)
                .map_err(|_| ApiError::InternalError {
                    message: "secret decryption failed".to_string(),
                })?;

        String::from_utf8(plaintext).map_err(|_| ApiError::InternalError {
            message: "decrypted secret is not UTF-8".to_string(),
        })
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hasher() -> TokenHasher {
        TokenHasher::new("test_pepper_at_least_32_characters_long")
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = test_hasher();
        assert_eq!(hasher.hash("agw_abc"), hasher.hash("agw_abc"));
        assert_ne!(hasher.hash("agw_abc"), hasher.hash("agw_abd"));
    }

    #[test]
    fn test_hash_depends_on_pepper() {
        let a = TokenHasher::new("pepper_one_aaaaaaaaaaaaaaaaaaaaaaaaa");
        let b = TokenHasher::new("pepper_two_bbbbbbbbbbbbbbbbbbbbbbbbb");
        assert_ne!(a.hash("same_token"), b.hash("same_token"));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let digest = test_hasher().hash("anything");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_round_trip() {
        let hasher = test_hasher();
        let digest = hasher.hash("refresh-token-plaintext");
        assert!(hasher.verify("refresh-token-plaintext", &digest));
        assert!(!hasher.verify("different-plaintext", &digest));
    }

    #[test]
    fn test_api_key_format() {
        let key = generate_api_key();
        assert!(key.starts_with("agw_"));
        // 4-char prefix + 43 base64url chars for 32 bytes
        assert_eq!(key.len(), 4 + 43);
        assert_ne!(generate_api_key(), generate_api_key());
    }

    #[test]
    fn test_app_secret_format() {
        let secret = generate_app_secret();
        assert!(secret.starts_with("app_"));
        assert_eq!(secret.len(), 4 + 43);
    }

    #[test]
    fn test_key_prefix_is_twelve_chars() {
        let key = generate_api_key();
        let prefix = key_prefix(&key);
        assert_eq!(prefix.len(), 12);
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn test_otp_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_user_code_format_excludes_ambiguous_glyphs() {
        for _ in 0..100 {
            let code = generate_user_code();
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            for c in code.chars().filter(|c| *c != '-') {
                assert!(!"0O1I".contains(c), "ambiguous glyph in {}", code);
                assert!(c.is_ascii_uppercase() || c.is_ascii_digit());
            }
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_secret_box_round_trip() {
        let key_hex = hex::encode([7u8; 32]);
        let boxed = SecretBox::new(&key_hex).unwrap();

        let blob = boxed.encrypt("oauth-provider-client-secret").unwrap();
        assert_ne!(blob, "oauth-provider-client-secret");
        assert_eq!(boxed.decrypt(&blob).unwrap(), "oauth-provider-client-secret");
    }

    #[test]
    fn test_secret_box_nonce_uniqueness() {
        let key_hex = hex::encode([7u8; 32]);
        let boxed = SecretBox::new(&key_hex).unwrap();

        // Same plaintext, different blobs (random nonce)
        assert_ne!(boxed.encrypt("s").unwrap(), boxed.encrypt("s").unwrap());
    }

    #[test]
    fn test_secret_box_rejects_bad_keys() {
        assert!(SecretBox::new("not-hex").is_err());
        assert!(SecretBox::new(&hex::encode([1u8; 16])).is_err());
    }

    #[test]
    fn test_secret_box_rejects_tampered_blob() {
        let key_hex = hex::encode([7u8; 32]);
        let boxed = SecretBox::new(&key_hex).unwrap();

        let blob = boxed.encrypt("secret").unwrap();
        let mut bytes = STANDARD.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(bytes);

        assert!(boxed.decrypt(&tampered).is_err());
    }
}
