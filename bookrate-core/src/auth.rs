//! Password digests and opaque tokens.
//!
//! Hashes are stored as `salt$digest` where digest = sha256(salt || password)
//! in hex and the salt is 16 random bytes. Session and verification tokens
//! are 32 random bytes in hex.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::common::error::{CoreError, Result};

fn digest_with_salt(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);
    let digest = digest_with_salt(&salt_hex, password);
    format!("{salt_hex}${digest}")
}

/// Verify a password against a stored `salt$digest` value.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt_hex, digest)) => digest_with_salt(salt_hex, password) == digest,
        None => false,
    }
}

/// Generate an opaque bearer token (session or verification).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Validate registration credentials.
pub fn validate_credentials(username: &str, email: &str, password: &str) -> Result<()> {
    if username.len() < 3
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(CoreError::Validation(
            "username must be at least 3 characters of letters, digits, '_' or '-'".to_string(),
        ));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(CoreError::Validation("invalid email address".to_string()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(CoreError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let stored = hash_password("hunter22");
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn credential_validation() {
        assert!(validate_credentials("reader", "r@example.com", "longenough").is_ok());
        assert!(validate_credentials("ab", "r@example.com", "longenough").is_err());
        assert!(validate_credentials("reader", "not-an-email", "longenough").is_err());
        assert!(validate_credentials("reader", "r@example.com", "short").is_err());
    }
}
