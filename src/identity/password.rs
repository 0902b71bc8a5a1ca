use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

use crate::error::{AppError, AppResult};

/// Argon2id PHC string for `password` with a fresh random salt.
pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// False for a wrong password and for a hash that does not parse.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let h = hash_password("s3cret").unwrap();
        assert!(h.starts_with("$argon2"));
        assert!(verify_password(&h, "s3cret"));
        assert!(!verify_password(&h, "S3cret"));
        assert_ne!(h, hash_password("s3cret").unwrap(), "salt must differ per hash");
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("plaintext", "plaintext"));
        assert!(!verify_password("", ""));
    }
}
