//! Salted SHA-1 credential digests
//!
//! Produces `{SSHA}` values as understood by OpenLDAP's `userPassword`. SHA-1
//! is kept for directory compatibility, not for strength. Verification is the
//! directory's job.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use sha1::{Digest, Sha1};

pub const SSHA_PREFIX: &str = "{SSHA}";
pub const SALT_LEN: usize = 4;

/// Hash `secret` with a fresh random salt
pub fn hash_password(secret: &[u8]) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with_salt(secret, &salt)
}

fn hash_with_salt(secret: &[u8], salt: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(secret);
    hasher.update(salt);
    let digest = hasher.finalize();

    let mut payload = Vec::with_capacity(digest.len() + salt.len());
    payload.extend_from_slice(&digest);
    payload.extend_from_slice(salt);

    format!("{}{}", SSHA_PREFIX, STANDARD.encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_ssha(value: &str) -> bool {
        value.strip_prefix(SSHA_PREFIX).is_some_and(|b64| {
            !b64.is_empty()
                && b64
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
        })
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_password(b"secret");
        assert!(is_ssha(&hash), "unexpected digest format: {}", hash);
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hash_password(b"secret"), hash_password(b"secret"));
    }

    #[test]
    fn test_payload_is_digest_then_salt() {
        let hash = hash_password(b"secret");
        let payload = STANDARD.decode(hash.trim_start_matches(SSHA_PREFIX)).unwrap();
        assert_eq!(payload.len(), 20 + SALT_LEN);

        let salt = &payload[20..];
        assert_eq!(hash_with_salt(b"secret", salt), hash);
    }

    #[test]
    fn test_known_vector() {
        let hash = hash_with_salt(b"secret", b"salt");
        let payload = STANDARD.decode(hash.trim_start_matches(SSHA_PREFIX)).unwrap();
        assert_eq!(&payload[..20], Sha1::digest(b"secretsalt").as_slice());
        assert_eq!(&payload[20..], b"salt");
    }
}
