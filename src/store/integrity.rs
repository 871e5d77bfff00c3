//! Session integrity signing
//!
//! Every stored session file gets a detached HMAC-SHA256 signature over its
//! exact bytes, keyed by a per-installation secret. Verification is
//! constant-time. A session whose signature does not verify is treated as
//! absent by the store, never surfaced to restoration.

use std::fs;
use std::path::Path;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;

/// Load the signing key, creating it on first use.
///
/// The key file holds the hex-encoded secret with owner-only permissions. An
/// unreadable or malformed key file is replaced with a fresh key, which
/// invalidates existing signatures; affected sessions will load as absent.
pub fn load_or_create_key(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        let raw = fs::read_to_string(path)?;
        match hex::decode(raw.trim()) {
            Ok(key) if key.len() == KEY_LEN => return Ok(key),
            _ => {
                warn!("signing key file is malformed, regenerating");
            }
        }
    }

    let mut key = vec![0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    write_key_file(path, &hex::encode(&key))?;
    Ok(key)
}

fn write_key_file(path: &Path, hex_key: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, hex_key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Hex-encoded HMAC-SHA256 over the payload bytes
pub fn sign(key: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| EngineError::Tampered(format!("signing key rejected: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time verification of a stored hex signature
pub fn verify(key: &[u8], payload: &[u8], stored_hex: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hex.trim()) else {
        return false;
    };
    let Ok(expected) = sign(key, payload) else {
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };
    stored.len() == expected.len() && bool::from(stored.ct_eq(&expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sign_and_verify_round_trip() {
        let key = vec![7u8; KEY_LEN];
        let sig = sign(&key, b"payload bytes").unwrap();
        assert!(verify(&key, b"payload bytes", &sig));
    }

    #[test]
    fn test_verify_rejects_modified_payload() {
        let key = vec![7u8; KEY_LEN];
        let sig = sign(&key, b"payload bytes").unwrap();
        assert!(!verify(&key, b"payload byteZ", &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key_and_garbage_sig() {
        let key = vec![7u8; KEY_LEN];
        let other = vec![8u8; KEY_LEN];
        let sig = sign(&key, b"payload").unwrap();
        assert!(!verify(&other, b"payload", &sig));
        assert!(!verify(&key, b"payload", "not hex at all"));
        assert!(!verify(&key, b"payload", ""));
    }

    #[test]
    fn test_key_created_once_and_reloaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signing.key");
        let first = load_or_create_key(&path).unwrap();
        let second = load_or_create_key(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), KEY_LEN);
    }

    #[test]
    fn test_malformed_key_file_is_regenerated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signing.key");
        fs::write(&path, "short").unwrap();
        let key = load_or_create_key(&path).unwrap();
        assert_eq!(key.len(), KEY_LEN);
        // The file now holds the regenerated key.
        let reloaded = load_or_create_key(&path).unwrap();
        assert_eq!(key, reloaded);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signing.key");
        load_or_create_key(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
