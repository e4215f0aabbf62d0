//! Signed-token codec backing the identity cookie.
//!
//! Tokens are `base64url(payload) "." base64url(hmac_sha256(payload, key))`.
//! Verification is constant-time on the MAC, and every failure mode
//! (wrong part count, bad base64, MAC mismatch) is indistinguishable to
//! callers: the token simply carries no identity.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Required key length in bytes.
pub const KEY_LEN: usize = 64;

/// Errors loading the signing key from an explicit keyfile path.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("cannot read key file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("key file {path} must contain exactly {KEY_LEN} bytes (got {actual})")]
    BadLength { path: PathBuf, actual: usize },
}

/// Server-wide HMAC-SHA256 signer. Immutable after startup.
pub struct TokenSigner {
    key: [u8; KEY_LEN],
}

impl TokenSigner {
    /// Signer over a fresh key of secure-random bytes.
    pub fn random() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Load the key from a keyfile. An unreadable or mis-sized file on an
    /// explicitly configured path is a startup failure, not a fallback.
    pub fn from_keyfile(path: &Path) -> Result<Self, KeyError> {
        let bytes = std::fs::read(path).map_err(|source| KeyError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| KeyError::BadLength {
            path: path.to_path_buf(),
            actual: bytes.len(),
        })?;
        Ok(Self { key })
    }

    /// Keyfile when configured, random otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, KeyError> {
        match path {
            Some(path) => Self::from_keyfile(path),
            None => Ok(Self::random()),
        }
    }

    /// Sign payload bytes into the opaque token form.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).unwrap();
        mac.update(payload);
        let tag = mac.finalize().into_bytes();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(tag)
        )
    }

    /// Verify a token and recover its payload. `None` for anything that was
    /// not produced by [`TokenSigner::sign`] under this key.
    pub fn verify(&self, token: &str) -> Option<Vec<u8>> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 2 {
            return None;
        }
        let payload = URL_SAFE_NO_PAD.decode(parts[0]).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).unwrap();
        mac.update(&payload);
        mac.verify_slice(&tag).ok()?;
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        // given:
        let signer = TokenSigner::random();

        // when:
        let token = signer.sign(b"hello world");

        // then:
        assert_eq!(signer.verify(&token), Some(b"hello world".to_vec()));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        // given:
        let signer = TokenSigner::random();
        let token = signer.sign(b"payload");
        let (_, mac) = token.split_once('.').unwrap();

        // when: the payload part is swapped out
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(b"other"), mac);

        // then:
        assert_eq!(signer.verify(&forged), None);
    }

    #[test]
    fn test_verify_rejects_tampered_mac() {
        // given:
        let signer = TokenSigner::random();
        let token = signer.sign(b"payload");
        let (payload, _) = token.split_once('.').unwrap();

        // when:
        let forged = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(b"bogus mac"));

        // then:
        assert_eq!(signer.verify(&forged), None);
    }

    #[test]
    fn test_verify_rejects_malformed_tokens() {
        // given:
        let signer = TokenSigner::random();

        // then: wrong part counts and bad base64 all look the same
        assert_eq!(signer.verify(""), None);
        assert_eq!(signer.verify("one-part"), None);
        assert_eq!(signer.verify("a.b.c"), None);
        assert_eq!(signer.verify("!!!.???"), None);
    }

    #[test]
    fn test_verify_rejects_other_key() {
        // given: two independent signers
        let signer = TokenSigner::random();
        let other = TokenSigner::random();

        // when:
        let token = signer.sign(b"payload");

        // then:
        assert_eq!(other.verify(&token), None);
    }

    #[test]
    fn test_keyfile_roundtrip() {
        // given: a keyfile with exactly KEY_LEN bytes
        let path = std::env::temp_dir().join(format!("instant-key-{}", std::process::id()));
        std::fs::write(&path, [7u8; KEY_LEN]).unwrap();

        // when:
        let signer = TokenSigner::from_keyfile(&path).unwrap();

        // then: the same key verifies its own tokens
        let token = signer.sign(b"x");
        assert!(signer.verify(&token).is_some());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_keyfile_rejects_wrong_length() {
        // given:
        let path = std::env::temp_dir().join(format!("instant-shortkey-{}", std::process::id()));
        std::fs::write(&path, [0u8; 16]).unwrap();

        // when:
        let result = TokenSigner::from_keyfile(&path);

        // then:
        assert!(matches!(result, Err(KeyError::BadLength { actual: 16, .. })));
        std::fs::remove_file(&path).ok();
    }
}
