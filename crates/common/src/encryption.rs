//! At-rest encryption for queued callback payloads.
//!
//! Outbound callback payloads carry recipient addresses and bearer tokens,
//! so they are sealed with AES-256-GCM before they touch the queue. The wire
//! form is `base64(nonce || ciphertext || tag)`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("failed to derive encryption key")]
    KeyDerivation,

    #[error("failed to seal payload")]
    Seal,

    #[error("payload is malformed or was tampered with")]
    Open,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Seals and opens queued callback payloads with a key derived from the
/// configured secret.
pub struct PayloadCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl PayloadCipher {
    /// Build a cipher from the configured secret. The secret is run through
    /// SHA-256 to produce the AES-256 key, so any non-empty string works.
    pub fn new(secret: &str) -> Result<Self, EncryptionError> {
        if secret.is_empty() {
            return Err(EncryptionError::KeyDerivation);
        }
        let digest = ring::digest::digest(&ring::digest::SHA256, secret.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, digest.as_ref())
            .map_err(|_| EncryptionError::KeyDerivation)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Serialize `payload` to JSON and seal it.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<String, EncryptionError> {
        let plaintext = serde_json::to_vec(payload)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::Seal)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext;
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Seal)?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&in_out);
        Ok(BASE64.encode(sealed))
    }

    /// Open a sealed payload and deserialize it from JSON.
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> Result<T, EncryptionError> {
        let sealed = BASE64.decode(token).map_err(|_| EncryptionError::Open)?;
        if sealed.len() <= NONCE_LEN {
            return Err(EncryptionError::Open);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| EncryptionError::Open)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Open)?;

        Ok(serde_json::from_slice(plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        url: String,
        token: String,
    }

    fn make_payload() -> Payload {
        Payload {
            url: "https://client.example/callback".to_string(),
            token: "secret-bearer".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let cipher = PayloadCipher::new("test-secret").unwrap();
        let sealed = cipher.encrypt(&make_payload()).unwrap();
        let opened: Payload = cipher.decrypt(&sealed).unwrap();
        assert_eq!(opened, make_payload());
    }

    #[test]
    fn test_ciphertext_hides_plaintext() {
        let cipher = PayloadCipher::new("test-secret").unwrap();
        let sealed = cipher.encrypt(&make_payload()).unwrap();
        assert!(!sealed.contains("secret-bearer"));
        assert!(!sealed.contains("client.example"));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let cipher = PayloadCipher::new("test-secret").unwrap();
        let sealed = cipher.encrypt(&make_payload()).unwrap();
        let mut bytes = BASE64.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = BASE64.encode(bytes);

        let result: Result<Payload, _> = cipher.decrypt(&tampered);
        assert!(matches!(result, Err(EncryptionError::Open)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let cipher = PayloadCipher::new("test-secret").unwrap();
        let other = PayloadCipher::new("other-secret").unwrap();
        let sealed = cipher.encrypt(&make_payload()).unwrap();

        let result: Result<Payload, _> = other.decrypt(&sealed);
        assert!(matches!(result, Err(EncryptionError::Open)));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(PayloadCipher::new("").is_err());
    }
}
