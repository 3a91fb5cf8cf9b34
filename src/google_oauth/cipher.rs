use crate::error::PulseError;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Separates nonce, payload and tag. Never produced by standard base64.
const DELIMITER: char = ':';
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// AES-256-GCM cipher for OAuth tokens at rest.
///
/// Ciphertext layout: `base64(nonce):base64(payload):base64(tag)`, with a
/// fresh random 96-bit nonce per encryption.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(..)")
    }
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, PulseError> {
        if key.len() != KEY_LEN {
            return Err(PulseError::Config(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Build from the base64 key material found in configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self, PulseError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PulseError::Config(format!("encryption key is not base64: {e}")))?;
        Self::new(&key)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, PulseError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|_| PulseError::Cipher("encryption failed".to_string()))?;

        Ok(format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            STANDARD.encode(nonce),
            STANDARD.encode(&buffer),
            STANDARD.encode(tag)
        ))
    }

    pub fn decrypt_bytes(&self, ciphertext: &str) -> Result<Vec<u8>, PulseError> {
        let mut parts = ciphertext.split(DELIMITER);
        let (Some(nonce_b64), Some(payload_b64), Some(tag_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PulseError::Cipher(
                "ciphertext must have nonce, payload and tag".to_string(),
            ));
        };

        let nonce = decode_part(nonce_b64, "nonce")?;
        let mut buffer = decode_part(payload_b64, "payload")?;
        let tag = decode_part(tag_b64, "tag")?;
        if nonce.len() != NONCE_LEN {
            return Err(PulseError::Cipher(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(PulseError::Cipher(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| PulseError::Cipher("authentication tag mismatch".to_string()))?;
        Ok(buffer)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, PulseError> {
        self.encrypt_bytes(plaintext.as_bytes())
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, PulseError> {
        let bytes = self.decrypt_bytes(ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|e| PulseError::Cipher(format!("plaintext is not UTF-8: {e}")))
    }
}

fn decode_part(part: &str, what: &str) -> Result<Vec<u8>, PulseError> {
    STANDARD
        .decode(part)
        .map_err(|e| PulseError::Cipher(format!("invalid base64 in {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn round_trips_text_and_bytes() {
        let c = cipher();
        for input in ["", "ya29.a0AfH6SM", "has:colons:inside", "ünïcødé"] {
            let sealed = c.encrypt(input).unwrap();
            assert_eq!(c.decrypt(&sealed).unwrap(), input);
        }
        let raw: Vec<u8> = (0u8..=255).collect();
        assert_eq!(c.decrypt_bytes(&c.encrypt_bytes(&raw).unwrap()).unwrap(), raw);
    }

    #[test]
    fn nonce_is_fresh_per_encryption() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn ciphertext_has_three_components() {
        let sealed = cipher().encrypt("token").unwrap();
        assert_eq!(sealed.split(DELIMITER).count(), 3);
    }

    #[test]
    fn tampered_payload_fails_authentication() {
        let c = cipher();
        let sealed = c.encrypt("refresh-token").unwrap();
        let parts: Vec<&str> = sealed.split(DELIMITER).collect();
        let forged_payload = STANDARD.encode(b"refresh-tokeX");
        let forged = format!("{}:{}:{}", parts[0], forged_payload, parts[2]);
        assert!(matches!(c.decrypt(&forged), Err(PulseError::Cipher(_))));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = cipher().encrypt("token").unwrap();
        let other = TokenCipher::new(&[9u8; KEY_LEN]).unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn malformed_ciphertext_is_rejected() {
        let c = cipher();
        assert!(c.decrypt("").is_err());
        assert!(c.decrypt("a:b").is_err());
        assert!(c.decrypt("a:b:c:d").is_err());
        assert!(c.decrypt("!!:??:**").is_err());
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(matches!(
            TokenCipher::new(&[1u8; 16]),
            Err(PulseError::Config(_))
        ));
        assert!(TokenCipher::from_base64_key("not base64!").is_err());
        let encoded = STANDARD.encode([3u8; KEY_LEN]);
        assert!(TokenCipher::from_base64_key(&encoded).is_ok());
    }
}
