use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

/// Envelope format: `enc:v1:<nonce_b64>:<ciphertext_b64>` (URL-safe base64,
/// no padding). The version marker lets a future key rotation scheme detect
/// old envelopes.
const ENVELOPE_PREFIX: &str = "enc:v1:";

pub const KEY_ENV_VAR: &str = "ERPGATE_ENCRYPTION_KEY";

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("no encryption key configured; set {KEY_ENV_VAR} (generate one with --generate-key)")]
    KeyMissing,

    #[error("invalid encryption key: expected 32 bytes of base64")]
    InvalidKey,

    #[error("cannot encrypt or decrypt empty input")]
    EmptyInput,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: envelope is malformed, tampered, or encrypted with a different key")]
    Decrypt,
}

/// Process-wide symmetric cipher for stored instance credentials. The key is
/// environment-supplied and never persisted alongside the data it protects.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
}

impl CredentialVault {
    /// Load the key from the environment. A missing or malformed key is
    /// fatal at boot, not per-call.
    pub fn from_env() -> Result<Self, VaultError> {
        let encoded = std::env::var(KEY_ENV_VAR).map_err(|_| VaultError::KeyMissing)?;
        Self::from_encoded_key(encoded.trim())
    }

    pub fn from_encoded_key(encoded: &str) -> Result<Self, VaultError> {
        let key = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .or_else(|_| STANDARD.decode(encoded.as_bytes()))
            .map_err(|_| VaultError::InvalidKey)?;
        if key.len() != 32 {
            return Err(VaultError::InvalidKey);
        }
        let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| VaultError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Generate a fresh base64 key suitable for `ERPGATE_ENCRYPTION_KEY`.
    pub fn generate_key() -> String {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        URL_SAFE_NO_PAD.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        if plaintext.is_empty() {
            return Err(VaultError::EmptyInput);
        }
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;
        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, VaultError> {
        if envelope.is_empty() {
            return Err(VaultError::EmptyInput);
        }
        let rest = envelope.strip_prefix(ENVELOPE_PREFIX).ok_or(VaultError::Decrypt)?;
        let (nonce_b64, ciphertext_b64) = rest.split_once(':').ok_or(VaultError::Decrypt)?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|_| VaultError::Decrypt)?;
        if nonce_bytes.len() != 12 {
            return Err(VaultError::Decrypt);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|_| VaultError::Decrypt)?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| VaultError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::Decrypt)
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::from_encoded_key(&CredentialVault::generate_key()).unwrap()
    }

    #[test]
    fn round_trip() {
        let v = vault();
        let envelope = v.encrypt("s3cret-password").unwrap();
        assert!(envelope.starts_with("enc:v1:"));
        assert_eq!(v.decrypt(&envelope).unwrap(), "s3cret-password");
    }

    #[test]
    fn empty_input_rejected() {
        let v = vault();
        assert!(matches!(v.encrypt(""), Err(VaultError::EmptyInput)));
        assert!(matches!(v.decrypt(""), Err(VaultError::EmptyInput)));
    }

    #[test]
    fn tampered_envelope_rejected() {
        let v = vault();
        let envelope = v.encrypt("credentials").unwrap();
        let mut tampered = envelope.clone();
        // Flip the last ciphertext character.
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(matches!(v.decrypt(&tampered), Err(VaultError::Decrypt)));
    }

    #[test]
    fn wrong_key_rejected() {
        let envelope = vault().encrypt("credentials").unwrap();
        let other = vault();
        assert!(matches!(other.decrypt(&envelope), Err(VaultError::Decrypt)));
    }

    #[test]
    fn distinct_nonces_per_encryption() {
        let v = vault();
        assert_ne!(v.encrypt("same").unwrap(), v.encrypt("same").unwrap());
    }
}
