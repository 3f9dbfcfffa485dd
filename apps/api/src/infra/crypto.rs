use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use super::InfraError;
use crate::app_error::{AppError, AppResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_ID_LEN: usize = 8;

/// Versioned ciphertext marker: `enc:v1:<key_id>:<base64(nonce || ciphertext)>`.
pub const CIPHERTEXT_PREFIX: &str = "enc:v1:";

/// Which key generation (if any) a stored value is under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    Current,
    Previous,
    /// Versioned, but for a key this process does not hold.
    Unknown,
    /// Unversioned nonce || ciphertext written before key ids existed.
    Legacy,
    Plaintext,
}

#[derive(Clone)]
struct KeySlot {
    id: String,
    key: aes_gcm::Key<Aes256Gcm>,
}

impl KeySlot {
    fn from_base64(key_b64: &str, var: &str) -> AppResult<Self> {
        let raw = general_purpose::STANDARD
            .decode(key_b64.trim().as_bytes())
            .map_err(|e| AppError::Crypto(format!("Invalid {var}: {e}")))?;
        if raw.len() != 32 {
            return Err(AppError::Crypto(format!("{var} must decode to 32 bytes")));
        }
        let id = hex::encode(Sha256::digest(&raw))[..KEY_ID_LEN].to_string();
        let key = *aes_gcm::Key::<Aes256Gcm>::from_slice(&raw);
        Ok(Self { id, key })
    }

    fn seal(&self, plaintext: &str) -> AppResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce_bytes = rand::random::<[u8; NONCE_LEN]>();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut buffer = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
        buffer.extend_from_slice(nonce);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Crypto(format!("encrypt failed: {e}")))?;
        buffer.extend_from_slice(&ciphertext);
        Ok(buffer)
    }

    fn open(&self, data: &[u8]) -> AppResult<String> {
        if data.len() <= NONCE_LEN {
            return Err(AppError::Crypto("ciphertext too short".into()));
        }
        let (nonce_bytes, cipher_bytes) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(nonce, cipher_bytes)
            .map_err(|_| AppError::Crypto(format!("decrypt failed under key {}", self.id)))?;
        String::from_utf8(plaintext).map_err(|e| AppError::Crypto(e.to_string()))
    }
}

/// AES-256-GCM cipher for provider credentials, aware of one previous key
/// generation so stored values can be rotated.
#[derive(Clone)]
pub struct CredentialCipher {
    current: KeySlot,
    previous: Option<KeySlot>,
}

impl CredentialCipher {
    pub fn from_config(
        current: &SecretString,
        previous: Option<&SecretString>,
    ) -> Result<Self, InfraError> {
        Self::new_from_base64(
            current.expose_secret(),
            previous.map(|p| p.expose_secret()),
        )
        .map_err(InfraError::CipherInit)
    }

    pub fn new_from_base64(current_b64: &str, previous_b64: Option<&str>) -> AppResult<Self> {
        let current = KeySlot::from_base64(current_b64, "CREDENTIAL_ENCRYPTION_KEY")?;
        let previous = previous_b64
            .filter(|p| !p.trim().is_empty())
            .map(|p| KeySlot::from_base64(p, "CREDENTIAL_ENCRYPTION_KEY_PREVIOUS"))
            .transpose()?
            .filter(|p| p.id != current.id);
        Ok(Self { current, previous })
    }

    /// Short fingerprint of the current key, embedded in every ciphertext.
    pub fn key_id(&self) -> &str {
        &self.current.id
    }

    pub fn has_previous_key(&self) -> bool {
        self.previous.is_some()
    }

    /// Encrypts under the current key with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let sealed = self.current.seal(plaintext)?;
        Ok(format!(
            "{CIPHERTEXT_PREFIX}{}:{}",
            self.current.id,
            general_purpose::STANDARD.encode(sealed)
        ))
    }

    /// Returns the plaintext of `value`, whatever generation it was written in.
    ///
    /// Values that are not ciphertext at all (credentials saved before
    /// encryption existed) come back unchanged.
    pub fn decrypt_if_needed(&self, value: &str) -> AppResult<String> {
        if let Some(rest) = value.strip_prefix(CIPHERTEXT_PREFIX) {
            let (key_id, body) = rest
                .split_once(':')
                .ok_or_else(|| AppError::Crypto("malformed ciphertext".into()))?;
            let slot = self
                .slot(key_id)
                .ok_or_else(|| AppError::Crypto(format!("unknown key id {key_id}")))?;
            let data = general_purpose::STANDARD
                .decode(body.as_bytes())
                .map_err(|e| AppError::Crypto(format!("decrypt decode failed: {e}")))?;
            return slot.open(&data);
        }

        match self.open_legacy(value) {
            Some((plaintext, _)) => Ok(plaintext),
            None => Ok(value.to_string()),
        }
    }

    pub fn generation(&self, value: &str) -> KeyGeneration {
        if let Some(rest) = value.strip_prefix(CIPHERTEXT_PREFIX) {
            let key_id = rest.split(':').next().unwrap_or_default();
            if key_id == self.current.id {
                return KeyGeneration::Current;
            }
            return match &self.previous {
                Some(prev) if prev.id == key_id => KeyGeneration::Previous,
                _ => KeyGeneration::Unknown,
            };
        }
        if self.open_legacy(value).is_some() {
            KeyGeneration::Legacy
        } else {
            KeyGeneration::Plaintext
        }
    }

    /// True when `value` is already ciphertext under the current key.
    pub fn is_current(&self, value: &str) -> bool {
        self.generation(value) == KeyGeneration::Current
    }

    fn slot(&self, key_id: &str) -> Option<&KeySlot> {
        if key_id == self.current.id {
            return Some(&self.current);
        }
        self.previous.as_ref().filter(|p| p.id == key_id)
    }

    fn open_legacy(&self, value: &str) -> Option<(String, &KeySlot)> {
        let data = general_purpose::STANDARD.decode(value.as_bytes()).ok()?;
        if data.len() <= NONCE_LEN + TAG_LEN {
            return None;
        }
        std::iter::once(&self.current)
            .chain(self.previous.as_ref())
            .find_map(|slot| slot.open(&data).ok().map(|p| (p, slot)))
    }

    #[cfg(test)]
    pub(crate) fn encrypt_legacy(&self, plaintext: &str) -> AppResult<String> {
        Ok(general_purpose::STANDARD.encode(self.current.seal(plaintext)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    const KEY_B: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";

    fn cipher_a() -> CredentialCipher {
        CredentialCipher::new_from_base64(KEY_A, None).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = cipher_a();
        for secret in ["sk_live_123", "x", "ringgit ✓ 50.00"] {
            let ct = cipher.encrypt(secret).unwrap();
            assert!(ct.starts_with(CIPHERTEXT_PREFIX));
            assert_ne!(ct, secret);
            assert_eq!(cipher.decrypt_if_needed(&ct).unwrap(), secret);
        }
    }

    #[test]
    fn nonce_is_random() {
        let cipher = cipher_a();
        assert_ne!(
            cipher.encrypt("same").unwrap(),
            cipher.encrypt("same").unwrap()
        );
    }

    #[test]
    fn plaintext_passes_through() {
        let cipher = cipher_a();
        assert_eq!(cipher.decrypt_if_needed("sk_test_legacy").unwrap(), "sk_test_legacy");
        assert_eq!(cipher.generation("sk_test_legacy"), KeyGeneration::Plaintext);
    }

    #[test]
    fn previous_key_still_decrypts() {
        let old = CredentialCipher::new_from_base64(KEY_A, None).unwrap();
        let ct = old.encrypt("whsec_old").unwrap();

        let rotated = CredentialCipher::new_from_base64(KEY_B, Some(KEY_A)).unwrap();
        assert_eq!(rotated.generation(&ct), KeyGeneration::Previous);
        assert!(!rotated.is_current(&ct));
        assert_eq!(rotated.decrypt_if_needed(&ct).unwrap(), "whsec_old");
    }

    #[test]
    fn unknown_key_is_crypto_error() {
        let other = CredentialCipher::new_from_base64(KEY_B, None).unwrap();
        let ct = other.encrypt("secret").unwrap();
        let cipher = cipher_a();
        assert_eq!(cipher.generation(&ct), KeyGeneration::Unknown);
        assert!(matches!(
            cipher.decrypt_if_needed(&ct),
            Err(AppError::Crypto(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = cipher_a();
        let ct = cipher.encrypt("secret").unwrap();
        let mut tampered = ct.clone();
        tampered.pop();
        tampered.push(if ct.ends_with('A') { 'B' } else { 'A' });
        assert!(cipher.decrypt_if_needed(&tampered).is_err());
    }

    #[test]
    fn legacy_unversioned_values_decrypt() {
        let cipher = cipher_a();
        let legacy = cipher.encrypt_legacy("api_key_legacy").unwrap();
        assert_eq!(cipher.generation(&legacy), KeyGeneration::Legacy);
        assert_eq!(cipher.decrypt_if_needed(&legacy).unwrap(), "api_key_legacy");
    }

    #[test]
    fn rejects_short_key() {
        assert!(CredentialCipher::new_from_base64("c2hvcnQ=", None).is_err());
        assert!(CredentialCipher::new_from_base64("not base64!", None).is_err());
    }

    #[test]
    fn same_previous_key_is_ignored() {
        let cipher = CredentialCipher::new_from_base64(KEY_A, Some(KEY_A)).unwrap();
        assert!(!cipher.has_previous_key());
    }

    #[test]
    fn key_id_is_stable() {
        assert_eq!(cipher_a().key_id(), cipher_a().key_id());
        assert_eq!(cipher_a().key_id().len(), KEY_ID_LEN);
    }
}
