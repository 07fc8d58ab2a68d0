//! Password-based encryption of locked workspaces.
//!
//! A password is stretched into a 256-bit key with Argon2id over a fresh
//! random salt, and the plaintext is sealed with AES-256-GCM under a fresh
//! random nonce. Salt, nonce, Argon2 parameters and an optional hint travel
//! with the ciphertext in an [`EncryptedPayload`], which encodes to a single
//! JSON string.
//!
//! A wrong password and a tampered ciphertext both surface as
//! [`VaultError::AuthenticationFailed`]; callers cannot tell them apart.

#![forbid(unsafe_code)]

mod cache;

pub use cache::PasswordCache;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use settings::constants::vault::{KEY_LEN, NONCE_LEN, PAYLOAD_VERSION, SALT_LEN};
use zeroize::Zeroizing;

/// Largest Argon2 memory cost accepted from a payload, in KiB (1 GiB).
const MAX_M_COST: u32 = 1024 * 1024;
/// Largest Argon2 iteration count accepted from a payload.
const MAX_T_COST: u32 = 64;

const ALGORITHM_NAME: &str = "argon2id";

#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    /// Wrong password or corrupted data. Deliberately uninformative.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encryption,
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// Argon2id work factors stored alongside the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: String,
    /// Memory in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    /// The argon2 crate's current recommended parameters.
    fn default() -> Self {
        let params = Params::default();
        Self {
            algorithm: ALGORITHM_NAME.to_string(),
            m_cost: params.m_cost(),
            t_cost: params.t_cost(),
            p_cost: params.p_cost(),
        }
    }
}

impl KdfParams {
    fn to_argon2(&self) -> Result<Argon2<'static>> {
        if self.algorithm != ALGORITHM_NAME {
            return Err(VaultError::MalformedPayload(format!(
                "unsupported key derivation: {}",
                self.algorithm
            )));
        }
        if self.m_cost > MAX_M_COST || self.t_cost > MAX_T_COST {
            return Err(VaultError::MalformedPayload(
                "key derivation parameters out of range".to_string(),
            ));
        }
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| VaultError::MalformedPayload(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let argon2 = self.to_argon2()?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut key[..])
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

/// Everything needed to decrypt a locked workspace, except the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub version: u8,
    /// Base64 ciphertext with the GCM tag appended.
    pub ciphertext: String,
    /// Base64 12-byte nonce.
    pub nonce: String,
    /// Base64 16-byte salt.
    pub salt: String,
    pub params: KdfParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Binary fields of a payload after validation.
struct DecodedPayload {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    salt: [u8; SALT_LEN],
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| VaultError::MalformedPayload(format!("{}: {}", field, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        VaultError::MalformedPayload(format!("{} must be {} bytes, got {}", field, N, bytes.len()))
    })
}

impl EncryptedPayload {
    /// Serialize to the single string stored on a locked workspace.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VaultError::MalformedPayload(e.to_string()))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(encoded)
            .map_err(|e| VaultError::MalformedPayload(e.to_string()))?;
        if payload.version != PAYLOAD_VERSION {
            return Err(VaultError::MalformedPayload(format!(
                "unsupported payload version: {}",
                payload.version
            )));
        }
        Ok(payload)
    }

    /// Password hint, readable without the password.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    fn decoded(&self) -> Result<DecodedPayload> {
        if self.version != PAYLOAD_VERSION {
            return Err(VaultError::MalformedPayload(format!(
                "unsupported payload version: {}",
                self.version
            )));
        }
        Ok(DecodedPayload {
            ciphertext: BASE64
                .decode(&self.ciphertext)
                .map_err(|e| VaultError::MalformedPayload(format!("ciphertext: {}", e)))?,
            nonce: decode_fixed("nonce", &self.nonce)?,
            salt: decode_fixed("salt", &self.salt)?,
        })
    }
}

/// Encrypt `plaintext` under `password` with the default work factors.
pub fn lock(plaintext: &[u8], password: &str, hint: Option<&str>) -> Result<EncryptedPayload> {
    lock_with_params(plaintext, password, hint, KdfParams::default())
}

/// Encrypt with explicit Argon2id parameters.
///
/// A new salt and nonce are drawn from the OS RNG on every call.
pub fn lock_with_params(
    plaintext: &[u8],
    password: &str,
    hint: Option<&str>,
    params: KdfParams,
) -> Result<EncryptedPayload> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = params.derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| VaultError::Encryption)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::Encryption)?;

    tracing::debug!(bytes = plaintext.len(), "sealed payload");

    Ok(EncryptedPayload {
        version: PAYLOAD_VERSION,
        ciphertext: BASE64.encode(ciphertext),
        nonce: BASE64.encode(nonce),
        salt: BASE64.encode(salt),
        params,
        hint: hint.filter(|h| !h.is_empty()).map(str::to_string),
    })
}

/// Decrypt a payload. Any failure past decoding is `AuthenticationFailed`.
pub fn unlock(payload: &EncryptedPayload, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let decoded = payload.decoded()?;
    let key = payload
        .params
        .derive_key(password, &decoded.salt)
        .map_err(|e| match e {
            VaultError::MalformedPayload(_) => e,
            _ => VaultError::AuthenticationFailed,
        })?;
    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| VaultError::AuthenticationFailed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&decoded.nonce), decoded.ciphertext.as_ref())
        .map_err(|_| VaultError::AuthenticationFailed)?;
    Ok(Zeroizing::new(plaintext))
}

/// Hint stored in an encoded payload.
pub fn hint(encoded: &str) -> Result<Option<String>> {
    Ok(EncryptedPayload::decode(encoded)?.hint)
}

/// Serialize `document` as JSON and lock it.
pub fn lock_document<T: Serialize>(
    document: &T,
    password: &str,
    hint: Option<&str>,
) -> Result<EncryptedPayload> {
    lock_document_with_params(document, password, hint, KdfParams::default())
}

pub fn lock_document_with_params<T: Serialize>(
    document: &T,
    password: &str,
    hint: Option<&str>,
    params: KdfParams,
) -> Result<EncryptedPayload> {
    let json = Zeroizing::new(serde_json::to_vec(document).map_err(|_| VaultError::Encryption)?);
    lock_with_params(&json, password, hint, params)
}

/// Unlock and deserialize a JSON document.
pub fn unlock_document<T: DeserializeOwned>(payload: &EncryptedPayload, password: &str) -> Result<T> {
    let plaintext = unlock(payload, password)?;
    serde_json::from_slice(&plaintext).map_err(|_| VaultError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    /// Cheap parameters so tests do not spend seconds in Argon2.
    fn fast() -> KdfParams {
        KdfParams {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
            ..KdfParams::default()
        }
    }

    fn seal(plaintext: &[u8], password: &str, hint: Option<&str>) -> EncryptedPayload {
        lock_with_params(plaintext, password, hint, fast()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let payload = seal("Hello, World! 你好世界".as_bytes(), "pw", None);
        let plaintext = unlock(&payload, "pw").unwrap();
        assert_eq!(plaintext.as_slice(), "Hello, World! 你好世界".as_bytes());
    }

    #[test]
    fn test_default_params_round_trip() {
        let payload = lock(b"secret", "correct-horse", None).unwrap();
        assert_eq!(payload.params, KdfParams::default());
        assert_eq!(payload.params.algorithm, "argon2id");
        assert_eq!(unlock(&payload, "correct-horse").unwrap().as_slice(), b"secret");
    }

    #[test]
    fn test_scrollback_scenario() {
        let scrollback = "$ ls\na.txt\n";
        let encoded = seal(scrollback.as_bytes(), "correct-horse", Some("pets"))
            .encode()
            .unwrap();

        assert_eq!(hint(&encoded).unwrap().as_deref(), Some("pets"));

        let payload = EncryptedPayload::decode(&encoded).unwrap();
        assert!(matches!(
            unlock(&payload, "wrong"),
            Err(VaultError::AuthenticationFailed)
        ));
        let plaintext = unlock(&payload, "correct-horse").unwrap();
        assert_eq!(std::str::from_utf8(&plaintext).unwrap(), scrollback);
    }

    #[test]
    fn test_fresh_salt_and_nonce_every_call() {
        let a = seal(b"same", "pw", None);
        let b = seal(b"same", "pw", None);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_sizes() {
        let payload = seal(b"x", "pw", None);
        assert_eq!(BASE64.decode(&payload.salt).unwrap().len(), 16);
        assert_eq!(BASE64.decode(&payload.nonce).unwrap().len(), 12);
        // 1 byte plaintext + 16 byte tag
        assert_eq!(BASE64.decode(&payload.ciphertext).unwrap().len(), 17);
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let mut payload = seal(b"precious", "pw", None);
        let mut bytes = BASE64.decode(&payload.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        payload.ciphertext = BASE64.encode(bytes);
        assert!(matches!(
            unlock(&payload, "pw"),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_swapped_salt_fails_authentication() {
        let mut payload = seal(b"precious", "pw", None);
        payload.salt = seal(b"other", "pw", None).salt;
        assert!(matches!(
            unlock(&payload, "pw"),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_authentication_error_is_generic() {
        assert_eq!(VaultError::AuthenticationFailed.to_string(), "authentication failed");
    }

    #[test_case("not json" ; "garbage")]
    #[test_case(r#"{"version":1}"# ; "missing fields")]
    fn test_undecodable_payload_is_malformed(encoded: &str) {
        assert!(matches!(
            EncryptedPayload::decode(encoded),
            Err(VaultError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_unsupported_version_is_malformed() {
        let mut payload = seal(b"x", "pw", None);
        payload.version = 9;
        let encoded = serde_json::to_string(&payload).unwrap();
        assert!(matches!(
            EncryptedPayload::decode(&encoded),
            Err(VaultError::MalformedPayload(_))
        ));
        assert!(matches!(
            unlock(&payload, "pw"),
            Err(VaultError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_wrong_nonce_length_is_malformed() {
        let mut payload = seal(b"x", "pw", None);
        payload.nonce = BASE64.encode([0u8; 8]);
        assert!(matches!(
            unlock(&payload, "pw"),
            Err(VaultError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_absurd_params_are_rejected_before_derivation() {
        let mut payload = seal(b"x", "pw", None);
        payload.params.m_cost = u32::MAX;
        assert!(matches!(
            unlock(&payload, "pw"),
            Err(VaultError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_empty_hint_is_dropped() {
        let payload = seal(b"x", "pw", Some(""));
        assert_eq!(payload.hint(), None);
        assert!(!payload.encode().unwrap().contains("hint"));
    }

    #[test]
    fn test_document_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Doc {
            title: String,
            lines: Vec<String>,
        }
        let doc = Doc {
            title: "main".to_string(),
            lines: vec!["$ ls".to_string(), "a.txt".to_string()],
        };
        let payload = lock_document_with_params(&doc, "pw", None, fast()).unwrap();
        let back: Doc = unlock_document(&payload, "pw").unwrap();
        assert_eq!(back, doc);

        let wrong_shape: Result<Vec<u32>> = unlock_document(&payload, "pw");
        assert!(matches!(wrong_shape, Err(VaultError::AuthenticationFailed)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_round_trip_and_wrong_password(
            doc in proptest::collection::vec(any::<u8>(), 0..512),
            password in "[ -~]{1,24}",
            other in "[ -~]{1,24}",
        ) {
            let payload = seal(&doc, &password, None);
            let encoded = payload.encode().unwrap();
            let decoded = EncryptedPayload::decode(&encoded).unwrap();

            let unlocked = unlock(&decoded, &password).unwrap();
            prop_assert_eq!(unlocked.as_slice(), doc.as_slice());
            if other != password {
                prop_assert!(matches!(
                    unlock(&decoded, &other),
                    Err(VaultError::AuthenticationFailed)
                ));
            }
        }
    }
}
