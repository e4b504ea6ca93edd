//! Session credentials for talking to the server outside a browser.
//!
//! Credentials live in the OS keyring when one is available and otherwise in a
//! ChaCha20-Poly1305 encrypted file under the app secrets directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_dirs;
use crate::csrf::CsrfTokenProvider;

const KEYRING_SERVICE: &str = "snapflow-notify";
const KEYRING_KEY: &str = "snapflow_session";
const DISABLE_KEYRING_ENV: &str = "SNAPFLOW_NOTIFY_DISABLE_KEYRING";
const SESSION_COOKIE: &str = "sessionid";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("App dir error: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
}

/// Session cookie and anti-forgery token copied from a logged-in browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub session_id: String,
    pub csrf_token: String,
}

impl SessionCredentials {
    /// Cookie header carrying both the session and the CSRF cookie.
    pub fn cookie_header(&self, csrf_cookie_name: &str) -> String {
        format!(
            "{SESSION_COOKIE}={}; {csrf_cookie_name}={}",
            self.session_id.trim(),
            self.csrf_token.trim()
        )
    }
}

impl CsrfTokenProvider for SessionCredentials {
    fn csrf_token(&self) -> Option<String> {
        let token = self.csrf_token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// Keyring-backed store with an encrypted-file fallback.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    fallback_dir: PathBuf,
}

impl CredentialStore {
    pub fn new() -> Result<Self, CredentialStoreError> {
        Ok(Self::with_fallback_dir(app_dirs::secrets_dir()?))
    }

    pub fn with_fallback_dir(fallback_dir: PathBuf) -> Self {
        Self { fallback_dir }
    }

    pub fn get(&self) -> Result<Option<SessionCredentials>, CredentialStoreError> {
        let raw = match self.try_keyring_get()? {
            Some(raw) => Some(raw),
            None => self.fallback_get()?,
        };
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|err| CredentialStoreError::Decode(err.to_string()))
        })
        .transpose()
    }

    pub fn set(&self, credentials: &SessionCredentials) -> Result<(), CredentialStoreError> {
        let raw = serde_json::to_string(credentials)
            .map_err(|err| CredentialStoreError::Decode(err.to_string()))?;
        if self.try_keyring_set(&raw).is_ok() {
            let _ = self.fallback_delete();
            return Ok(());
        }
        self.fallback_set(&raw)
    }

    pub fn delete(&self) -> Result<(), CredentialStoreError> {
        let _ = self.try_keyring_delete();
        self.fallback_delete()
    }

    fn keyring_entry(&self) -> Result<keyring::Entry, CredentialStoreError> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_KEY)
            .map_err(|err| CredentialStoreError::Unavailable(err.to_string()))
    }

    fn try_keyring_get(&self) -> Result<Option<String>, CredentialStoreError> {
        if keyring_disabled() {
            return Ok(None);
        }
        match self.keyring_entry()?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(_) => Ok(None),
        }
    }

    fn try_keyring_set(&self, raw: &str) -> Result<(), CredentialStoreError> {
        if keyring_disabled() {
            return Err(CredentialStoreError::Unavailable("keyring disabled".into()));
        }
        self.keyring_entry()?
            .set_password(raw)
            .map_err(|err| CredentialStoreError::Unavailable(err.to_string()))
    }

    fn try_keyring_delete(&self) -> Result<(), CredentialStoreError> {
        if keyring_disabled() {
            return Ok(());
        }
        let _ = self.keyring_entry()?.delete_credential();
        Ok(())
    }

    fn fallback_data_path(&self) -> PathBuf {
        self.fallback_dir.join("session.bin")
    }

    fn fallback_key_path(&self) -> PathBuf {
        self.fallback_dir.join("session.key")
    }

    fn fallback_get(&self) -> Result<Option<String>, CredentialStoreError> {
        let data_path = self.fallback_data_path();
        if !data_path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(data_path)?;
        if data.len() < NONCE_LEN {
            return Err(CredentialStoreError::Decode("session file too short".into()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let key = std::fs::read(self.fallback_key_path())?;
        if key.len() != KEY_LEN {
            return Err(CredentialStoreError::Decode("session key invalid".into()));
        }
        let plaintext = decrypt(&key, nonce, ciphertext)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|err| CredentialStoreError::Decode(err.to_string()))
    }

    fn fallback_set(&self, raw: &str) -> Result<(), CredentialStoreError> {
        std::fs::create_dir_all(&self.fallback_dir)?;
        let key_path = self.fallback_key_path();
        let key = if key_path.exists() {
            std::fs::read(&key_path)?
        } else {
            let key = random_bytes(KEY_LEN)?;
            write_private_file(&key_path, &key)?;
            key
        };
        if key.len() != KEY_LEN {
            return Err(CredentialStoreError::Decode("session key invalid".into()));
        }
        let nonce = random_bytes(NONCE_LEN)?;
        let mut payload = nonce.clone();
        payload.extend(encrypt(&key, &nonce, raw.as_bytes())?);
        write_private_file(&self.fallback_data_path(), &payload)
    }

    fn fallback_delete(&self) -> Result<(), CredentialStoreError> {
        let _ = std::fs::remove_file(self.fallback_data_path());
        let _ = std::fs::remove_file(self.fallback_key_path());
        Ok(())
    }
}

fn keyring_disabled() -> bool {
    std::env::var(DISABLE_KEYRING_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn random_bytes(len: usize) -> Result<Vec<u8>, CredentialStoreError> {
    use rand::TryRngCore;
    let mut out = vec![0u8; len];
    rand::rngs::OsRng
        .try_fill_bytes(&mut out)
        .map_err(|err| CredentialStoreError::Unavailable(err.to_string()))?;
    Ok(out)
}

fn write_private_file(path: &Path, bytes: &[u8]) -> Result<(), CredentialStoreError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    file.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

fn encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CredentialStoreError> {
    use chacha20poly1305::aead::{Aead, KeyInit};
    let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|err| CredentialStoreError::Crypto(err.to_string()))?;
    cipher
        .encrypt(chacha20poly1305::Nonce::from_slice(nonce), plaintext)
        .map_err(|err| CredentialStoreError::Crypto(err.to_string()))
}

fn decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CredentialStoreError> {
    use chacha20poly1305::aead::{Aead, KeyInit};
    let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|err| CredentialStoreError::Crypto(err.to_string()))?;
    cipher
        .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
        .map_err(|err| CredentialStoreError::Crypto(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            session_id: "s3ss10n".to_string(),
            csrf_token: " tok123 ".to_string(),
        }
    }

    #[test]
    fn encrypted_fallback_keeps_credentials_private() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::with_fallback_dir(dir.path().to_path_buf());
        assert_eq!(store.get().unwrap(), None);
        store.fallback_set(&serde_json::to_string(&credentials()).unwrap()).unwrap();
        let stored = std::fs::read(store.fallback_data_path()).unwrap();
        assert!(!String::from_utf8_lossy(&stored).contains("s3ss10n"));
        let raw = store.fallback_get().unwrap().unwrap();
        let parsed: SessionCredentials = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, credentials());
        store.fallback_delete().unwrap();
        assert_eq!(store.fallback_get().unwrap(), None);
    }

    #[test]
    fn truncated_fallback_file_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::with_fallback_dir(dir.path().to_path_buf());
        std::fs::write(store.fallback_data_path(), [1u8, 2, 3]).unwrap();
        assert!(matches!(
            store.fallback_get(),
            Err(CredentialStoreError::Decode(_))
        ));
    }

    #[test]
    fn credentials_build_cookie_header_and_token() {
        let creds = credentials();
        assert_eq!(
            creds.cookie_header("csrftoken"),
            "sessionid=s3ss10n; csrftoken=tok123"
        );
        assert_eq!(creds.csrf_token().as_deref(), Some("tok123"));
    }
}
