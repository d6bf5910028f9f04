//! Credential resolution: either decrypt a per-user encrypted key
//! through the remote key-encryption service, or draw from the
//! rotating pool of environment-provisioned free-tier keys. The
//! plaintext key exists only for the duration of one outbound call
//! and is never logged or cached.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::OracleError;

/// Opaque ciphertext plus nonce. The symmetric secret lives in the
/// remote service; this client never sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyPayload {
    pub iv: String,
    pub data: String,
}

impl EncryptedKeyPayload {
    /// Shape check: both fields present, non-empty, base64-decodable.
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.iv.is_empty() || self.data.is_empty() {
            return Err(OracleError::InvalidCredential);
        }
        BASE64
            .decode(&self.iv)
            .and_then(|_| BASE64.decode(&self.data))
            .map_err(|_| OracleError::InvalidCredential)?;
        Ok(())
    }
}

/// Rotating pool of shared free-tier keys, round-robin with wrap.
#[derive(Debug, Default)]
pub struct KeyPool {
    keys: Vec<String>,
    index: usize,
}

impl KeyPool {
    /// Build from a comma-separated env value, dropping empty slots.
    pub fn from_env_value(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
        Self { keys, index: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next key in rotation, or `None` when the pool is empty. An
    /// empty pool in free mode is a fatal configuration error
    /// upstream.
    pub fn next_key(&mut self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys[self.index].clone();
        self.index = (self.index + 1) % self.keys.len();
        Some(key)
    }
}

/// Client for the external key-encryption function. Both directions
/// require a bearer credential from the identity provider.
#[derive(Debug, Clone)]
pub struct CryptoClient {
    endpoint: String,
}

impl CryptoClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub async fn encrypt(
        &self,
        plaintext: &str,
        access_token: &str,
    ) -> Result<EncryptedKeyPayload, OracleError> {
        let resp = reqwest::Client::new()
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .header("Content-Type", "application/json")
            .json(&json!({ "action": "encrypt", "api_key": plaintext }))
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OracleError::InvalidCredential);
        }
        resp.json::<EncryptedKeyPayload>()
            .await
            .map_err(|_| OracleError::InvalidCredential)
    }

    pub async fn decrypt(
        &self,
        payload: &EncryptedKeyPayload,
        access_token: &str,
    ) -> Result<String, OracleError> {
        payload.validate()?;

        #[derive(Deserialize)]
        struct DecryptResponse {
            api_key: String,
        }

        let resp = reqwest::Client::new()
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .header("Content-Type", "application/json")
            .json(&json!({ "action": "decrypt", "api_key": payload }))
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OracleError::InvalidCredential);
        }
        let decrypted: DecryptResponse = resp
            .json()
            .await
            .map_err(|_| OracleError::InvalidCredential)?;
        Ok(decrypted.api_key)
    }
}

/// How the active session authenticates outbound calls.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Per-user key, held encrypted; decrypted per call.
    Encrypted {
        payload: EncryptedKeyPayload,
        access_token: String,
    },
    /// Unauthenticated free mode; draws from the shared pool.
    Free,
}

/// Resolve a plaintext API key for exactly one outbound call.
pub async fn resolve_key(
    credential: &Credential,
    crypto: &CryptoClient,
    pool: &mut KeyPool,
) -> Result<String, OracleError> {
    match credential {
        Credential::Encrypted {
            payload,
            access_token,
        } => crypto.decrypt(payload, access_token).await,
        Credential::Free => pool.next_key().ok_or(OracleError::InvalidCredential),
    }
}
