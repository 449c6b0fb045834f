use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

use super::nonce::{Nonce, NonceGenerator};
use crate::error::ConfigError;

type HmacSha512 = Hmac<Sha512>;

/// The exchange signs the endpoint path with this prefix removed.
pub const PRIVATE_API_PREFIX: &str = "/derivatives";

/// API key pair. The secret is kept base64-encoded, as issued by the exchange.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// A private request ready to send: the body must go out byte-for-byte as signed.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub endpoint_path: String,
    pub nonce: Nonce,
    pub body: String,
    pub signature: String,
}

/// Signs private requests and owns the nonce sequence for its API key.
pub struct RequestSigner {
    api_key: String,
    mac: HmacSha512,
    nonces: NonceGenerator,
}

impl RequestSigner {
    /// Decode the secret once. A malformed secret is a startup fault.
    pub fn new(credentials: &Credentials) -> Result<Self, ConfigError> {
        if credentials.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("api key"));
        }
        if credentials.api_secret.trim().is_empty() {
            return Err(ConfigError::Missing("api secret"));
        }

        let key = BASE64_STANDARD.decode(credentials.api_secret.trim())?;
        let mac = HmacSha512::new_from_slice(&key).map_err(|e| ConfigError::Invalid {
            key: "api secret",
            reason: e.to_string(),
        })?;

        Ok(Self {
            api_key: credentials.api_key.clone(),
            mac,
            nonces: NonceGenerator::new(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `base64(HMAC-SHA512(secret, SHA256(body + nonce + path)))`
    pub fn sign(&self, endpoint_path: &str, nonce: &Nonce, body: &str) -> String {
        let path = endpoint_path
            .strip_prefix(PRIVATE_API_PREFIX)
            .unwrap_or(endpoint_path);

        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hasher.update(nonce.as_str().as_bytes());
        hasher.update(path.as_bytes());
        let digest = hasher.finalize();

        let mut mac = self.mac.clone();
        mac.update(&digest);
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Draw a fresh nonce and sign `body` for `endpoint_path`.
    pub fn signed_request(&self, endpoint_path: &str, body: String) -> SignedRequest {
        let nonce = self.nonces.next();
        let signature = self.sign(endpoint_path, &nonce, &body);
        SignedRequest {
            endpoint_path: endpoint_path.to_string(),
            nonce,
            body,
            signature,
        }
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}
