use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{unix_timestamp, SignatureResult, Signer};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret, SecretVec};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_KEY_HEADER: &str = "CB-ACCESS-KEY";
pub const ACCESS_SIGN_HEADER: &str = "CB-ACCESS-SIGN";
pub const ACCESS_TIMESTAMP_HEADER: &str = "CB-ACCESS-TIMESTAMP";
pub const ACCESS_PASSPHRASE_HEADER: &str = "CB-ACCESS-PASSPHRASE";

/// Source of Unix seconds for signature timestamps
pub type Clock = Arc<dyn Fn() -> Result<u64, ExchangeError> + Send + Sync>;

/// API key, passphrase and decoded secret; immutable once built
pub struct Credentials {
    api_key: String,
    passphrase: Secret<String>,
    secret: SecretVec<u8>,
}

impl Credentials {
    /// Validate and build credentials
    ///
    /// # Arguments
    /// * `api_key` - API key issued by the exchange
    /// * `passphrase` - Passphrase chosen when the key was created
    /// * `secret` - Base64 secret as issued; decoded here, once
    pub fn new(
        api_key: impl Into<String>,
        passphrase: impl Into<String>,
        secret: &str,
    ) -> Result<Self, ExchangeError> {
        let api_key = api_key.into();
        let passphrase = passphrase.into();

        if api_key.trim().is_empty() {
            return Err(ExchangeError::AuthError(
                "An API key is required".to_string(),
            ));
        }
        if passphrase.trim().is_empty() {
            return Err(ExchangeError::AuthError(
                "A passphrase is required".to_string(),
            ));
        }
        if secret.trim().is_empty() {
            return Err(ExchangeError::AuthError("A secret is required".to_string()));
        }

        let decoded = general_purpose::STANDARD
            .decode(secret.trim())
            .map_err(|e| ExchangeError::AuthError(format!("Secret is not valid base64: {}", e)))?;

        Ok(Self {
            api_key,
            passphrase: Secret::new(passphrase),
            secret: Secret::new(decoded),
        })
    }

    pub fn from_config(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        Self::new(config.api_key(), config.passphrase(), config.secret())
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("passphrase", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Credentials bound to one request; built fresh for every call
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignatureBlock {
    /// The four authentication headers in attach order
    pub fn into_headers(self) -> Vec<(String, String)> {
        vec![
            (ACCESS_KEY_HEADER.to_string(), self.api_key),
            (ACCESS_SIGN_HEADER.to_string(), self.signature),
            (ACCESS_TIMESTAMP_HEADER.to_string(), self.timestamp),
            (ACCESS_PASSPHRASE_HEADER.to_string(), self.passphrase),
        ]
    }
}

impl std::fmt::Debug for SignatureBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureBlock")
            .field("api_key", &self.api_key)
            .field("passphrase", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .field("signature", &self.signature)
            .finish()
    }
}

/// HMAC-SHA256 request signer shared by REST and the authenticated feed
pub struct CoinbaseSigner {
    credentials: Credentials,
    clock: Clock,
}

impl CoinbaseSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            clock: Arc::new(unix_timestamp),
        }
    }

    /// Replace the wall clock, e.g. to pin timestamps in tests
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.clock = Arc::new(move || Ok::<_, ExchangeError>(clock()));
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sign at the current clock time
    ///
    /// `request_path` is the path-and-query the exchange receives, never the
    /// absolute URL.
    pub fn compute_signature(
        &self,
        request_path: &str,
        method: &str,
        body: &str,
    ) -> Result<SignatureBlock, ExchangeError> {
        let timestamp = (self.clock)()?;
        self.sign_at(request_path, method, body, timestamp)
    }

    /// Sign with an explicit timestamp in Unix seconds
    pub fn sign_at(
        &self,
        request_path: &str,
        method: &str,
        body: &str,
        timestamp: u64,
    ) -> Result<SignatureBlock, ExchangeError> {
        let timestamp = timestamp.to_string();
        let prehash = format!("{}{}{}{}", timestamp, method, request_path, body);

        let mut mac = HmacSha256::new_from_slice(self.credentials.secret.expose_secret())
            .map_err(|e| ExchangeError::AuthError(format!("Failed to create HMAC: {}", e)))?;
        mac.update(prehash.as_bytes());

        Ok(SignatureBlock {
            api_key: self.credentials.api_key.clone(),
            passphrase: self.credentials.passphrase.expose_secret().clone(),
            timestamp,
            signature: general_purpose::STANDARD.encode(mac.finalize().into_bytes()),
        })
    }
}

impl std::fmt::Debug for CoinbaseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinbaseSigner")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl Signer for CoinbaseSigner {
    fn sign_request(&self, method: &str, request_path: &str, body: &str) -> SignatureResult {
        Ok(self.compute_signature(request_path, method, body)?.into_headers())
    }
}
