use crate::core::errors::ExchangeError;
use std::time::{SystemTime, UNIX_EPOCH};

/// Authentication headers to attach to a request, in attach order
pub type SignatureResult = Result<Vec<(String, String)>, ExchangeError>;

/// Signer trait for request authentication
///
/// The REST pipeline hands the signer the exact path-and-query it will
/// transmit, so implementations never see the absolute URL.
pub trait Signer: Send + Sync {
    /// Sign a request and return the headers carrying the credentials
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST)
    /// * `request_path` - Path relative to the base endpoint, including the query
    /// * `body` - Request body text, empty for GET
    fn sign_request(&self, method: &str, request_path: &str, body: &str) -> SignatureResult;
}

/// Current Unix time in whole seconds
pub fn unix_timestamp() -> Result<u64, ExchangeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ExchangeError::Other(format!("Failed to get timestamp: {}", e)))
}
