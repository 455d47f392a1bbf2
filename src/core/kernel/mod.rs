/// Transport kernel shared by the REST pipeline and the realtime feed
///
/// The kernel holds the exchange-agnostic pieces: request signing interface,
/// the REST request/response pipeline, the WebSocket transport, the codec
/// seam between raw frames and typed messages, and the rate gate that bounds
/// connection attempts.
///
/// ## Signed REST call
/// ```rust,no_run
/// use cbfeed::core::kernel::*;
/// use cbfeed::core::types::RequestDescriptor;
/// use cbfeed::exchanges::coinbase::{CoinbaseSigner, Credentials};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), cbfeed::ExchangeError> {
/// let credentials = Credentials::new("key", "passphrase", "c2VjcmV0")?;
/// let rest = RestClientBuilder::new(RestClientConfig::new(
///     "https://api.exchange.coinbase.com".to_string(),
///     "coinbase".to_string(),
/// ))
/// .with_signer(Arc::new(CoinbaseSigner::new(credentials)))
/// .build()?;
///
/// let response = rest
///     .execute(&RequestDescriptor::get("/orders").paged(-5, Some(10)))
///     .await?;
/// println!("{} {}", response.status, response.body);
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod rate_gate;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::WsCodec;
pub use rate_gate::RateGate;
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{unix_timestamp, SignatureResult, Signer};
pub use ws::{TungsteniteWs, WsConfig, WsSession};
