use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::rate_gate::RateGate;
use crate::core::kernel::{ReqwestRest, RestClientBuilder, RestClientConfig, WsConfig};
use crate::core::traits::FeedHandler;
use crate::exchanges::coinbase::rest::CoinbaseRest;
use crate::exchanges::coinbase::signer::{CoinbaseSigner, Credentials};
use crate::exchanges::coinbase::subscription::FeedSubscription;
use governor::Quota;
use nonzero_ext::nonzero;
use std::sync::Arc;

const EXCHANGE_NAME: &str = "coinbase";

/// Public endpoint budget: three requests per second
pub fn default_rest_quota() -> Quota {
    Quota::per_second(nonzero!(3u32))
}

/// Builds REST clients and feed subscriptions from one `ExchangeConfig`.
///
/// Credentials are optional: without them the REST client is unsigned and
/// subscriptions use the public subscribe frame.
#[derive(Debug, Default)]
pub struct CoinbaseBuilder {
    config: ExchangeConfig,
    rest_quota: Option<Quota>,
    strip_port: Option<bool>,
    ws_config: WsConfig,
    gate: Option<Arc<RateGate>>,
}

impl CoinbaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Throttle REST calls to `quota`
    pub fn with_rest_rate_limit(mut self, quota: Quota) -> Self {
        self.rest_quota = Some(quota);
        self
    }

    /// Throttle REST calls to the public endpoint budget
    pub fn with_default_rest_rate_limit(self) -> Self {
        self.with_rest_rate_limit(default_rest_quota())
    }

    /// Keep an explicit port in the REST base URL (stripped by default)
    pub fn with_strip_port(mut self, strip_port: bool) -> Self {
        self.strip_port = Some(strip_port);
        self
    }

    pub fn with_ws_config(mut self, config: WsConfig) -> Self {
        self.ws_config = config;
        self
    }

    /// Gate feed connections through `gate` instead of the process-wide one
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Signer for the configured credentials, if any are set
    pub fn signer(&self) -> Result<Option<Arc<CoinbaseSigner>>, ExchangeError> {
        if !self.config.has_credentials() {
            return Ok(None);
        }
        let credentials = Credentials::from_config(&self.config)?;
        Ok(Some(Arc::new(CoinbaseSigner::new(credentials))))
    }

    pub fn build_rest_client(&self) -> Result<ReqwestRest, ExchangeError> {
        let mut rest_config =
            RestClientConfig::new(self.config.resolved_rest_url(), EXCHANGE_NAME.to_string());
        if let Some(strip_port) = self.strip_port {
            rest_config = rest_config.with_strip_port(strip_port);
        }

        let mut builder = RestClientBuilder::new(rest_config);
        if let Some(signer) = self.signer()? {
            builder = builder.with_signer(signer);
        }
        if let Some(quota) = self.rest_quota {
            builder = builder.with_rate_limit(quota);
        }
        builder.build()
    }

    pub fn build_rest(&self) -> Result<CoinbaseRest<ReqwestRest>, ExchangeError> {
        Ok(CoinbaseRest::new(self.build_rest_client()?))
    }

    /// Idle subscription for `product_id`; call `subscribe` or `spawn` to start it
    pub fn build_subscription(
        &self,
        product_id: &str,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<FeedSubscription, ExchangeError> {
        let mut subscription =
            FeedSubscription::new(product_id, self.config.resolved_ws_url(), handler)?
                .with_ws_config(self.ws_config.clone());
        if let Some(signer) = self.signer()? {
            subscription = subscription.with_signer(signer);
        }
        if let Some(gate) = &self.gate {
            subscription = subscription.with_rate_gate(gate.clone());
        }
        Ok(subscription)
    }
}

/// REST client for `config` with no throttling
pub fn build_rest(config: ExchangeConfig) -> Result<CoinbaseRest<ReqwestRest>, ExchangeError> {
    CoinbaseBuilder::new().with_config(config).build_rest()
}
