use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use crate::core::types::{RequestDescriptor, ResponseEnvelope};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, Request, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

const JSON_CONTENT_TYPE: &str = "application/json";

/// REST client trait: one request description in, one response envelope out
///
/// Implementations return the envelope for every HTTP status; only transport
/// failures and unsupported methods are errors.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Execute a request and return the raw response envelope
    async fn execute(&self, request: &RequestDescriptor) -> Result<ResponseEnvelope, ExchangeError>;

    /// Execute a request and decode a successful body into `T`
    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<T, ExchangeError> {
        self.execute(request).await?.decode()
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Client identifier sent with every request
    pub user_agent: String,
    /// Drop any explicit port from the resolved URL
    pub strip_port: bool,
}

impl RestClientConfig {
    /// Create a new configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the API
    /// * `exchange_name` - Name of the exchange
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            user_agent: concat!("cbfeed/", env!("CARGO_PKG_VERSION")).to_string(),
            strip_port: true,
        }
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Keep or strip an explicit port in the base URL
    pub fn with_strip_port(mut self, strip_port: bool) -> Self {
        self.strip_port = strip_port;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    quota: Option<Quota>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
            quota: None,
        }
    }

    /// Sign every request with the given signer
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Throttle outgoing requests to the given quota
    pub fn with_rate_limit(mut self, quota: Quota) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let base_url = Url::parse(&self.config.base_url).map_err(|e| {
            ExchangeError::InvalidParameters(format!(
                "Invalid base URL '{}': {}",
                self.config.base_url, e
            ))
        })?;

        let client = Client::builder()
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| ExchangeError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ReqwestRest {
            client,
            base_url,
            config: self.config,
            signer: self.signer,
            limiter: self.quota.map(|q| Arc::new(RateLimiter::direct(q))),
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    base_url: Url,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.signer.is_some()
    }

    /// Absolute URL for a request, with paging and status parameters applied
    pub fn resolve_url(&self, request: &RequestDescriptor) -> Result<Url, ExchangeError> {
        let mut url = self.base_url.join(&request.path).map_err(|e| {
            ExchangeError::InvalidParameters(format!("Invalid path '{}': {}", request.path, e))
        })?;

        if self.config.strip_port {
            // Only fails for URLs that cannot carry a port at all
            let _ = url.set_port(None);
        }

        let mut pairs: Vec<(&str, String)> = request
            .pagination
            .map(|p| p.query_pairs())
            .unwrap_or_default();
        pairs.extend(request.status.iter().map(|s| ("status", s.clone())));

        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url)
    }

    /// Path and query exactly as transmitted, which is what gets signed
    pub fn request_path(url: &Url) -> String {
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }
    }

    fn ensure_supported(method: &Method) -> Result<(), ExchangeError> {
        if *method == Method::GET || *method == Method::POST {
            Ok(())
        } else {
            Err(ExchangeError::UnsupportedMethod(method.to_string()))
        }
    }

    /// Build the outgoing request without sending it; signs at call time
    pub fn build_request(&self, request: &RequestDescriptor) -> Result<Request, ExchangeError> {
        let method = request.method.clone();
        Self::ensure_supported(&method)?;

        let url = self.resolve_url(request)?;
        let request_path = Self::request_path(&url);
        let body = if method == Method::POST {
            request.body.as_str()
        } else {
            ""
        };

        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .header(USER_AGENT, &self.config.user_agent);

        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign_request(method.as_str(), &request_path, body)? {
                builder = builder.header(name, value);
            }
        }

        if method == Method::POST {
            builder = builder
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(body.to_string());
        }

        trace!(path = %request_path, "Built request");
        Ok(builder.build()?)
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, request), fields(exchange = %self.config.exchange_name, method = %request.method, endpoint = %request.path))]
    async fn execute(&self, request: &RequestDescriptor) -> Result<ResponseEnvelope, ExchangeError> {
        Self::ensure_supported(&request.method)?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        // Signed after the throttle so the timestamp is current when sent
        let outgoing = self.build_request(request)?;

        let response = self
            .client
            .execute(outgoing)
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        debug!(status, bytes = body.len(), "Response received");
        Ok(ResponseEnvelope::new(status, headers, body))
    }
}
