use crate::core::errors::ExchangeError;
use crate::core::traits::FeedHandler;
use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub const PRODUCTION_REST_URL: &str = "https://api.exchange.coinbase.com";
pub const SANDBOX_REST_URL: &str = "https://api-public.sandbox.exchange.coinbase.com";
pub const PRODUCTION_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";
pub const SANDBOX_WS_URL: &str = "wss://ws-feed-public.sandbox.exchange.coinbase.com";

/// Endpoint mode shared by the REST pipeline and the realtime feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl Environment {
    pub const fn rest_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_REST_URL,
            Self::Sandbox => SANDBOX_REST_URL,
        }
    }

    pub const fn ws_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_WS_URL,
            Self::Sandbox => SANDBOX_WS_URL,
        }
    }
}

/// Cursor-based paging bounds for a list request.
///
/// The cursor sign encodes direction: negative pages backward (`before`),
/// positive pages forward (`after`), zero adds no bound at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub cursor: i64,
    pub limit: Option<u32>,
}

impl Pagination {
    pub const fn new(cursor: i64, limit: Option<u32>) -> Self {
        Self { cursor, limit }
    }

    /// Query parameters in transmission order.
    ///
    /// Backward pages request one extra record so the caller can tell whether
    /// another page exists; forward pages do not.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        match self.cursor {
            c if c < 0 => {
                pairs.push(("before", c.unsigned_abs().to_string()));
                if let Some(limit) = self.limit {
                    pairs.push(("limit", (u64::from(limit) + 1).to_string()));
                }
            }
            c if c > 0 => {
                pairs.push(("after", c.to_string()));
                if let Some(limit) = self.limit {
                    pairs.push(("limit", limit.to_string()));
                }
            }
            _ => {}
        }
        pairs
    }
}

/// Description of one REST call, consumed once by the pipeline
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Path relative to the base endpoint, optionally with a query string
    pub path: String,
    pub method: Method,
    /// JSON text; sent verbatim on POST, ignored on GET
    pub body: String,
    /// Present only for pageable requests
    pub pagination: Option<Pagination>,
    /// Repeated `status` filter values
    pub status: Vec<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: String::new(),
            pagination: None,
            status: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = body.into();
        request
    }

    /// Mark the request pageable with the given cursor and page size
    pub fn paged(mut self, cursor: i64, limit: Option<u32>) -> Self {
        self.pagination = Some(Pagination::new(cursor, limit));
        self
    }

    pub fn with_status<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.status.extend(statuses.into_iter().map(Into::into));
        self
    }

    pub fn is_pageable(&self) -> bool {
        self.pagination.is_some()
    }
}

/// Normalized HTTP response, returned for every status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub is_success: bool,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ResponseEnvelope {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: String) -> Self {
        Self {
            status,
            is_success: (200..300).contains(&status),
            headers,
            body,
        }
    }

    /// First header value with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Cursor for the next page backward, from `cb-before`
    pub fn cursor_before(&self) -> Option<i64> {
        self.header("cb-before").and_then(|v| v.parse().ok())
    }

    /// Cursor for the next page forward, from `cb-after`
    pub fn cursor_after(&self) -> Option<i64> {
        self.header("cb-after").and_then(|v| v.parse().ok())
    }

    /// Parse the body as `T`, turning a non-success status into `ApiError`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ExchangeError> {
        if !self.is_success {
            return Err(ExchangeError::ApiError {
                code: i32::from(self.status),
                message: self.error_message(),
            });
        }

        serde_json::from_str(&self.body).map_err(|e| {
            ExchangeError::ParseError(format!("Failed to parse response body: {}", e))
        })
    }

    fn error_message(&self) -> String {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        serde_json::from_str::<ErrorBody>(&self.body)
            .map(|b| b.message)
            .unwrap_or_else(|_| self.body.clone())
    }
}

/// Lifecycle of one realtime subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Idle,
    Connecting,
    RateGated,
    Subscribed,
    Receiving,
    Reconnecting,
    Cancelled,
}

impl SubscriptionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::RateGated => "rate_gated",
            Self::Subscribed => "subscribed",
            Self::Receiving => "receiving",
            Self::Reconnecting => "reconnecting",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One decoded feed frame; the payload is kept as received
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    payload: Value,
}

impl FeedMessage {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    fn decimal_field(&self, name: &str) -> Option<Decimal> {
        self.str_field(name).and_then(|v| Decimal::from_str(v).ok())
    }

    pub fn message_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    /// Exchange sequence number; absent on authenticated-only messages
    pub fn sequence(&self) -> Option<i64> {
        self.payload.get("sequence").and_then(Value::as_i64)
    }

    pub fn product_id(&self) -> Option<&str> {
        self.str_field("product_id")
    }

    pub fn order_id(&self) -> Option<&str> {
        self.str_field("order_id")
    }

    pub fn side(&self) -> Option<&str> {
        self.str_field("side")
    }

    pub fn price(&self) -> Option<Decimal> {
        self.decimal_field("price")
    }

    pub fn size(&self) -> Option<Decimal> {
        self.decimal_field("size")
    }

    pub fn remaining_size(&self) -> Option<Decimal> {
        self.decimal_field("remaining_size")
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.str_field("time")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// The exchange sent an explicit `error` frame
    Exchange,
    /// The frame had no `type` tag or one this client does not know
    UnknownType,
    /// The frame was not valid JSON
    Decode,
    /// The connection failed or closed; a reconnect follows
    Connection,
    /// The subscription was cancelled; no reconnect follows
    Cancelled,
}

/// Diagnostic delivered on the error stream
#[derive(Debug, Clone, PartialEq)]
pub struct FeedError {
    pub kind: FeedErrorKind,
    pub message: String,
    /// The offending frame, when there is one
    pub raw: Option<String>,
}

impl FeedError {
    pub fn new(kind: FeedErrorKind, message: impl Into<String>, raw: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == FeedErrorKind::Cancelled
    }
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.raw {
            Some(raw) => write!(f, "{:?}: {}, Msg: {}", self.kind, self.message, raw),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Typed feed event, one variant per message tag plus the error stream
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Received(FeedMessage),
    Open(FeedMessage),
    Done(FeedMessage),
    Match(FeedMessage),
    Change(FeedMessage),
    Error(FeedError),
}

impl FeedEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Received(_) => "received",
            Self::Open(_) => "open",
            Self::Done(_) => "done",
            Self::Match(_) => "match",
            Self::Change(_) => "change",
            Self::Error(_) => "error",
        }
    }

    /// Hand the event to the matching handler method
    pub fn dispatch(&self, handler: &dyn FeedHandler) {
        match self {
            Self::Received(m) => handler.on_received(m),
            Self::Open(m) => handler.on_open(m),
            Self::Done(m) => handler.on_done(m),
            Self::Match(m) => handler.on_match(m),
            Self::Change(m) => handler.on_change(m),
            Self::Error(e) => handler.on_error(e),
        }
    }
}
