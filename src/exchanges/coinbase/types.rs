use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tradable product as listed by `/products`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    #[serde(default)]
    pub base_increment: Option<Decimal>,
    #[serde(default)]
    pub quote_increment: Option<Decimal>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub trading_disabled: bool,
}

/// Book depth requested from `/products/{id}/book`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookLevel {
    /// Best bid and ask only
    #[default]
    Best,
    /// Top 50 aggregated price levels
    Aggregated,
    /// Full non-aggregated book
    Full,
}

impl BookLevel {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Best => 1,
            Self::Aggregated => 2,
            Self::Full => 3,
        }
    }
}

/// Third element of a book entry: an order id at level 3, an order count otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderRef {
    Count(u64),
    Id(String),
}

/// One price level or resting order, sent on the wire as `[price, size, ref]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(Decimal, Decimal, OrderRef)")]
pub struct BidAskOrder {
    pub price: Decimal,
    pub size: Decimal,
    pub order_ref: OrderRef,
}

impl From<(Decimal, Decimal, OrderRef)> for BidAskOrder {
    fn from((price, size, order_ref): (Decimal, Decimal, OrderRef)) -> Self {
        Self {
            price,
            size,
            order_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderBook {
    pub sequence: i64,
    pub bids: Vec<BidAskOrder>,
    pub asks: Vec<BidAskOrder>,
}

/// Order as returned by `/orders`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub product_id: String,
    pub side: String,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub filled_size: Option<Decimal>,
    pub status: String,
    #[serde(default)]
    pub settled: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of a cursor-paged list plus the cursors for neighbouring pages
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub before: Option<i64>,
    pub after: Option<i64>,
}
