pub mod codec;
pub mod signer;
pub mod types;

pub mod builder;
pub mod rest;
pub mod subscription;

// Re-export main components
pub use builder::{build_rest, default_rest_quota, CoinbaseBuilder};
pub use codec::{FeedCodec, SubscribeRequest};
pub use rest::CoinbaseRest;
pub use signer::{CoinbaseSigner, Credentials, SignatureBlock};
pub use subscription::{FeedSubscription, SubscriptionHandle};
pub use types::{BidAskOrder, BookLevel, Order, OrderBook, OrderRef, Page, Product};
