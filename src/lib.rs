pub mod core;
pub mod exchanges;

pub use crate::core::{
    errors::ExchangeError,
    traits::{ChannelHandler, FeedHandler},
    types::*,
};
pub use exchanges::coinbase::{CoinbaseBuilder, CoinbaseRest, CoinbaseSigner, FeedSubscription};
