use crate::core::errors::ExchangeError;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for exchange-specific WebSocket message encoding/decoding
///
/// Converts between raw WebSocket messages and typed feed messages. Control
/// frames (ping, pong, close) never reach the codec; the transport handles them.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this exchange
    type Message: Send;

    /// The subscription request this codec knows how to frame
    type Subscription: Send + Sync;

    /// Encode a subscription request into a WebSocket message
    fn encode_subscription(&self, request: &Self::Subscription) -> Result<Message, ExchangeError>;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Failed to decode message
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}
