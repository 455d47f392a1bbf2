use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::types::{FeedError, FeedErrorKind, FeedEvent, FeedMessage};
use crate::exchanges::coinbase::signer::SignatureBlock;
use serde::Serialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Path and method the authenticated subscribe frame is signed over
pub const FEED_AUTH_PATH: &str = "/users/self";
pub const FEED_AUTH_METHOD: &str = "GET";

/// Subscribe frame for one product
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    pub product_id: String,
    #[serde(flatten)]
    auth: Option<FeedAuth>,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
struct FeedAuth {
    signature: String,
    key: String,
    passphrase: String,
    timestamp: String,
}

impl SubscribeRequest {
    /// Unauthenticated subscription
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            kind: "subscribe",
            product_id: product_id.into(),
            auth: None,
        }
    }

    /// Subscription carrying a signature block; the block must be fresh
    pub fn authenticated(product_id: impl Into<String>, block: SignatureBlock) -> Self {
        Self {
            kind: "subscribe",
            product_id: product_id.into(),
            auth: Some(FeedAuth {
                signature: block.signature,
                key: block.api_key,
                passphrase: block.passphrase,
                timestamp: block.timestamp,
            }),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }
}

impl std::fmt::Debug for SubscribeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeRequest")
            .field("product_id", &self.product_id)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Frames the subscribe request and turns feed frames into `FeedEvent`s
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedCodec;

impl FeedCodec {
    pub const fn new() -> Self {
        Self
    }

    /// Classify one text frame.
    ///
    /// Heartbeats and blank frames yield
    /// `Ok(None)`. A frame that is not JSON is an `Err`; a JSON frame with a
    /// missing or unknown `type` becomes an error event carrying the frame.
    pub fn decode_text(&self, text: &str) -> Result<Option<FeedEvent>, ExchangeError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let payload: Value = serde_json::from_str(text)
            .map_err(|e| ExchangeError::ParseError(format!("Failed to parse JSON: {}", e)))?;

        let Some(kind) = payload.get("type").and_then(Value::as_str) else {
            return Ok(Some(FeedEvent::Error(FeedError::new(
                FeedErrorKind::UnknownType,
                "Message has no type",
                Some(text.to_string()),
            ))));
        };

        let event = match kind {
            "received" => FeedEvent::Received(FeedMessage::new(payload)),
            "open" => FeedEvent::Open(FeedMessage::new(payload)),
            "done" => FeedEvent::Done(FeedMessage::new(payload)),
            "match" => FeedEvent::Match(FeedMessage::new(payload)),
            "change" => FeedEvent::Change(FeedMessage::new(payload)),
            "heartbeat" => {
                debug!("Skipping heartbeat");
                return Ok(None);
            }
            "error" => {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Exchange reported an error");
                FeedEvent::Error(FeedError::new(
                    FeedErrorKind::Exchange,
                    message,
                    Some(text.to_string()),
                ))
            }
            other => FeedEvent::Error(FeedError::new(
                FeedErrorKind::UnknownType,
                format!("Unknown message type: {}", other),
                Some(text.to_string()),
            )),
        };

        Ok(Some(event))
    }
}

impl WsCodec for FeedCodec {
    type Message = FeedEvent;
    type Subscription = SubscribeRequest;

    fn encode_subscription(&self, request: &SubscribeRequest) -> Result<Message, ExchangeError> {
        Ok(Message::Text(serde_json::to_string(request)?))
    }

    fn decode_message(&self, message: Message) -> Result<Option<FeedEvent>, ExchangeError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8(data).map_err(|e| {
                ExchangeError::ParseError(format!("Invalid UTF-8 in binary message: {}", e))
            })?,
            _ => return Ok(None),
        };

        self.decode_text(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_of(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_subscribe_frame() {
        let frame = FeedCodec
            .encode_subscription(&SubscribeRequest::new("BTC-USD"))
            .unwrap();
        assert_eq!(
            text_of(frame),
            json!({"type": "subscribe", "product_id": "BTC-USD"})
        );
    }

    #[test]
    fn test_authenticated_subscribe_frame() {
        let block = SignatureBlock {
            api_key: "key".to_string(),
            passphrase: "phrase".to_string(),
            timestamp: "1700000000".to_string(),
            signature: "c2ln".to_string(),
        };
        let request = SubscribeRequest::authenticated("ETH-USD", block);
        assert!(request.is_authenticated());
        assert!(!format!("{:?}", request).contains("phrase"));

        let frame = FeedCodec.encode_subscription(&request).unwrap();
        assert_eq!(
            text_of(frame),
            json!({
                "type": "subscribe",
                "product_id": "ETH-USD",
                "signature": "c2ln",
                "key": "key",
                "passphrase": "phrase",
                "timestamp": "1700000000"
            })
        );
    }

    #[test]
    fn test_known_tags_map_to_events() {
        let cases = [
            ("received", "received"),
            ("open", "open"),
            ("done", "done"),
            ("match", "match"),
            ("change", "change"),
        ];
        for (tag, expected) in cases {
            let frame = json!({"type": tag, "sequence": 1}).to_string();
            let event = FeedCodec.decode_text(&frame).unwrap().unwrap();
            assert_eq!(event.kind(), expected);
        }
    }

    #[test]
    fn test_control_frames_produce_nothing() {
        assert!(FeedCodec
            .decode_text(r#"{"type":"heartbeat","sequence":90}"#)
            .unwrap()
            .is_none());
        assert!(FeedCodec.decode_text("").unwrap().is_none());
        assert!(FeedCodec.decode_text("  \n").unwrap().is_none());
        assert!(FeedCodec
            .decode_message(Message::Ping(vec![1]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_error_frame_surfaces_message() {
        let frame = r#"{"type":"error","message":"Failed to subscribe"}"#;
        match FeedCodec.decode_text(frame).unwrap() {
            Some(FeedEvent::Error(error)) => {
                assert_eq!(error.kind, FeedErrorKind::Exchange);
                assert_eq!(error.message, "Failed to subscribe");
                assert_eq!(error.raw.as_deref(), Some(frame));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_or_missing_type_is_error_event() {
        for frame in [
            r#"{"type":"l2update"}"#,
            r#"{"type":"subscriptions","channels":[]}"#,
            r#"{"sequence":3}"#,
            "[1,2,3]",
        ] {
            match FeedCodec.decode_text(frame).unwrap() {
                Some(FeedEvent::Error(error)) => {
                    assert_eq!(error.kind, FeedErrorKind::UnknownType);
                    assert_eq!(error.raw.as_deref(), Some(frame));
                }
                other => panic!("unexpected {:?} for {}", other, frame),
            }
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let result = FeedCodec.decode_message(Message::Text("{not json".to_string()));
        assert!(matches!(result, Err(ExchangeError::ParseError(_))));
    }

    #[test]
    fn test_binary_frames_are_decoded_as_text() {
        let event = FeedCodec
            .decode_message(Message::Binary(br#"{"type":"match"}"#.to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), "match");
    }
}
