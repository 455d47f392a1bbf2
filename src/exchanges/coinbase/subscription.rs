use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::rate_gate::RateGate;
use crate::core::kernel::ws::{TungsteniteWs, WsConfig, WsSession};
use crate::core::traits::FeedHandler;
use crate::core::types::{FeedError, FeedErrorKind, SubscriptionState};
use crate::exchanges::coinbase::codec::{
    FeedCodec, SubscribeRequest, FEED_AUTH_METHOD, FEED_AUTH_PATH,
};
use crate::exchanges::coinbase::signer::CoinbaseSigner;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const EXCHANGE_NAME: &str = "coinbase";

/// Why one connection's session ended
enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// Long-lived realtime subscription to one product's full feed.
///
/// `subscribe` keeps a connection alive until `unsubscribe` is called:
/// every connection attempt first passes the rate gate, a fresh subscribe
/// frame is sent on each connection, and a lost connection is reported on
/// the error stream and re-established. Cancellation is final; a cancelled
/// subscription cannot be restarted.
pub struct FeedSubscription {
    product_id: String,
    ws_url: String,
    signer: Option<Arc<CoinbaseSigner>>,
    gate: Arc<RateGate>,
    handler: Arc<dyn FeedHandler>,
    codec: FeedCodec,
    ws_config: WsConfig,
    cancel: CancellationToken,
    state: watch::Sender<SubscriptionState>,
}

impl FeedSubscription {
    /// Create an idle subscription using the process-wide feed gate
    pub fn new(
        product_id: impl Into<String>,
        ws_url: impl Into<String>,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<Self, ExchangeError> {
        let product_id = product_id.into();
        if product_id.trim().is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "A product id is required".to_string(),
            ));
        }

        let (state, _) = watch::channel(SubscriptionState::Idle);
        Ok(Self {
            product_id,
            ws_url: ws_url.into(),
            signer: None,
            gate: RateGate::shared_feed_gate(),
            handler,
            codec: FeedCodec::new(),
            ws_config: WsConfig::default(),
            cancel: CancellationToken::new(),
            state,
        })
    }

    /// Authenticate the subscribe frame with these credentials
    pub fn with_signer(mut self, signer: Arc<CoinbaseSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replace the shared gate, e.g. with a per-connection or test gate
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_ws_config(mut self, config: WsConfig) -> Self {
        self.ws_config = config;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.signer.is_some()
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Token that cancels this subscription when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation; safe to call repeatedly and from any task
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    /// Run on a background task
    pub fn spawn(self) -> SubscriptionHandle {
        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        let task = tokio::spawn(async move { self.subscribe().await });
        SubscriptionHandle {
            cancel,
            state,
            task,
        }
    }

    /// Drive the subscription until it is cancelled
    #[instrument(skip(self), fields(exchange = EXCHANGE_NAME, product_id = %self.product_id))]
    pub async fn subscribe(&self) {
        loop {
            self.set_state(SubscriptionState::RateGated);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = self.gate.wait_to_proceed() => {}
            }

            self.set_state(SubscriptionState::Connecting);
            let mut session = TungsteniteWs::new(self.ws_url.clone(), EXCHANGE_NAME.to_string())
                .with_config(self.ws_config.clone());

            let outcome = self.run_session(&mut session).await;

            if let Err(e) = session.close().await {
                debug!("Error while closing feed connection: {}", e);
            }

            match outcome {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost(_) if self.cancel.is_cancelled() => break,
                SessionEnd::Lost(reason) => {
                    warn!("Feed connection lost, reconnecting: {}", reason);
                    self.set_state(SubscriptionState::Reconnecting);
                    self.handler.on_error(&FeedError::new(
                        FeedErrorKind::Connection,
                        reason,
                        None,
                    ));
                }
            }
        }

        self.set_state(SubscriptionState::Cancelled);
        info!("Feed subscription cancelled");
        self.handler.on_error(&FeedError::new(
            FeedErrorKind::Cancelled,
            ExchangeError::Cancelled.to_string(),
            None,
        ));
    }

    /// Connect, subscribe and pump frames until the connection ends
    async fn run_session(&self, session: &mut TungsteniteWs) -> SessionEnd {
        let connected = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return SessionEnd::Cancelled,
            result = session.connect() => result,
        };
        if let Err(e) = connected {
            return SessionEnd::Lost(e.to_string());
        }

        let frame = match self.subscribe_frame() {
            Ok(frame) => frame,
            Err(e) => return SessionEnd::Lost(e.to_string()),
        };

        let sent = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return SessionEnd::Cancelled,
            result = session.send_raw(frame) => result,
        };
        if let Err(e) = sent {
            return SessionEnd::Lost(e.to_string());
        }
        self.set_state(SubscriptionState::Subscribed);
        debug!("Subscribe frame sent");

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Cancelled,
                next = session.next_raw() => next,
            };

            match next {
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "Connection closed by peer".to_string(),
                        |f| format!("Connection closed by peer: {} {}", u16::from(f.code), f.reason),
                    );
                    return SessionEnd::Lost(reason);
                }
                Some(Ok(message)) => {
                    self.set_state(SubscriptionState::Receiving);
                    self.handle_message(message);
                }
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("Connection stream ended".to_string()),
            }
        }
    }

    fn handle_message(&self, message: Message) {
        let (decoded, raw) = match message {
            Message::Text(text) => (self.codec.decode_text(&text), Some(text)),
            Message::Binary(data) => {
                let raw = String::from_utf8_lossy(&data).into_owned();
                (self.codec.decode_message(Message::Binary(data)), Some(raw))
            }
            other => (self.codec.decode_message(other), None),
        };

        match decoded {
            Ok(Some(event)) => event.dispatch(self.handler.as_ref()),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to decode feed message: {}", e);
                self.handler
                    .on_error(&FeedError::new(FeedErrorKind::Decode, e.to_string(), raw));
            }
        }
    }

    /// Subscribe frame for a new connection, signed afresh when authenticated
    fn subscribe_frame(&self) -> Result<Message, ExchangeError> {
        let request = match &self.signer {
            Some(signer) => SubscribeRequest::authenticated(
                self.product_id.clone(),
                signer.compute_signature(FEED_AUTH_PATH, FEED_AUTH_METHOD, "")?,
            ),
            None => SubscribeRequest::new(self.product_id.clone()),
        };
        self.codec.encode_subscription(&request)
    }

    fn set_state(&self, next: SubscriptionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("product_id", &self.product_id)
            .field("ws_url", &self.ws_url)
            .field("authenticated", &self.is_authenticated())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Control handle for a subscription running on its own task
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the subscription task to exit
    pub async fn join(self) -> Result<(), ExchangeError> {
        self.task.await.map_err(|e| {
            if e.is_cancelled() {
                ExchangeError::Cancelled
            } else {
                ExchangeError::Other(format!("Subscription task failed: {}", e))
            }
        })
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(self) -> Result<(), ExchangeError> {
        self.unsubscribe();
        self.join().await
    }
}
