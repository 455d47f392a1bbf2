use cbfeed::core::kernel::RateGate;
use cbfeed::exchanges::coinbase::{CoinbaseSigner, Credentials, FeedSubscription};
use cbfeed::{ChannelHandler, FeedErrorKind, FeedEvent, SubscriptionState};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

fn fast_gate() -> Arc<RateGate> {
    Arc::new(RateGate::new(
        nonzero_ext::nonzero!(1u32),
        Duration::from_millis(50),
    ))
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("no connection attempt")
        .unwrap();
    accept_async(stream).await.unwrap()
}

async fn read_subscribe(ws: &mut ServerWs) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected subscribe frame, got {:?}", other),
        }
    }
}

async fn send(ws: &mut ServerWs, frame: &str) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_event(rx: &mut UnboundedReceiver<FeedEvent>) -> FeedEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for feed event")
        .expect("handler channel closed")
}

fn subscription(url: &str) -> (FeedSubscription, UnboundedReceiver<FeedEvent>) {
    let (handler, rx) = ChannelHandler::new();
    let subscription = FeedSubscription::new("BTC-USD", url, Arc::new(handler))
        .unwrap()
        .with_rate_gate(fast_gate());
    (subscription, rx)
}

#[tokio::test]
async fn test_events_arrive_in_order_and_bad_frames_do_not_disconnect() {
    let (listener, url) = listener().await;
    let (subscription, mut rx) = subscription(&url);
    let handle = subscription.spawn();

    let mut ws = accept(&listener).await;
    let frame = read_subscribe(&mut ws).await;
    assert_eq!(frame, json!({"type": "subscribe", "product_id": "BTC-USD"}));

    send(&mut ws, r#"{"type":"open","sequence":1,"price":"10.5"}"#).await;
    send(&mut ws, r#"{"type":"match","sequence":2}"#).await;
    send(&mut ws, "{not json").await;
    send(&mut ws, r#"{"type":"heartbeat","sequence":2}"#).await;
    send(&mut ws, r#"{"type":"done","sequence":3}"#).await;

    match next_event(&mut rx).await {
        FeedEvent::Open(m) => assert_eq!(m.sequence(), Some(1)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Match(_)));
    match next_event(&mut rx).await {
        FeedEvent::Error(e) => {
            assert_eq!(e.kind, FeedErrorKind::Decode);
            assert_eq!(e.raw.as_deref(), Some("{not json"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Done(_)));

    // The same connection keeps delivering after the bad frame
    send(&mut ws, r#"{"type":"change","sequence":4}"#).await;
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Change(_)));

    handle.shutdown().await.unwrap();
    match next_event(&mut rx).await {
        FeedEvent::Error(e) => assert_eq!(e.kind, FeedErrorKind::Cancelled),
        other => panic!("unexpected {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_reconnects_and_resubscribes_after_abrupt_close() {
    let (listener, url) = listener().await;
    let (subscription, mut rx) = subscription(&url);
    let mut states = subscription.watch_state();
    let handle = subscription.spawn();

    let mut first = accept(&listener).await;
    read_subscribe(&mut first).await;
    send(&mut first, r#"{"type":"open","sequence":1}"#).await;
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Open(_)));

    // Drop the socket without a closing handshake
    drop(first);

    match next_event(&mut rx).await {
        FeedEvent::Error(e) => assert_eq!(e.kind, FeedErrorKind::Connection),
        other => panic!("unexpected {:?}", other),
    }

    let mut second = accept(&listener).await;
    let frame = read_subscribe(&mut second).await;
    assert_eq!(frame["type"], "subscribe");
    assert_eq!(frame["product_id"], "BTC-USD");

    send(&mut second, r#"{"type":"match","sequence":2}"#).await;
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Match(_)));
    states
        .wait_for(|s| *s == SubscriptionState::Receiving)
        .await
        .unwrap();

    handle.shutdown().await.unwrap();
    match next_event(&mut rx).await {
        FeedEvent::Error(e) => assert!(e.is_cancellation()),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_peer_close_frame_triggers_reconnect() {
    let (listener, url) = listener().await;
    let (subscription, mut rx) = subscription(&url);
    let handle = subscription.spawn();

    let mut first = accept(&listener).await;
    read_subscribe(&mut first).await;
    first.close(None).await.unwrap();

    match next_event(&mut rx).await {
        FeedEvent::Error(e) => assert_eq!(e.kind, FeedErrorKind::Connection),
        other => panic!("unexpected {:?}", other),
    }

    let mut second = accept(&listener).await;
    read_subscribe(&mut second).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_while_waiting_for_data() {
    let (listener, url) = listener().await;
    let (subscription, mut rx) = subscription(&url);
    let mut states = subscription.watch_state();
    let handle = subscription.spawn();

    let mut ws = accept(&listener).await;
    read_subscribe(&mut ws).await;
    states
        .wait_for(|s| *s == SubscriptionState::Subscribed)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("subscription did not stop promptly")
        .unwrap();

    match next_event(&mut rx).await {
        FeedEvent::Error(e) => assert!(e.is_cancellation()),
        other => panic!("unexpected {:?}", other),
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(*states.borrow(), SubscriptionState::Cancelled);

    let again = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(again.is_err(), "no connection may follow cancellation");

    // The client closed its side
    let closed = tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .unwrap();
    assert!(matches!(closed, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn test_authenticated_subscribe_frame_carries_signature() {
    let (listener, url) = listener().await;
    let (handler, _rx) = ChannelHandler::new();
    let signer = CoinbaseSigner::new(
        Credentials::new("key", "phrase", "c2VjcmV0LWtleS1ieXRlcw==").unwrap(),
    )
    .with_clock(|| 1_700_000_000);
    let handle = FeedSubscription::new("BTC-USD", url, Arc::new(handler))
        .unwrap()
        .with_rate_gate(fast_gate())
        .with_signer(Arc::new(signer))
        .spawn();

    let mut ws = accept(&listener).await;
    let frame = read_subscribe(&mut ws).await;
    assert_eq!(
        frame,
        json!({
            "type": "subscribe",
            "product_id": "BTC-USD",
            "signature": "fNh+l00aiqlWcSri8vOCkRvYbqCzTpdPrq9+ueRff8M=",
            "key": "key",
            "passphrase": "phrase",
            "timestamp": "1700000000"
        })
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_attempts_are_rate_gated() {
    let (listener, url) = listener().await;
    let gate = Arc::new(RateGate::new(
        nonzero_ext::nonzero!(1u32),
        Duration::from_millis(300),
    ));
    let (handler, _rx) = ChannelHandler::new();
    let handle = FeedSubscription::new("BTC-USD", url, Arc::new(handler))
        .unwrap()
        .with_rate_gate(gate)
        .spawn();

    let mut first = accept(&listener).await;
    read_subscribe(&mut first).await;
    let dropped_at = std::time::Instant::now();
    drop(first);

    let mut second = accept(&listener).await;
    read_subscribe(&mut second).await;
    assert!(dropped_at.elapsed() >= Duration::from_millis(200));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_binary_frame_reports_its_payload() {
    let (listener, url) = listener().await;
    let (subscription, mut rx) = subscription(&url);
    let handle = subscription.spawn();

    let mut ws = accept(&listener).await;
    read_subscribe(&mut ws).await;

    ws.send(Message::Binary(b"{not json".to_vec())).await.unwrap();
    match next_event(&mut rx).await {
        FeedEvent::Error(e) => {
            assert_eq!(e.kind, FeedErrorKind::Decode);
            assert_eq!(e.raw.as_deref(), Some("{not json"));
        }
        other => panic!("unexpected {:?}", other),
    }

    // Still connected afterwards
    ws.send(Message::Binary(br#"{"type":"match","sequence":1}"#.to_vec()))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Match(_)));

    handle.shutdown().await.unwrap();
}
