#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests against a real WebSocket server on an ephemeral port.

use std::{net::SocketAddr, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::{net::TcpListener, sync::mpsc},
    tokio_tungstenite::{accept_async, tungstenite::Message},
};

use livefeed_channel::{
    ChannelConfig, ConnectionStatus, Endpoint, Payload, RealtimeChannel, events,
};

/// Accept connections forever. Each connection answers `get_prices` with a
/// `price_data` frame, reports every inbound text frame on `seen`, and is
/// closed by the server after `close_after` frames when set.
async fn start_price_server(
    close_after: Option<usize>,
) -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(tcp).await.unwrap();
                let mut frames = 0;
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let value: Value = serde_json::from_str(text.as_str()).unwrap();
                    let _ = seen_tx.send(value.clone());
                    if value["type"] == "get_prices" {
                        let reply = json!({
                            "type": "price_data",
                            "prices": [{"symbol": "GOLD", "price": "2350.10"}],
                        });
                        ws.send(Message::Text(reply.to_string().into()))
                            .await
                            .unwrap();
                    }
                    frames += 1;
                    if close_after.is_some_and(|n| frames >= n) {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            });
        }
    });

    (addr, seen_rx)
}

fn recorder(
    channel: &RealtimeChannel,
    kind: &str,
) -> mpsc::UnboundedReceiver<Payload> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.on(kind, move |payload| {
        let _ = tx.send(payload.clone());
    });
    rx
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

#[tokio::test]
async fn on_open_request_gets_a_typed_reply() {
    let (addr, mut seen) = start_price_server(None).await;
    let endpoint = Endpoint::from_origin(&format!("http://{addr}"), "/ws/price-feeds/").unwrap();
    assert_eq!(endpoint.as_str(), format!("ws://{addr}/ws/price-feeds/"));

    let channel = RealtimeChannel::new(
        ChannelConfig::new(endpoint).with_on_open(livefeed_protocol::get_prices()),
    );
    let mut prices = recorder(&channel, "price_data");
    channel.connect();

    assert_eq!(within(seen.recv()).await.unwrap(), json!({"type": "get_prices"}));
    let data = within(prices.recv()).await.unwrap();
    assert_eq!(data["prices"][0]["symbol"], "GOLD");
    assert!(!data.contains_key("type"));
    assert!(channel.is_connected());

    assert!(channel.send(&livefeed_protocol::subscribe_asset("metals")));
    assert_eq!(
        within(seen.recv()).await.unwrap(),
        json!({"type": "subscribe_asset", "asset_type": "metals"})
    );

    channel.disconnect();
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
    assert!(!channel.send(&livefeed_protocol::get_prices()));
}

#[tokio::test]
async fn server_close_triggers_reconnect_and_replays_on_open() {
    let (addr, mut seen) = start_price_server(Some(1)).await;
    let endpoint = Endpoint::parse(&format!("ws://{addr}/ws/price-feeds/")).unwrap();
    let channel = RealtimeChannel::new(
        ChannelConfig::new(endpoint)
            .with_base_delay(Duration::from_millis(20))
            .with_on_open(livefeed_protocol::get_prices()),
    );
    let mut connects = recorder(&channel, events::CONNECT);
    let mut disconnects = recorder(&channel, events::DISCONNECT);
    channel.connect();

    within(connects.recv()).await.unwrap();
    assert_eq!(within(seen.recv()).await.unwrap()["type"], "get_prices");
    within(disconnects.recv()).await.unwrap();

    // Second session on a fresh connection asks again.
    within(connects.recv()).await.unwrap();
    assert_eq!(within(seen.recv()).await.unwrap()["type"], "get_prices");

    channel.disconnect();
}

#[tokio::test]
async fn unreachable_server_gives_up_after_max_retries() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let endpoint = Endpoint::parse(&format!("ws://{addr}/ws/track/1/secret/")).unwrap();
    let channel = RealtimeChannel::new(
        ChannelConfig::new(endpoint)
            .with_max_retries(Some(2))
            .with_base_delay(Duration::from_millis(10)),
    );
    let mut errors = recorder(&channel, events::ERROR);
    channel.connect();

    for _ in 0..3 {
        let payload = within(errors.recv()).await.unwrap();
        assert!(payload["message"].is_string());
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(errors.try_recv().is_err());
    assert_eq!(channel.retry_count(), 2);
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
}
