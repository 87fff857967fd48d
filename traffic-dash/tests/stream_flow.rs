//! End-to-end flow tests against an in-process WebSocket server: snapshot
//! delivery, reconnect after an unintentional drop, and the live -> history
//! -> live round trip.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use traffic_dash::{
    present, ChartSpec, Command, ConnectionManager, ConnectionState, HistoryRange, HistorySeries,
    Selection, StreamConfig, Theme, TrafficStore, ViewController, ViewState,
};

const SNAPSHOT: &str =
    r#"{"traffic": {"10.0.0.1": {"http": {"in": 100, "out": 50}}, "10.0.0.2": {"dns": {"in": 10, "out": 10}}}}"#;

/// Serve every incoming connection: push one snapshot, then idle until the
/// client goes away. Returns the bound address.
async fn spawn_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                ws.send(Message::text(SNAPSHOT)).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    addr
}

async fn wait_for_state(
    state_rx: &mut watch::Receiver<ConnectionState>,
    wanted: ConnectionState,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while *state_rx.borrow() != wanted {
            state_rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}"));
}

#[tokio::test]
async fn snapshot_flows_into_store_and_overview() {
    let addr = spawn_server().await;
    let (mut manager, mut updates, _state_rx) =
        ConnectionManager::new(StreamConfig::new(format!("ws://{addr}")));
    manager.open();

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();

    let mut store = TrafficStore::new();
    store.update(update.snapshot, update.metadata);

    assert_eq!(store.overview_order(), vec!["10.0.0.1", "10.0.0.2"]);
    let totals = store.global_totals();
    assert_eq!((totals.inbound, totals.outbound, totals.clients), (110, 60, 2));

    manager.close();
}

#[tokio::test]
async fn reconnects_once_after_unintentional_drop() {
    // First connection is dropped by the server straight away; the client
    // must come back exactly once, after the fixed delay.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // Drop the first connection immediately.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Serve the reconnect normally.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text(SNAPSHOT)).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = StreamConfig::new(format!("ws://{addr}"))
        .with_reconnect_delay(Duration::from_millis(100));
    let (mut manager, mut updates, mut state_rx) = ConnectionManager::new(config);
    manager.open();

    wait_for_state(&mut state_rx, ConnectionState::Disconnected).await;
    wait_for_state(&mut state_rx, ConnectionState::Connected).await;

    // The snapshot from the second connection arrives.
    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(update.snapshot.contains_key("10.0.0.1"));

    manager.close();
}

#[tokio::test]
async fn live_history_live_round_trip() {
    let addr = spawn_server().await;
    let config = StreamConfig::new(format!("ws://{addr}"))
        .with_reconnect_delay(Duration::from_millis(100));
    let (mut manager, mut updates, mut state_rx) = ConnectionManager::new(config);
    let mut controller = ViewController::new();
    let mut store = TrafficStore::new();

    manager.open();
    wait_for_state(&mut state_rx, ConnectionState::Connected).await;
    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    store.update(update.snapshot, update.metadata);

    // Enter history: the stream closes intentionally and stays closed.
    let commands = controller.handle(Selection::Range(HistoryRange::H1));
    let mut history_seq = 0;
    for command in &commands {
        match command {
            Command::CloseStream => manager.close(),
            Command::FetchHistory { seq, .. } => history_seq = *seq,
            Command::OpenStream => unreachable!("entering history never opens the stream"),
        }
    }
    assert_eq!(manager.state(), ConnectionState::Closed);

    // No reconnect sneaks in behind the intentional close.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.state(), ConnectionState::Closed);

    let series: HistorySeries = HistorySeries::from_response(
        serde_json::from_str(r#"{"10.0.0.1": [{"time": "2024-01-01T00:00:00", "total": 500}]}"#)
            .unwrap(),
    );
    assert!(controller.apply_history(history_seq, Ok(series)));
    assert!(controller.history().is_some());

    // Back to live: the stream reopens and the history result is gone.
    for command in controller.handle(Selection::Live) {
        match command {
            Command::OpenStream => manager.open(),
            Command::CloseStream | Command::FetchHistory { .. } => {
                unreachable!("returning to live only reopens the stream")
            }
        }
    }
    wait_for_state(&mut state_rx, ConnectionState::Connected).await;

    assert_eq!(controller.view(), &ViewState::Live);
    assert!(controller.history().is_none());

    // The next live render is bar data derived from the snapshot alone.
    let spec = present::render(controller.view(), &store, controller.history(), Theme::Dark);
    let ChartSpec::Bars(bars) = spec else {
        panic!("live view should produce bars");
    };
    assert_eq!(bars.categories.len(), 2);

    manager.close();
}
