#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

//! Real nodes on 127.0.0.1:0, driven over HTTP and WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;

use chatrelay_client::{ClientConfig, ClientHandle, ClientSession, ClientState};
use chatrelay_core::{Envelope, ServerEvent};
use chatrelay_node::app_state::AppState;
use chatrelay_node::config::NodeConfig;

struct Node {
    url: String,
    state: AppState,
    stop: Option<oneshot::Sender<()>>,
}

impl Node {
    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn spawn_node(peers: Vec<String>) -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut cfg = NodeConfig::default();
    cfg.node.port = port;
    cfg.relay.peers = peers;
    cfg.relay.timeout_ms = 1000;

    let state = AppState::in_memory(cfg).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(chatrelay_node::serve_with_shutdown(listener, state.clone(), async {
        let _ = stopped.await;
    }));

    Node {
        url: format!("http://127.0.0.1:{port}"),
        state,
        stop: Some(stop),
    }
}

fn seed(node: &Node, id: &str, text: &str) {
    let env = Envelope::from_relay(json!({ "id": id, "from": "seed", "text": text })).unwrap();
    assert!(node.state.realtime().accept_relayed(env));
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    false
}

async fn join(node: &Node, name: &str) -> ClientHandle {
    let cfg = ClientConfig::new(vec![node.url.clone()]).with_retry_delay(Duration::from_millis(100));
    let handle = ClientSession::join(cfg, name).unwrap();
    assert!(handle.wait_connected(Duration::from_secs(5)).await, "{name} never connected");
    handle
}

async fn next_chat(rx: &mut broadcast::Receiver<ServerEvent>, within: Duration) -> Option<String> {
    tokio::time::timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(ServerEvent::ChatMessage(env)) => return Some(env.id),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

fn ids_with_text(node: &Node, text: &str) -> Vec<String> {
    node.state
        .realtime()
        .recent(1000)
        .into_iter()
        .filter(|e| e.text() == Some(text))
        .map(|e| e.id)
        .collect()
}

#[tokio::test]
async fn message_is_relayed_to_peer_with_same_id() {
    let n2 = spawn_node(vec![]).await;
    let n1 = spawn_node(vec![n2.url.clone()]).await;

    let bob = join(&n2, "bob").await;
    let mut bob_rx = bob.subscribe();
    let alice = join(&n1, "alice").await;

    alice.send("hi").unwrap();

    assert!(eventually(|| ids_with_text(&n1, "hi").len() == 1).await);
    let id = ids_with_text(&n1, "hi").remove(0);

    assert!(eventually(|| n2.state.realtime().contains(&id)).await);
    assert_eq!(next_chat(&mut bob_rx, Duration::from_secs(3)).await.as_deref(), Some(id.as_str()));

    let stored = n2.state.realtime().recent(1);
    assert_eq!(stored[0].from(), Some("alice"));
    assert!(stored[0].received_at().is_some());

    // the origin keeps exactly one copy regardless of relay outcome
    assert_eq!(ids_with_text(&n1, "hi"), vec![id]);
}

#[tokio::test]
async fn nodes_without_peers_do_not_share_messages() {
    let n1 = spawn_node(vec![]).await;
    let n2 = spawn_node(vec![]).await;

    let alice = join(&n1, "alice").await;
    alice.send("only here").unwrap();

    assert!(eventually(|| n1.state.realtime().log_len() == 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(n2.state.realtime().log_len(), 0);
}

#[tokio::test]
async fn unreachable_peer_does_not_affect_origin() {
    let n1 = spawn_node(vec!["http://127.0.0.1:9".into()]).await;

    let alice = join(&n1, "alice").await;
    let bob = join(&n1, "bob").await;
    let mut bob_rx = bob.subscribe();

    alice.send("still delivered").unwrap();
    assert!(next_chat(&mut bob_rx, Duration::from_secs(3)).await.is_some());
    assert_eq!(ids_with_text(&n1, "still delivered").len(), 1);
}

#[tokio::test]
async fn relay_without_id_is_rejected() {
    let n1 = spawn_node(vec![]).await;
    let watcher = join(&n1, "watcher").await;
    let mut rx = watcher.subscribe();

    let resp = reqwest::Client::new()
        .post(format!("{}/internal/relay", n1.url))
        .json(&json!({ "from": "mallory", "text": "no id" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");

    assert_eq!(n1.state.realtime().log_len(), 0);
    assert!(next_chat(&mut rx, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn relay_is_idempotent_over_http() {
    let n1 = spawn_node(vec![]).await;
    let watcher = join(&n1, "watcher").await;
    let mut rx = watcher.subscribe();

    let client = reqwest::Client::new();
    let env = json!({
        "id": "abc-00000001",
        "from": "alice",
        "text": "hello",
        "receivedAt": "2024-01-01T00:00:00.000Z",
        "image": "data:image/png;base64,AAAA"
    });

    let mut acks = Vec::new();
    for _ in 0..2 {
        let resp = client
            .post(format!("{}/internal/relay", n1.url))
            .json(&env)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        acks.push(resp.json::<Value>().await.unwrap());
    }
    assert_eq!(acks[0], json!({ "ok": true, "stored": true }));
    assert_eq!(acks[1], json!({ "ok": true, "stored": false }));

    assert_eq!(next_chat(&mut rx, Duration::from_secs(3)).await.as_deref(), Some("abc-00000001"));
    assert!(next_chat(&mut rx, Duration::from_millis(300)).await.is_none());

    let stored = n1.state.realtime().recent(1);
    assert_eq!(stored.len(), 1);
    assert_eq!(serde_json::to_value(&stored[0]).unwrap(), env);
}

#[tokio::test]
async fn health_and_users_endpoints() {
    let n1 = spawn_node(vec!["http://localhost:1".into()]).await;
    let _alice = join(&n1, "alice").await;

    let health: Value = reqwest::get(format!("{}/internal/health", n1.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["ok"], true);
    assert_eq!(health["port"], n1.state.cfg().node.port);
    assert_eq!(health["peers"], json!(["http://localhost:1"]));

    assert!(
        eventually(|| n1.state.realtime().users().iter().any(|u| u.username == "alice")).await
    );
    let users = chatrelay_client::fetch_users(&n1.url).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");

    let metrics = reqwest::get(format!("{}/metrics", n1.url))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("chatrelay_clients"));
}

#[tokio::test]
async fn raw_socket_gets_seed_presence_and_advisory_errors() {
    let n1 = spawn_node(vec![]).await;
    n1.state.realtime().accept_relayed(
        serde_json::from_value(json!({ "id": "seed-1", "from": "x", "text": "earlier" })).unwrap(),
    );

    let ws_url = format!("{}/ws", n1.url.replace("http://", "ws://"));
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url.as_str()).await.unwrap();

    async fn next_event<S>(ws: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
                .await
                .expect("timed out")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(s) = msg {
                return serde_json::from_str(&s).unwrap();
            }
        }
    }

    let seed = next_event(&mut ws).await;
    assert_eq!(seed["event"], "message_log");
    assert_eq!(seed["data"][0]["id"], "seed-1");

    let presence = next_event(&mut ws).await;
    assert_eq!(presence["event"], "users");
    assert_eq!(presence["data"][0]["username"], "Anonymous");

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "BAD_REQUEST");

    // still open: a valid event after the error is processed
    ws.send(Message::Text(
        json!({ "event": "set_username", "data": "carol" }).to_string(),
    ))
    .await
    .unwrap();
    let presence = next_event(&mut ws).await;
    assert_eq!(presence["event"], "users");
    assert_eq!(presence["data"][0]["username"], "carol");
}

#[tokio::test]
async fn relay_body_errors_are_structured() {
    let n1 = spawn_node(vec![]).await;
    let client = reqwest::Client::new();
    let url = format!("{}/internal/relay", n1.url);

    // truncated json
    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body(r#"{"id":"x""#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");

    // well-formed envelope without a json content type is still accepted
    let resp = client
        .post(&url)
        .body(r#"{"id":"plain-1","text":"hi"}"#)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(n1.state.realtime().contains("plain-1"));

    // not json at all, no content type
    let resp = client.post(&url).body("hello").send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");
    assert_eq!(n1.state.realtime().log_len(), 1);
}

#[tokio::test]
async fn relayed_envelope_is_stored_and_broadcast_unchanged() {
    let n1 = spawn_node(vec![]).await;
    let n2 = spawn_node(vec![]).await;
    let watcher = join(&n1, "watcher").await;
    let mut rx = watcher.subscribe();

    let sent = json!({ "id": "p-1", "from": null, "image": "img://1" });
    let resp = reqwest::Client::new()
        .post(format!("{}/internal/relay", n1.url))
        .json(&sent)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let stored = n1.state.realtime().recent(1);
    assert_eq!(serde_json::to_value(&stored[0]).unwrap(), sent);

    let seen = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(ServerEvent::ChatMessage(env)) = rx.recv().await {
                return env;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(serde_json::to_value(&seen).unwrap(), sent);

    // a second hop re-emits the same object
    let resp = reqwest::Client::new()
        .post(format!("{}/internal/relay", n2.url))
        .json(&stored[0])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(serde_json::to_value(&n2.state.realtime().recent(1)[0]).unwrap(), sent);
}

#[tokio::test]
async fn client_skips_unreachable_node() {
    let live = spawn_node(vec![]).await;
    let cfg = ClientConfig::new(vec!["http://127.0.0.1:9".into(), live.url.clone()])
        .with_retry_delay(Duration::from_millis(50));
    let dave = ClientSession::join(cfg, "dave").unwrap();

    assert!(dave.wait_connected(Duration::from_secs(5)).await);
    assert_eq!(dave.state(), ClientState::Connected { addr: live.url.clone() });
    assert!(eventually(|| live.state.realtime().users().iter().any(|u| u.username == "dave")).await);
}

#[tokio::test]
async fn client_fails_over_and_reseeds_view() {
    let mut a = spawn_node(vec![]).await;
    let mut b = spawn_node(vec![]).await;
    seed(&a, "a-1", "from a");
    seed(&b, "b-1", "from b");

    let cfg = ClientConfig::new(vec![a.url.clone(), b.url.clone()])
        .with_retry_delay(Duration::from_millis(50));
    let carol = ClientSession::join(cfg, "carol").unwrap();
    assert!(carol.wait_connected(Duration::from_secs(5)).await);

    let ClientState::Connected { addr: first } = carol.state() else {
        panic!("not connected");
    };
    let first_is_a = first == a.url;
    let expected_seed = if first_is_a { "b-1" } else { "a-1" };
    let (lost, other) = if first_is_a { (&mut a, &b) } else { (&mut b, &a) };

    assert!(eventually(|| carol.view().messages.len() == 1).await);
    lost.shutdown();

    let mut state = carol.watch_state();
    let target = ClientState::Connected { addr: other.url.clone() };
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == target))
        .await
        .expect("no failover")
        .unwrap();

    // name re-announced on the new node
    assert!(eventually(|| other.state.realtime().users().iter().any(|u| u.username == "carol")).await);

    // view replaced by the new node's log
    assert!(eventually(|| {
        let ids: Vec<String> = carol.view().messages.into_iter().map(|m| m.id).collect();
        ids == vec![expected_seed.to_string()]
    })
    .await);

    // and sends go to the new node
    carol.send("after failover").unwrap();
    assert!(eventually(|| ids_with_text(other, "after failover").len() == 1).await);
}
