//! Node -> client event shapes.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::json;

use chatrelay_core::protocol::event::{encode, ServerEvent, UserEntry};
use chatrelay_core::{ChatPayload, Envelope};

#[test]
fn users_event_shape() {
    let ev = ServerEvent::Users(vec![UserEntry {
        id: "3".into(),
        username: "Anonymous".into(),
    }]);
    let v: serde_json::Value = serde_json::from_str(&encode(&ev).unwrap()).unwrap();
    assert_eq!(
        v,
        json!({ "event": "users", "data": [{ "id": "3", "username": "Anonymous" }] })
    );
}

#[test]
fn chat_message_event_carries_envelope_verbatim() {
    let env = Envelope::from_relay(json!({
        "id": "18f-abc",
        "from": "alice",
        "text": "hi",
        "receivedAt": "2026-01-02T03:04:05.678Z",
        "image": null
    }))
    .unwrap();

    let s = encode(&ServerEvent::ChatMessage(env.clone())).unwrap();
    let v: serde_json::Value = serde_json::from_str(&s).unwrap();
    assert_eq!(v["event"], "chat_message");
    assert_eq!(v["data"]["receivedAt"], "2026-01-02T03:04:05.678Z");
    assert!(v["data"].get("image").is_some());

    match ServerEvent::decode(&s).unwrap() {
        ServerEvent::ChatMessage(back) => assert_eq!(back, env),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn message_log_preserves_order() {
    let a = ChatPayload::new("a", "first").into_envelope(None);
    let b = ChatPayload::new("b", "second").into_envelope(None);
    let s = encode(&ServerEvent::MessageLog(vec![a.clone(), b.clone()])).unwrap();

    match ServerEvent::decode(&s).unwrap() {
        ServerEvent::MessageLog(log) => assert_eq!(log, vec![a, b]),
        other => panic!("unexpected event {other:?}"),
    }
}
