//! Chat envelope: the unit stored in every node's log and relayed verbatim.
//!
//! An envelope is created exactly once, by the node that first receives the
//! message from a client. That node assigns `id` and `receivedAt`; every
//! other hop copies the envelope as-is. `id` is the only dedup key.

use chrono::{SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RelayError};

/// Display name used when a client never named itself.
pub const ANONYMOUS: &str = "Anonymous";

/// Keys a client may not choose for itself.
const RESERVED_KEYS: [&str; 2] = ["id", "receivedAt"];

/// Length of the random id suffix.
const ID_SUFFIX_LEN: usize = 8;

/// Immutable chat message unit.
///
/// Only `id` is typed. Every other key (`from`, `text`, `receivedAt`,
/// `image`, ...) is kept exactly as the originating node wrote it, explicit
/// nulls included, so a relay hop re-emits the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Globally unique id (time prefix + random suffix).
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Validate and decode an envelope arriving from a peer node.
    ///
    /// Only `id` is mandatory; everything else is carried as received.
    pub fn from_relay(value: Value) -> Result<Self> {
        let has_id = value
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            return Err(RelayError::BadRequest("relay envelope requires id".into()));
        }
        serde_json::from_value(value)
            .map_err(|e| RelayError::BadRequest(format!("invalid relay envelope: {e}")))
    }

    /// Sender display name, when it is a string.
    pub fn from(&self) -> Option<&str> {
        self.str_field("from")
    }

    pub fn text(&self) -> Option<&str> {
        self.str_field("text")
    }

    /// RFC 3339 timestamp set by the originating node.
    pub fn received_at(&self) -> Option<&str> {
        self.str_field("receivedAt")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Generate a new envelope id: millisecond time prefix plus random suffix.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{millis:x}-{suffix}")
}

/// Current time as an ISO-8601 string with millisecond precision.
pub fn received_at_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Client-submitted chat message, before the node turns it into an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatPayload {
    /// Minimal `{from, text}` payload as sent by a client.
    pub fn new(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    /// A chat message needs a non-empty text or an image reference.
    pub fn validate(&self) -> Result<()> {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_image = self.extra.get("image").is_some_and(|v| !v.is_null());
        if has_text || has_image {
            Ok(())
        } else {
            Err(RelayError::BadRequest("text or image is required".into()))
        }
    }

    /// Sender name carried by the payload, ignoring blank values.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    /// Turn the payload into a fresh envelope with a new id and timestamp.
    ///
    /// `fallback_from` is the connection's current display name, used when
    /// the payload does not name its sender.
    pub fn into_envelope(self, fallback_from: Option<&str>) -> Envelope {
        let from = self
            .sender()
            .or(fallback_from)
            .unwrap_or(ANONYMOUS)
            .to_string();

        let mut extra = self.extra;
        for key in RESERVED_KEYS {
            if extra.remove(key).is_some() {
                tracing::debug!(key, "dropping client-supplied reserved field");
            }
        }

        extra.insert("from".into(), Value::String(from));
        if let Some(text) = self.text {
            extra.insert("text".into(), Value::String(text));
        }
        extra.insert("receivedAt".into(), Value::String(received_at_now()));

        Envelope {
            id: generate_id(),
            fields: extra,
        }
    }
}
