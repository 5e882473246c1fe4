//! Event model for client-side writing-process events
//!
//! Events arrive from browser instrumentation as JSON. The server stamps each
//! one with a `server.time`; the `client` block carries the event type tag and
//! a type-specific body. Fields this crate does not model are kept in `extra`
//! maps so that events survive a decode/encode cycle unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Student identifier used when a session carries no authentication
pub const GUEST_STUDENT_ID: &str = "[guest]";

/// One client event as logged by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned metadata (arrival timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerMeta>,

    /// Client-supplied payload
    #[serde(default)]
    pub client: ClientEvent,

    /// Authentication info attached by the server when the event was logged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMetadata>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server-side event metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMeta {
    /// Arrival time in seconds since the Unix epoch
    pub time: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client-side event payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Event type tag (`keystroke`, `visibility`, `google_docs_save`, ...)
    #[serde(default)]
    pub event: String,

    /// Explicit document id, when the extension knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,

    /// Page object the event refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<EventObject>,

    /// Edit command batches (`google_docs_save`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundles: Vec<Bundle>,

    /// Full change log (`document_history`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,

    /// Client-side metadata (client timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ClientMetadata>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page object an event refers to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One batch of edit commands from a save event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub commands: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Document change log from a history event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Entries are arrays whose first element is the edit command
    #[serde(default)]
    pub changelog: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client-side metadata block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Client timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Authentication info for a session or a logged event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthMetadata {
    pub safe_user_id: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthMetadata {
    pub fn new(safe_user_id: impl Into<String>) -> Self {
        Self {
            safe_user_id: safe_user_id.into(),
            extra: Map::new(),
        }
    }
}

impl Event {
    /// Event type tag from the client payload
    pub fn event_type(&self) -> &str {
        &self.client.event
    }

    /// Server arrival time, if the event was stamped
    pub fn server_time(&self) -> Option<f64> {
        self.server.as_ref().map(|s| s.time)
    }

    /// Title of the page object, if any
    pub fn object_title(&self) -> Option<&str> {
        self.client.object.as_ref().and_then(|o| o.title.as_deref())
    }

    /// Client timestamp in milliseconds, if the client sent one
    pub fn client_ts(&self) -> Option<f64> {
        self.client.metadata.as_ref().and_then(|m| m.ts)
    }
}

/// Metadata supplied once per consumer session
///
/// Fixed key fields (the student) are resolved from this when a pipeline
/// instance is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMetadata>,
}

impl SessionMetadata {
    pub fn for_student(safe_user_id: impl Into<String>) -> Self {
        Self {
            auth: Some(AuthMetadata::new(safe_user_id)),
        }
    }

    pub fn guest() -> Self {
        Self::default()
    }

    /// Student id for this session, or the guest sentinel
    pub fn student_id(&self) -> &str {
        self.auth
            .as_ref()
            .map(|a| a.safe_user_id.as_str())
            .unwrap_or(GUEST_STUDENT_ID)
    }
}

/// Side-channel metadata supplied by the dispatch layer with each event
///
/// Event-derived key fields are read from here by name, never from the event
/// body, so a reducer's scope does not depend on the event schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalMetadata(BTreeMap<String, String>);

impl AdditionalMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
