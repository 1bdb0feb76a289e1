//! Browser session handles: the sealed credential blob and the live
//! stream reference a human operator re-attaches to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder substituted in the stream URL template.
pub const SESSION_ID_PLACEHOLDER: &str = "{session_id}";

/// Authentication cookies and tokens captured by the automation layer.
///
/// Opaque to the orchestrator: it is only copied forward from one run to
/// the next. `Debug` never prints the contents.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(serde_json::Value);

impl SessionState {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// `true` for `null`, `{}` and `[]`.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionState(<redacted>)")
    }
}

/// Where a human can watch / take over the browser session, and which
/// external session it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSessionRef {
    pub live_stream_url: String,
    pub active_session_id: String,
}

impl LiveSessionRef {
    pub fn new(live_stream_url: impl Into<String>, active_session_id: impl Into<String>) -> Self {
        Self {
            live_stream_url: live_stream_url.into(),
            active_session_id: active_session_id.into(),
        }
    }

    /// Build a reference by rendering `template` for `session_id`.
    ///
    /// Templates without the `{session_id}` placeholder get the id appended
    /// as a trailing path segment.
    pub fn from_template(template: &str, session_id: &str) -> Self {
        let url = if template.contains(SESSION_ID_PLACEHOLDER) {
            template.replace(SESSION_ID_PLACEHOLDER, session_id)
        } else {
            format!("{}/{session_id}", template.trim_end_matches('/'))
        };
        Self::new(url, session_id)
    }
}
