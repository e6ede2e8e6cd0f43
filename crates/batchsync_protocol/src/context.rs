//! Session context carried by every message and progress event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session and correlation data for one synchronization.
///
/// The transfer core never mutates a context; it clones it into outgoing
/// envelopes and progress events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    /// Session identifier, shared by every batch of the session.
    pub session_id: Uuid,
    /// Name of the synchronized scope.
    pub scope_name: String,
    /// Protocol version negotiated for the session.
    pub protocol_version: u16,
    /// Opaque filter parameters forwarded to the server.
    pub parameters: Vec<(String, String)>,
}

impl SyncContext {
    /// Creates a context with a fresh session id.
    pub fn new(scope_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            scope_name: scope_name.into(),
            protocol_version: 1,
            parameters: Vec::new(),
        }
    }

    /// Sets the protocol version.
    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }

    /// Adds a filter parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new("DefaultScope")
    }
}
