use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A call leg tracked by the registry.
///
/// `state` and `muted` mirror what the platform last reported (or what we last
/// asked it to do); nothing here is enforced locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallHandle {
    #[serde(rename = "callId")]
    pub call_id: String,
    pub state: CallState,
    pub muted: bool,
    pub direction: CallDirection,
    #[serde(rename = "remoteAddress")]
    pub remote_address: Option<String>,
}

impl CallHandle {
    pub fn new(call_id: impl Into<String>, direction: CallDirection) -> Self {
        Self {
            call_id: call_id.into(),
            state: CallState::Idle,
            muted: false,
            direction,
            remote_address: None,
        }
    }

    pub fn with_state(mut self, state: CallState) -> Self {
        self.state = state;
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Idle,
    Calling,
    Ringing,
    Active,
    Disconnected,
}

impl CallState {
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Calling | CallState::Ringing | CallState::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialRequest {
    pub to: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialResponse {
    #[serde(rename = "callId")]
    pub call_id: String,
    pub to: String,
    pub status: CallState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}
