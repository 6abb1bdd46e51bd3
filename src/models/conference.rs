use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Bookkeeping for a platform-managed conference room.
///
/// A record with no participants is still a live conference; it goes away only
/// when the conference is explicitly ended.
///
/// `participants` holds channel addresses. A participant reported by the
/// platform for a call the registry never tracked has no known address and is
/// listed under its platform call id instead (ids start with `CA`, addresses
/// with `whatsapp:`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConferenceRecord {
    #[serde(rename = "conferenceId")]
    pub conference_id: String,
    pub participants: Vec<String>,
    pub moderator: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl ConferenceRecord {
    pub fn new(conference_id: impl Into<String>, moderator: Option<String>) -> Self {
        Self {
            conference_id: conference_id.into(),
            participants: Vec::new(),
            moderator,
            created_at: Utc::now(),
        }
    }

    pub fn has_participant(&self, address: &str) -> bool {
        self.participants.iter().any(|p| p == address)
    }

    /// Returns false if the address was already present
    pub(crate) fn insert_participant(&mut self, address: &str) -> bool {
        if self.has_participant(address) {
            return false;
        }
        self.participants.push(address.to_string());
        true
    }

    /// Returns false if the address was not present
    pub(crate) fn remove_participant(&mut self, address: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p != address);
        self.participants.len() != before
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConferenceRequest {
    #[serde(rename = "conferenceId")]
    pub conference_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub moderator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRequest {
    pub address: String,
}
