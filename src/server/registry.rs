//! In-memory call and conference registry
//!
//! A passive store: it records what callers and platform notifications tell
//! it and never talks to the platform itself. Nothing here survives a restart.
//!
//! The registry is a plain struct with `&mut self` mutations. The server owns
//! one instance behind a lock in `AppState`, which serializes access.
//!
//! Platform notifications arrive in no guaranteed order relative to each other
//! or to our own REST calls. Ended call ids are remembered (up to
//! [`ENDED_CALL_HISTORY`] of them) so a late notification or registration
//! cannot bring a finished call back.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use super::events::{CallStatusNotification, ConferenceNotification, PlatformEvents};
use crate::models::{CallDirection, CallHandle, CallState, ConferenceRecord};

/// How many ended call ids are kept to reject late updates
pub const ENDED_CALL_HISTORY: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Conference not found: {0}")]
    ConferenceNotFound(String),
    #[error("Call not found: {0}")]
    CallNotFound(String),
    #[error("Conference already exists: {0}")]
    DuplicateConference(String),
    #[error("Call already ended: {0}")]
    CallEnded(String),
}

#[derive(Debug, Default)]
pub struct CallRegistry {
    conferences: HashMap<String, ConferenceRecord>,
    calls: HashMap<String, CallHandle>,
    /// conference id -> (call id -> participant entry), written on join
    call_participants: HashMap<String, HashMap<String, String>>,
    ended_calls: VecDeque<String>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ============== Conferences ==============

    /// Create a conference. Duplicates in `initial_participants` are dropped,
    /// first occurrence wins.
    pub fn create_conference<I, S>(
        &mut self,
        conference_id: &str,
        initial_participants: I,
        moderator: Option<String>,
    ) -> Result<&ConferenceRecord, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.conferences.contains_key(conference_id) {
            return Err(RegistryError::DuplicateConference(conference_id.to_string()));
        }

        let mut record = ConferenceRecord::new(conference_id, moderator);
        for participant in initial_participants {
            record.insert_participant(participant.as_ref());
        }

        tracing::debug!(
            "Conference {} created with {} participant(s)",
            conference_id,
            record.participants.len()
        );

        Ok(self
            .conferences
            .entry(conference_id.to_string())
            .or_insert(record))
    }

    pub fn get_conference(&self, conference_id: &str) -> Option<&ConferenceRecord> {
        self.conferences.get(conference_id)
    }

    /// Returns `Ok(false)` when the address was already a participant
    pub fn add_participant(
        &mut self,
        conference_id: &str,
        address: &str,
    ) -> Result<bool, RegistryError> {
        let record = self
            .conferences
            .get_mut(conference_id)
            .ok_or_else(|| RegistryError::ConferenceNotFound(conference_id.to_string()))?;

        Ok(record.insert_participant(address))
    }

    /// Returns `Ok(false)` when the address was not a participant
    pub fn remove_participant(
        &mut self,
        conference_id: &str,
        address: &str,
    ) -> Result<bool, RegistryError> {
        let record = self
            .conferences
            .get_mut(conference_id)
            .ok_or_else(|| RegistryError::ConferenceNotFound(conference_id.to_string()))?;

        Ok(record.remove_participant(address))
    }

    /// Drop a conference. Ending an unknown conference is a no-op, since end
    /// notifications can arrive after local cleanup.
    pub fn end_conference(&mut self, conference_id: &str) -> Option<ConferenceRecord> {
        self.call_participants.remove(conference_id);
        let removed = self.conferences.remove(conference_id);
        if removed.is_some() {
            tracing::debug!("Conference {} ended", conference_id);
        }
        removed
    }

    /// Snapshot of all conferences, ordered by id
    pub fn list_conferences(&self) -> Vec<ConferenceRecord> {
        let mut conferences: Vec<ConferenceRecord> = self.conferences.values().cloned().collect();
        conferences.sort_by(|a, b| a.conference_id.cmp(&b.conference_id));
        conferences
    }

    // ============== Calls ==============

    /// Track a call, replacing any handle already stored under its id.
    /// Ids of ended calls are refused.
    pub fn register_call(
        &mut self,
        handle: CallHandle,
    ) -> Result<Option<CallHandle>, RegistryError> {
        if self.is_ended(&handle.call_id) {
            return Err(RegistryError::CallEnded(handle.call_id));
        }
        Ok(self.calls.insert(handle.call_id.clone(), handle))
    }

    /// Track a call we just placed. Status notifications may already have
    /// created the entry; it keeps its state and becomes outbound to `to`.
    /// Returns the call's current state.
    pub fn register_outbound(
        &mut self,
        call_id: &str,
        to: &str,
    ) -> Result<CallState, RegistryError> {
        if self.is_ended(call_id) {
            return Err(RegistryError::CallEnded(call_id.to_string()));
        }

        let call = self.calls.entry(call_id.to_string()).or_insert_with(|| {
            CallHandle::new(call_id, CallDirection::Outbound).with_state(CallState::Calling)
        });
        call.direction = CallDirection::Outbound;
        call.remote_address = Some(to.to_string());
        if call.state == CallState::Idle {
            call.state = CallState::Calling;
        }
        Ok(call.state)
    }

    pub fn get_call(&self, call_id: &str) -> Option<&CallHandle> {
        self.calls.get(call_id)
    }

    /// Forget a call for good; its id is never tracked again
    pub fn remove_call(&mut self, call_id: &str) -> Option<CallHandle> {
        self.mark_ended(call_id);
        self.calls.remove(call_id)
    }

    pub fn is_ended(&self, call_id: &str) -> bool {
        self.ended_calls.iter().any(|id| id == call_id)
    }

    pub fn set_call_state(&mut self, call_id: &str, state: CallState) -> Result<(), RegistryError> {
        let call = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| RegistryError::CallNotFound(call_id.to_string()))?;
        call.state = state;
        Ok(())
    }

    /// Record a mute command. Optimistic: no platform confirmation needed.
    pub fn set_muted(&mut self, call_id: &str, muted: bool) -> Result<(), RegistryError> {
        let call = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| RegistryError::CallNotFound(call_id.to_string()))?;
        call.muted = muted;
        Ok(())
    }

    /// Snapshot of all calls, ordered by id
    pub fn list_calls(&self) -> Vec<CallHandle> {
        let mut calls: Vec<CallHandle> = self.calls.values().cloned().collect();
        calls.sort_by(|a, b| a.call_id.cmp(&b.call_id));
        calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn conference_count(&self) -> usize {
        self.conferences.len()
    }

    /// Forget everything. Used on shutdown.
    pub fn clear(&mut self) {
        self.calls.clear();
        self.conferences.clear();
        self.call_participants.clear();
        self.ended_calls.clear();
    }

    fn mark_ended(&mut self, call_id: &str) {
        if self.is_ended(call_id) {
            return;
        }
        if self.ended_calls.len() == ENDED_CALL_HISTORY {
            self.ended_calls.pop_front();
        }
        self.ended_calls.push_back(call_id.to_string());
    }

    fn update_from_status(&mut self, event: &CallStatusNotification, state: CallState) {
        if self.is_ended(&event.call_id) {
            tracing::debug!("Ignoring status for ended call {}", event.call_id);
            return;
        }

        match self.calls.get_mut(&event.call_id) {
            Some(call) => {
                call.state = state;
                if call.remote_address.is_none() {
                    call.remote_address = event.from.clone();
                }
            }
            None => {
                // First we hear of it, so the platform is calling us
                let mut handle = CallHandle::new(event.call_id.clone(), CallDirection::Inbound)
                    .with_state(state);
                handle.remote_address = event.from.clone();
                self.calls.insert(event.call_id.clone(), handle);
            }
        }
    }

    fn disconnect(&mut self, event: &CallStatusNotification, reason: &str) {
        if self.remove_call(&event.call_id).is_some() {
            tracing::info!("Call {} removed ({})", event.call_id, reason);
        }
    }

    /// Participants are tracked by address when we know the call, by call id
    /// otherwise
    fn participant_key(&self, call_id: &str) -> String {
        self.calls
            .get(call_id)
            .and_then(|c| c.remote_address.clone())
            .unwrap_or_else(|| call_id.to_string())
    }
}

impl PlatformEvents for CallRegistry {
    fn on_initiated(&mut self, event: &CallStatusNotification) {
        self.update_from_status(event, CallState::Calling);
    }

    fn on_ringing(&mut self, event: &CallStatusNotification) {
        self.update_from_status(event, CallState::Ringing);
    }

    fn on_answered(&mut self, event: &CallStatusNotification) {
        self.update_from_status(event, CallState::Active);
    }

    fn on_completed(&mut self, event: &CallStatusNotification) {
        self.disconnect(event, "completed");
    }

    fn on_failed(&mut self, event: &CallStatusNotification) {
        self.disconnect(event, "failed");
    }

    fn on_busy(&mut self, event: &CallStatusNotification) {
        self.disconnect(event, "busy");
    }

    fn on_no_answer(&mut self, event: &CallStatusNotification) {
        self.disconnect(event, "no answer");
    }

    fn on_conference_start(&mut self, event: &ConferenceNotification) {
        // Already created locally when the moderator's markup was rendered
        let _ = self.create_conference(&event.conference_name, Vec::<String>::new(), None);
    }

    fn on_conference_end(&mut self, event: &ConferenceNotification) {
        self.end_conference(&event.conference_name);
    }

    fn on_participant_join(&mut self, event: &ConferenceNotification) {
        let Some(call_id) = event.call_id.as_deref() else {
            return;
        };
        let participant = self.participant_key(call_id);

        if let Err(RegistryError::ConferenceNotFound(_)) =
            self.add_participant(&event.conference_name, &participant)
        {
            let _ = self.create_conference(&event.conference_name, [participant.as_str()], None);
        }

        self.call_participants
            .entry(event.conference_name.clone())
            .or_default()
            .insert(call_id.to_string(), participant);
    }

    fn on_participant_leave(&mut self, event: &ConferenceNotification) {
        let Some(call_id) = event.call_id.as_deref() else {
            return;
        };
        // The call itself may already be gone, so prefer what the join recorded
        let recorded = self
            .call_participants
            .get_mut(&event.conference_name)
            .and_then(|joined| joined.remove(call_id));
        let participant = recorded.unwrap_or_else(|| self.participant_key(call_id));

        if let Err(e) = self.remove_participant(&event.conference_name, &participant) {
            tracing::debug!("Ignoring participant-leave: {}", e);
        }
    }

    fn on_participant_mute(&mut self, event: &ConferenceNotification) {
        if let Some(call_id) = event.call_id.as_deref() {
            if let Err(e) = self.set_muted(call_id, true) {
                tracing::debug!("Ignoring participant-mute: {}", e);
            }
        }
    }

    fn on_participant_unmute(&mut self, event: &ConferenceNotification) {
        if let Some(call_id) = event.call_id.as_deref() {
            if let Err(e) = self.set_muted(call_id, false) {
                tracing::debug!("Ignoring participant-unmute: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::events::{
        dispatch_call_status, dispatch_conference, CallLifecycle, ConferenceEvent,
    };

    fn status(call_id: &str, from: Option<&str>) -> CallStatusNotification {
        CallStatusNotification {
            call_id: call_id.to_string(),
            from: from.map(str::to_string),
            to: None,
        }
    }

    fn call_event(registry: &mut CallRegistry, lifecycle: CallLifecycle, call_id: &str) {
        dispatch_call_status(registry, lifecycle, &status(call_id, Some("whatsapp:+15550001")));
    }

    fn room_event(registry: &mut CallRegistry, kind: ConferenceEvent, call_id: Option<&str>) {
        let event = ConferenceNotification {
            conference_name: "room42".to_string(),
            call_id: call_id.map(str::to_string),
        };
        dispatch_conference(registry, kind, &event);
    }

    fn participants(registry: &CallRegistry, conference_id: &str) -> Vec<String> {
        registry.get_conference(conference_id).unwrap().participants.clone()
    }

    #[test]
    fn test_create_conference() {
        let mut registry = CallRegistry::new();
        let record = registry
            .create_conference("c1", ["+15550001", "+15550002"], Some("+15550001".to_string()))
            .unwrap();

        assert_eq!(record.participants, vec!["+15550001", "+15550002"]);
        assert_eq!(record.moderator.as_deref(), Some("+15550001"));
        assert_eq!(registry.conference_count(), 1);
    }

    #[test]
    fn test_create_conference_dedupes_initial_participants() {
        let mut registry = CallRegistry::new();
        let record = registry
            .create_conference("c1", ["a", "b", "a"], None)
            .unwrap();
        assert_eq!(record.participants, vec!["a", "b"]);
    }

    #[test]
    fn test_create_duplicate_conference_fails() {
        let mut registry = CallRegistry::new();
        registry.create_conference("c1", ["+15550001"], None).unwrap();
        let created_at = registry.get_conference("c1").unwrap().created_at;

        let result = registry.create_conference("c1", ["+15550002"], None);
        assert_eq!(result.unwrap_err(), RegistryError::DuplicateConference("c1".to_string()));

        // Original record untouched
        let record = registry.get_conference("c1").unwrap();
        assert_eq!(record.participants, vec!["+15550001"]);
        assert_eq!(record.created_at, created_at);
    }

    #[test]
    fn test_add_participant_is_idempotent() {
        let mut registry = CallRegistry::new();
        registry.create_conference("c1", ["+15550001"], None).unwrap();

        assert_eq!(registry.add_participant("c1", "+15550001"), Ok(false));
        assert_eq!(participants(&registry, "c1").len(), 1);

        assert_eq!(registry.add_participant("c1", "+15550002"), Ok(true));
        assert_eq!(participants(&registry, "c1").len(), 2);
    }

    #[test]
    fn test_add_participant_unknown_conference() {
        let mut registry = CallRegistry::new();
        assert_eq!(
            registry.add_participant("nope", "+15550001"),
            Err(RegistryError::ConferenceNotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_remove_absent_participant_is_noop() {
        let mut registry = CallRegistry::new();
        registry.create_conference("c1", ["+15550001"], None).unwrap();

        assert_eq!(registry.remove_participant("c1", "+19999999999"), Ok(false));
        assert_eq!(participants(&registry, "c1"), vec!["+15550001"]);

        assert_eq!(
            registry.remove_participant("nope", "+15550001"),
            Err(RegistryError::ConferenceNotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_empty_conference_survives() {
        let mut registry = CallRegistry::new();
        registry.create_conference("c1", ["+15550001"], None).unwrap();
        registry.remove_participant("c1", "+15550001").unwrap();

        assert!(participants(&registry, "c1").is_empty());
    }

    #[test]
    fn test_end_conference_twice() {
        let mut registry = CallRegistry::new();
        registry.create_conference("c1", ["+15550001"], None).unwrap();

        assert!(registry.end_conference("c1").is_some());
        assert!(registry.end_conference("c1").is_none());
        assert!(registry.get_conference("c1").is_none());
    }

    #[test]
    fn test_call_crud() {
        let mut registry = CallRegistry::new();
        assert!(registry.get_call("CA1").is_none());

        let handle = CallHandle::new("CA1", CallDirection::Outbound).with_state(CallState::Calling);
        assert_eq!(registry.register_call(handle), Ok(None));
        assert_eq!(registry.get_call("CA1").unwrap().state, CallState::Calling);

        registry.set_call_state("CA1", CallState::Active).unwrap();
        registry.set_muted("CA1", true).unwrap();
        let call = registry.get_call("CA1").unwrap();
        assert_eq!(call.state, CallState::Active);
        assert!(call.muted);

        assert!(registry.remove_call("CA1").is_some());
        assert!(registry.remove_call("CA1").is_none());
        assert_eq!(
            registry.set_muted("CA1", false),
            Err(RegistryError::CallNotFound("CA1".to_string()))
        );
    }

    #[test]
    fn test_removed_call_id_is_not_reused() {
        let mut registry = CallRegistry::new();
        registry.register_call(CallHandle::new("CA1", CallDirection::Inbound)).unwrap();
        registry.remove_call("CA1");

        assert!(registry.is_ended("CA1"));
        assert_eq!(
            registry.register_call(CallHandle::new("CA1", CallDirection::Inbound)),
            Err(RegistryError::CallEnded("CA1".to_string()))
        );
        assert_eq!(registry.call_count(), 0);
    }

    #[test]
    fn test_ended_call_history_is_bounded() {
        let mut registry = CallRegistry::new();
        for i in 0..=ENDED_CALL_HISTORY {
            registry.remove_call(&format!("CA{}", i));
        }

        assert!(!registry.is_ended("CA0"));
        assert!(registry.is_ended("CA1"));
        assert!(registry.is_ended(&format!("CA{}", ENDED_CALL_HISTORY)));
    }

    #[test]
    fn test_list_snapshots_are_sorted() {
        let mut registry = CallRegistry::new();
        registry.create_conference("b", Vec::<String>::new(), None).unwrap();
        registry.create_conference("a", Vec::<String>::new(), None).unwrap();
        registry.register_call(CallHandle::new("CA2", CallDirection::Inbound)).unwrap();
        registry.register_call(CallHandle::new("CA1", CallDirection::Inbound)).unwrap();

        let ids: Vec<_> = registry
            .list_conferences()
            .into_iter()
            .map(|c| c.conference_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        let ids: Vec<_> = registry.list_calls().into_iter().map(|c| c.call_id).collect();
        assert_eq!(ids, vec!["CA1", "CA2"]);

        registry.clear();
        assert_eq!(registry.call_count(), 0);
        assert_eq!(registry.conference_count(), 0);
    }

    #[test]
    fn test_call_status_notifications() {
        let mut registry = CallRegistry::new();

        call_event(&mut registry, CallLifecycle::Ringing, "CA1");
        let call = registry.get_call("CA1").unwrap();
        assert_eq!(call.state, CallState::Ringing);
        assert_eq!(call.direction, CallDirection::Inbound);
        assert_eq!(call.remote_address.as_deref(), Some("whatsapp:+15550001"));

        call_event(&mut registry, CallLifecycle::Answered, "CA1");
        assert_eq!(registry.get_call("CA1").unwrap().state, CallState::Active);

        call_event(&mut registry, CallLifecycle::Completed, "CA1");
        assert!(registry.get_call("CA1").is_none());

        // Late notifications for a call we already dropped
        call_event(&mut registry, CallLifecycle::Failed, "CA1");
        call_event(&mut registry, CallLifecycle::Ringing, "CA1");
        assert_eq!(registry.call_count(), 0);
    }

    #[test]
    fn test_status_keeps_outbound_direction() {
        let mut registry = CallRegistry::new();
        registry.register_outbound("CA1", "whatsapp:+15550009999").unwrap();

        let from = Some("whatsapp:+15550000000");
        dispatch_call_status(&mut registry, CallLifecycle::Ringing, &status("CA1", from));
        let call = registry.get_call("CA1").unwrap();
        assert_eq!(call.state, CallState::Ringing);
        assert_eq!(call.direction, CallDirection::Outbound);
        assert_eq!(call.remote_address.as_deref(), Some("whatsapp:+15550009999"));
    }

    #[test]
    fn test_register_outbound_after_early_status() {
        let mut registry = CallRegistry::new();
        let from = Some("whatsapp:+15550000000");
        dispatch_call_status(&mut registry, CallLifecycle::Ringing, &status("CA1", from));

        let state = registry.register_outbound("CA1", "whatsapp:+15550009999").unwrap();

        assert_eq!(state, CallState::Ringing);
        let call = registry.get_call("CA1").unwrap();
        assert_eq!(call.direction, CallDirection::Outbound);
        assert_eq!(call.remote_address.as_deref(), Some("whatsapp:+15550009999"));
    }

    #[test]
    fn test_register_outbound_after_terminal_status() {
        let mut registry = CallRegistry::new();
        call_event(&mut registry, CallLifecycle::Initiated, "CA1");
        call_event(&mut registry, CallLifecycle::Failed, "CA1");

        assert_eq!(
            registry.register_outbound("CA1", "whatsapp:+15550009999"),
            Err(RegistryError::CallEnded("CA1".to_string()))
        );
        assert!(registry.get_call("CA1").is_none());
    }

    #[test]
    fn test_conference_notifications() {
        let mut registry = CallRegistry::new();
        registry
            .register_call(
                CallHandle::new("CA1", CallDirection::Inbound)
                    .with_remote_address("whatsapp:+15550001"),
            )
            .unwrap();

        room_event(&mut registry, ConferenceEvent::Start, None);
        assert!(registry.get_conference("room42").is_some());

        room_event(&mut registry, ConferenceEvent::ParticipantJoin, Some("CA1"));
        room_event(&mut registry, ConferenceEvent::ParticipantJoin, Some("CA2"));
        assert_eq!(participants(&registry, "room42"), vec!["whatsapp:+15550001", "CA2"]);

        room_event(&mut registry, ConferenceEvent::ParticipantMute, Some("CA1"));
        assert!(registry.get_call("CA1").unwrap().muted);
        room_event(&mut registry, ConferenceEvent::ParticipantUnmute, Some("CA1"));
        assert!(!registry.get_call("CA1").unwrap().muted);

        // Mute for a call we never tracked changes nothing
        room_event(&mut registry, ConferenceEvent::ParticipantMute, Some("CA2"));
        assert!(registry.get_call("CA2").is_none());

        room_event(&mut registry, ConferenceEvent::ParticipantLeave, Some("CA2"));
        assert_eq!(participants(&registry, "room42"), vec!["whatsapp:+15550001"]);

        room_event(&mut registry, ConferenceEvent::End, None);
        room_event(&mut registry, ConferenceEvent::End, None);
        assert!(registry.get_conference("room42").is_none());
    }

    #[test]
    fn test_leave_after_call_completed() {
        let mut registry = CallRegistry::new();
        call_event(&mut registry, CallLifecycle::Ringing, "CA1");
        room_event(&mut registry, ConferenceEvent::Start, None);
        room_event(&mut registry, ConferenceEvent::ParticipantJoin, Some("CA1"));
        assert_eq!(participants(&registry, "room42"), vec!["whatsapp:+15550001"]);

        call_event(&mut registry, CallLifecycle::Completed, "CA1");
        room_event(&mut registry, ConferenceEvent::ParticipantLeave, Some("CA1"));

        assert!(participants(&registry, "room42").is_empty());
    }

    #[test]
    fn test_leave_before_call_completed() {
        let mut registry = CallRegistry::new();
        call_event(&mut registry, CallLifecycle::Ringing, "CA1");
        room_event(&mut registry, ConferenceEvent::ParticipantJoin, Some("CA1"));

        room_event(&mut registry, ConferenceEvent::ParticipantLeave, Some("CA1"));
        call_event(&mut registry, CallLifecycle::Completed, "CA1");

        assert!(participants(&registry, "room42").is_empty());
        assert_eq!(registry.call_count(), 0);
    }

    #[test]
    fn test_join_creates_missing_conference() {
        let mut registry = CallRegistry::new();
        room_event(&mut registry, ConferenceEvent::ParticipantJoin, Some("CA9"));

        assert_eq!(participants(&registry, "room42"), vec!["CA9"]);
    }
}
