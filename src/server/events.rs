//! Platform notifications
//!
//! Status callbacks arrive as form posts with free-form event strings. They
//! are parsed into fixed payload structs here and delivered to a
//! [`PlatformEvents`] handler, one method per event type. Delivery is
//! synchronous: the dispatch function returns once the handler has run.

use serde::Deserialize;

/// Call lifecycle reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLifecycle {
    Initiated,
    Ringing,
    Answered,
    Completed,
    Failed,
    Busy,
    NoAnswer,
}

impl CallLifecycle {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "initiated" | "queued" => Some(CallLifecycle::Initiated),
            "ringing" => Some(CallLifecycle::Ringing),
            "answered" | "in-progress" => Some(CallLifecycle::Answered),
            "completed" => Some(CallLifecycle::Completed),
            "failed" | "canceled" => Some(CallLifecycle::Failed),
            "busy" => Some(CallLifecycle::Busy),
            "no-answer" => Some(CallLifecycle::NoAnswer),
            _ => None,
        }
    }
}

/// Conference events reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferenceEvent {
    Start,
    End,
    ParticipantJoin,
    ParticipantLeave,
    ParticipantMute,
    ParticipantUnmute,
}

impl ConferenceEvent {
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            "conference-start" | "start" => Some(ConferenceEvent::Start),
            "conference-end" | "end" => Some(ConferenceEvent::End),
            "participant-join" | "join" => Some(ConferenceEvent::ParticipantJoin),
            "participant-leave" | "leave" => Some(ConferenceEvent::ParticipantLeave),
            "participant-mute" => Some(ConferenceEvent::ParticipantMute),
            "participant-unmute" => Some(ConferenceEvent::ParticipantUnmute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallStatusNotification {
    pub call_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceNotification {
    pub conference_name: String,
    pub call_id: Option<String>,
}

/// Receiver of platform notifications. Every method defaults to a no-op so a
/// handler only implements the events it cares about.
pub trait PlatformEvents {
    fn on_initiated(&mut self, _event: &CallStatusNotification) {}
    fn on_ringing(&mut self, _event: &CallStatusNotification) {}
    fn on_answered(&mut self, _event: &CallStatusNotification) {}
    fn on_completed(&mut self, _event: &CallStatusNotification) {}
    fn on_failed(&mut self, _event: &CallStatusNotification) {}
    fn on_busy(&mut self, _event: &CallStatusNotification) {}
    fn on_no_answer(&mut self, _event: &CallStatusNotification) {}

    fn on_conference_start(&mut self, _event: &ConferenceNotification) {}
    fn on_conference_end(&mut self, _event: &ConferenceNotification) {}
    fn on_participant_join(&mut self, _event: &ConferenceNotification) {}
    fn on_participant_leave(&mut self, _event: &ConferenceNotification) {}
    fn on_participant_mute(&mut self, _event: &ConferenceNotification) {}
    fn on_participant_unmute(&mut self, _event: &ConferenceNotification) {}
}

pub fn dispatch_call_status<H: PlatformEvents + ?Sized>(
    handler: &mut H,
    status: CallLifecycle,
    event: &CallStatusNotification,
) {
    match status {
        CallLifecycle::Initiated => handler.on_initiated(event),
        CallLifecycle::Ringing => handler.on_ringing(event),
        CallLifecycle::Answered => handler.on_answered(event),
        CallLifecycle::Completed => handler.on_completed(event),
        CallLifecycle::Failed => handler.on_failed(event),
        CallLifecycle::Busy => handler.on_busy(event),
        CallLifecycle::NoAnswer => handler.on_no_answer(event),
    }
}

pub fn dispatch_conference<H: PlatformEvents + ?Sized>(
    handler: &mut H,
    kind: ConferenceEvent,
    event: &ConferenceNotification,
) {
    match kind {
        ConferenceEvent::Start => handler.on_conference_start(event),
        ConferenceEvent::End => handler.on_conference_end(event),
        ConferenceEvent::ParticipantJoin => handler.on_participant_join(event),
        ConferenceEvent::ParticipantLeave => handler.on_participant_leave(event),
        ConferenceEvent::ParticipantMute => handler.on_participant_mute(event),
        ConferenceEvent::ParticipantUnmute => handler.on_participant_unmute(event),
    }
}

// Webhook form payloads

#[derive(Debug, Clone, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

impl CallStatusForm {
    pub fn notification(&self) -> CallStatusNotification {
        CallStatusNotification {
            call_id: self.call_sid.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConferenceEventForm {
    #[serde(rename = "StatusCallbackEvent")]
    pub status_callback_event: String,
    #[serde(rename = "FriendlyName")]
    pub friendly_name: String,
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
}

impl ConferenceEventForm {
    pub fn notification(&self) -> ConferenceNotification {
        ConferenceNotification {
            conference_name: self.friendly_name.clone(),
            call_id: self.call_sid.clone(),
        }
    }
}
