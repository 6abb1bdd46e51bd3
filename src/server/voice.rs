//! Platform webhooks
//!
//! Markup endpoints answer with a call-control document; event endpoints
//! update the registry and answer with a JSON acknowledgement.

use axum::{
    extract::{Query, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::events::{
    dispatch_call_status, dispatch_conference, CallLifecycle, CallStatusForm, ConferenceEvent,
    ConferenceEventForm,
};
use super::twiml;
use super::{AppError, AppState, Markup};
use crate::address;
use crate::models::{CallDirection, CallHandle, CallState};

const REJECTED_CALL_MESSAGE: &str = "Sorry, this call cannot be connected.";

#[derive(Debug, Serialize, PartialEq)]
pub struct Ack {
    pub received: bool,
}

const ACK: Ack = Ack { received: true };

#[derive(Debug, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

/// Inbound WhatsApp call: greet and bridge to the agent's softphone
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Form(form): Form<IncomingCallForm>,
) -> Result<Markup, AppError> {
    tracing::info!("Incoming call {} from {}", form.call_sid, form.from);

    let caller = match address::validate_address(&form.from) {
        Ok(caller) => caller,
        Err(e) => {
            tracing::warn!("Rejecting call {}: {}", form.call_sid, e);
            return Ok(Markup(twiml::render_hangup(Some(REJECTED_CALL_MESSAGE))?));
        }
    };

    let mut params = BTreeMap::new();
    params.insert("callSid".to_string(), form.call_sid.clone());
    params.insert("from".to_string(), caller.clone());
    if let Some(to) = &form.to {
        params.insert("to".to_string(), to.clone());
    }

    let markup = twiml::render_answer_and_bridge(&caller, &state.config.agent_identity, &params)?;

    let handle = CallHandle::new(form.call_sid, CallDirection::Inbound)
        .with_state(CallState::Ringing)
        .with_remote_address(caller);
    if let Err(e) = state.registry.write().await.register_call(handle) {
        tracing::debug!("Not tracking incoming call: {}", e);
    }

    Ok(Markup(markup))
}

#[derive(Debug, Deserialize)]
pub struct OutboundAnsweredForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

/// Outbound call picked up by the WhatsApp user: bridge to the agent.
/// Custom parameters from the dial request arrive on the query string.
pub async fn outbound_answered(
    State(state): State<Arc<AppState>>,
    Query(mut params): Query<BTreeMap<String, String>>,
    Form(form): Form<OutboundAnsweredForm>,
) -> Result<Markup, AppError> {
    tracing::info!("Outbound call {} answered", form.call_sid);

    params.insert("callSid".to_string(), form.call_sid.clone());
    let callee = form.to.as_deref().map(address::normalize_address).unwrap_or_default();

    let markup = twiml::render_answer_and_bridge(&callee, &state.config.agent_identity, &params)?;

    if let Err(e) = state
        .registry
        .write()
        .await
        .set_call_state(&form.call_sid, CallState::Active)
    {
        tracing::debug!("Outbound answer for untracked call: {}", e);
    }

    Ok(Markup(markup))
}

#[derive(Debug, Deserialize)]
pub struct ConferenceForm {
    #[serde(rename = "ConferenceName")]
    pub conference_name: String,
    #[serde(rename = "Moderator", default)]
    pub moderator: bool,
    #[serde(rename = "Muted")]
    pub muted: Option<bool>,
    #[serde(rename = "WaitUrl")]
    pub wait_url: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

/// Put the caller into a conference room.
///
/// Moderators start the room, and the registry record is created for them if
/// it does not exist yet. A `Muted` flag means a plain join.
pub async fn conference(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ConferenceForm>,
) -> Result<Markup, AppError> {
    let callback = state.config.callback_url("/voice/conference/events");
    let name = form.conference_name.trim();

    let wait_url = form.wait_url.as_deref().or(state.config.hold_music_url.as_deref());

    let markup = if form.moderator {
        let markup = twiml::render_conference_create(name, true, wait_url, Some(&callback))?;

        let mut registry = state.registry.write().await;
        if registry.get_conference(name).is_none() {
            let moderator = form.from.as_deref().map(address::normalize_address);
            registry.create_conference(name, Vec::<String>::new(), moderator)?;
            tracing::info!("Conference {} opened by moderator", name);
        }
        markup
    } else if let Some(muted) = form.muted {
        twiml::render_conference_join(name, muted, Some(&callback))?
    } else {
        twiml::render_conference_create(name, false, wait_url, Some(&callback))?
    };

    Ok(Markup(markup))
}

#[derive(Debug, Default, Deserialize)]
pub struct VoicemailQuery {
    pub greeting: Option<String>,
    #[serde(rename = "maxLength")]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub transcribe: bool,
}

pub async fn voicemail(Query(query): Query<VoicemailQuery>) -> Result<Markup, AppError> {
    Ok(Markup(twiml::render_voicemail_prompt(
        query.greeting.as_deref(),
        query.max_length,
        query.transcribe,
    )?))
}

pub async fn ivr_menu(State(state): State<Arc<AppState>>) -> Result<Markup, AppError> {
    let action = state.config.callback_url("/voice/ivr/selection");
    Ok(Markup(twiml::render_ivr_menu(&state.config.menu, None, Some(&action))?))
}

#[derive(Debug, Deserialize)]
pub struct GatherForm {
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
}

pub async fn ivr_selection(
    State(state): State<Arc<AppState>>,
    Form(form): Form<GatherForm>,
) -> Result<Markup, AppError> {
    let voicemail_url = state.config.callback_url("/voice/voicemail");
    Ok(Markup(twiml::render_ivr_selection(
        &state.config.menu,
        form.digits.as_deref(),
        &voicemail_url,
    )?))
}

/// Call progress callback
pub async fn call_status(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallStatusForm>,
) -> Json<Ack> {
    tracing::info!("Call {} status: {}", form.call_sid, form.call_status);

    match CallLifecycle::parse(&form.call_status) {
        Some(status) => {
            let mut registry = state.registry.write().await;
            dispatch_call_status(&mut *registry, status, &form.notification());
        }
        None => tracing::warn!("Ignoring unknown call status {:?}", form.call_status),
    }

    Json(ACK)
}

/// Conference status callback
pub async fn conference_events(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ConferenceEventForm>,
) -> Json<Ack> {
    tracing::info!(
        "Conference {} event: {}",
        form.friendly_name,
        form.status_callback_event
    );

    match ConferenceEvent::parse(&form.status_callback_event) {
        Some(event) => {
            let mut registry = state.registry.write().await;
            dispatch_conference(&mut *registry, event, &form.notification());
        }
        None => tracing::warn!(
            "Ignoring unknown conference event {:?}",
            form.status_callback_event
        ),
    }

    Json(ACK)
}
