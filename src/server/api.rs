//! REST API for placing calls and managing conferences

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{AppError, AppState};
use crate::address;
use crate::models::*;

// ============== Call Routes ==============

/// Place an outbound WhatsApp call from the business number
pub async fn dial_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DialRequest>,
) -> Result<Json<DialResponse>, AppError> {
    let to = address::validate_address(&req.to)?;

    let call_id = state
        .platform
        .create_call(
            &state.config.business_number,
            &to,
            &state.config.callback_url("/voice/outbound"),
            &req.parameters,
        )
        .await?;

    tracing::info!("Call initiated: {} -> {}", call_id, to);

    // Status callbacks may have been processed while create_call was in flight
    let status = match state.registry.write().await.register_outbound(&call_id, &to) {
        Ok(status) => status,
        Err(e) => {
            tracing::info!("Dialed call finished before it was tracked: {}", e);
            CallState::Disconnected
        }
    };

    Ok(Json(DialResponse {
        call_id,
        to,
        status,
    }))
}

pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<CallHandle>> {
    Json(state.registry.read().await.list_calls())
}

pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CallHandle>, AppError> {
    state
        .registry
        .read()
        .await
        .get_call(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Call not found: {}", id)))
}

/// Ask the platform to end the call, then forget it
pub async fn hangup_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.registry.read().await.get_call(&id).is_none() {
        return Err(AppError::NotFound(format!("Call not found: {}", id)));
    }

    state.platform.hangup(&id).await?;

    state.registry.write().await.remove_call(&id);
    tracing::info!("Call hung up: {}", id);

    Ok(StatusCode::OK)
}

/// Record a mute command for the call
pub async fn mute_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MuteRequest>,
) -> Result<Json<CallHandle>, AppError> {
    let mut registry = state.registry.write().await;
    registry.set_muted(&id, req.muted)?;

    registry
        .get_call(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Call not found: {}", id)))
}

// ============== Conference Routes ==============

pub async fn list_conferences(State(state): State<Arc<AppState>>) -> Json<Vec<ConferenceRecord>> {
    Json(state.registry.read().await.list_conferences())
}

pub async fn create_conference(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConferenceRequest>,
) -> Result<(StatusCode, Json<ConferenceRecord>), AppError> {
    let conference_id = match req.conference_id.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("Conference id must not be empty".to_string())),
        Some(id) => id.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };

    let participants = req
        .participants
        .iter()
        .map(|p| address::validate_address(p))
        .collect::<Result<Vec<_>, _>>()?;
    let moderator = req
        .moderator
        .as_deref()
        .map(address::validate_address)
        .transpose()?;

    let mut registry = state.registry.write().await;
    let record = registry
        .create_conference(&conference_id, &participants, moderator)?
        .clone();

    tracing::info!("Conference created: {}", record.conference_id);
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_conference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConferenceRecord>, AppError> {
    state
        .registry
        .read()
        .await
        .get_conference(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Conference not found: {}", id)))
}

/// Idempotent: ending an unknown conference still succeeds
pub async fn end_conference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.registry.write().await.end_conference(&id).is_some() {
        tracing::info!("Conference ended: {}", id);
    }
    StatusCode::NO_CONTENT
}

pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Result<Json<ConferenceRecord>, AppError> {
    let participant = address::validate_address(&req.address)?;

    let mut registry = state.registry.write().await;
    registry.add_participant(&id, &participant)?;
    conference_snapshot(&registry, &id)
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    Path((id, participant)): Path<(String, String)>,
) -> Result<Json<ConferenceRecord>, AppError> {
    let participant = address::normalize_address(&participant);

    let mut registry = state.registry.write().await;
    registry.remove_participant(&id, &participant)?;
    conference_snapshot(&registry, &id)
}

fn conference_snapshot(
    registry: &super::registry::CallRegistry,
    id: &str,
) -> Result<Json<ConferenceRecord>, AppError> {
    registry
        .get_conference(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Conference not found: {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::events::{dispatch_call_status, CallLifecycle, CallStatusNotification};
    use crate::server::testing::{test_state, FakePlatform};
    use std::collections::BTreeMap;

    async fn early_status(state: &AppState, lifecycle: CallLifecycle) {
        let event = CallStatusNotification {
            call_id: "CA1".to_string(),
            from: Some("whatsapp:+15550000000".to_string()),
            to: Some("whatsapp:+15551234567".to_string()),
        };
        dispatch_call_status(&mut *state.registry.write().await, lifecycle, &event);
    }

    fn dial_request(to: &str) -> Json<DialRequest> {
        let mut parameters = BTreeMap::new();
        parameters.insert("ticket".to_string(), "42".to_string());
        Json(DialRequest {
            to: to.to_string(),
            parameters,
        })
    }

    #[tokio::test]
    async fn test_dial_call_registers_outbound_call() {
        let (state, platform) = test_state(FakePlatform::default());

        let Json(response) = dial_call(State(state.clone()), dial_request("+15551234567"))
            .await
            .unwrap();

        assert_eq!(response.call_id, "CA1");
        assert_eq!(response.to, "whatsapp:+15551234567");
        assert_eq!(response.status, CallState::Calling);

        let created = platform.created.lock().unwrap().clone();
        assert_eq!(
            created,
            vec![(
                "whatsapp:+15550000000".to_string(),
                "whatsapp:+15551234567".to_string(),
                "https://voice.example.com/voice/outbound?ticket=42".to_string(),
            )]
        );

        let registry = state.registry.read().await;
        let call = registry.get_call("CA1").unwrap();
        assert_eq!(call.direction, CallDirection::Outbound);
        assert_eq!(call.state, CallState::Calling);
    }

    #[tokio::test]
    async fn test_dial_call_rejects_invalid_address() {
        let (state, platform) = test_state(FakePlatform::default());

        let result = dial_call(State(state.clone()), dial_request("call me maybe")).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(platform.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dial_call_surfaces_upstream_error() {
        let (state, _) = test_state(FakePlatform::failing());

        let result = dial_call(State(state.clone()), dial_request("+15551234567")).await;

        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(state.registry.read().await.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dial_call_after_early_ringing() {
        let (state, _) = test_state(FakePlatform::default());
        early_status(&state, CallLifecycle::Ringing).await;

        let Json(response) = dial_call(State(state.clone()), dial_request("+15551234567"))
            .await
            .unwrap();

        assert_eq!(response.status, CallState::Ringing);
        let registry = state.registry.read().await;
        let call = registry.get_call("CA1").unwrap();
        assert_eq!(call.state, CallState::Ringing);
        assert_eq!(call.direction, CallDirection::Outbound);
        assert_eq!(call.remote_address.as_deref(), Some("whatsapp:+15551234567"));
    }

    #[tokio::test]
    async fn test_dial_call_after_early_failure() {
        let (state, _) = test_state(FakePlatform::default());
        early_status(&state, CallLifecycle::Initiated).await;
        early_status(&state, CallLifecycle::Failed).await;

        let Json(response) = dial_call(State(state.clone()), dial_request("+15551234567"))
            .await
            .unwrap();

        assert_eq!(response.call_id, "CA1");
        assert_eq!(response.status, CallState::Disconnected);
        assert!(state.registry.read().await.get_call("CA1").is_none());
    }

    #[tokio::test]
    async fn test_get_call_not_found() {
        let (state, _) = test_state(FakePlatform::default());
        let result = get_call(State(state), Path("CA404".to_string())).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_hangup_call() {
        let (state, platform) = test_state(FakePlatform::default());
        dial_call(State(state.clone()), dial_request("+15551234567")).await.unwrap();

        let status = hangup_call(State(state.clone()), Path("CA1".to_string())).await.unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*platform.hung_up.lock().unwrap(), vec!["CA1".to_string()]);
        assert!(state.registry.read().await.get_call("CA1").is_none());

        let again = hangup_call(State(state.clone()), Path("CA1".to_string())).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mute_call() {
        let (state, _) = test_state(FakePlatform::default());
        dial_call(State(state.clone()), dial_request("+15551234567")).await.unwrap();

        let Json(call) = mute_call(
            State(state.clone()),
            Path("CA1".to_string()),
            Json(MuteRequest { muted: true }),
        )
        .await
        .unwrap();
        assert!(call.muted);

        let Json(calls) = list_calls(State(state.clone())).await;
        assert!(calls[0].muted);
    }

    fn create_request(id: Option<&str>, participants: &[&str]) -> Json<CreateConferenceRequest> {
        Json(CreateConferenceRequest {
            conference_id: id.map(str::to_string),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            moderator: None,
        })
    }

    #[tokio::test]
    async fn test_conference_crud() {
        let (state, _) = test_state(FakePlatform::default());

        let (status, Json(record)) = create_conference(
            State(state.clone()),
            create_request(Some("c1"), &["+15550001", "whatsapp:+15550001"]),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record.participants, vec!["whatsapp:+15550001"]);

        let duplicate =
            create_conference(State(state.clone()), create_request(Some("c1"), &[])).await;
        assert!(matches!(duplicate, Err(AppError::Duplicate(_))));

        let Json(record) = add_participant(
            State(state.clone()),
            Path("c1".to_string()),
            Json(ParticipantRequest { address: "+15550002".to_string() }),
        )
        .await
        .unwrap();
        assert_eq!(record.participants.len(), 2);

        let Json(record) = remove_participant(
            State(state.clone()),
            Path(("c1".to_string(), "+19999999999".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(record.participants.len(), 2);

        let Json(record) = remove_participant(
            State(state.clone()),
            Path(("c1".to_string(), "whatsapp:+15550001".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(record.participants, vec!["whatsapp:+15550002"]);

        assert_eq!(
            end_conference(State(state.clone()), Path("c1".to_string())).await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            end_conference(State(state.clone()), Path("c1".to_string())).await,
            StatusCode::NO_CONTENT
        );

        let missing = get_conference(State(state.clone()), Path("c1".to_string())).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_conference_generates_id() {
        let (state, _) = test_state(FakePlatform::default());

        let (_, Json(record)) = create_conference(State(state.clone()), create_request(None, &[]))
            .await
            .unwrap();

        assert!(!record.conference_id.is_empty());
        let Json(all) = list_conferences(State(state.clone())).await;
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_create_conference_validation() {
        let (state, _) = test_state(FakePlatform::default());

        let empty_id =
            create_conference(State(state.clone()), create_request(Some(" "), &[])).await;
        assert!(matches!(empty_id, Err(AppError::Validation(_))));

        let bad_participant =
            create_conference(State(state.clone()), create_request(Some("c2"), &["nobody"])).await;
        assert!(matches!(bad_participant, Err(AppError::Validation(_))));
        assert_eq!(state.registry.read().await.conference_count(), 0);
    }

    #[tokio::test]
    async fn test_add_participant_unknown_conference() {
        let (state, _) = test_state(FakePlatform::default());

        let result = add_participant(
            State(state.clone()),
            Path("nope".to_string()),
            Json(ParticipantRequest { address: "+15550002".to_string() }),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
