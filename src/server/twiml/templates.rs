//! Ready-made documents for the webhook endpoints

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{
    ConferenceOptions, DialOptions, GatherOptions, RecordOptions, SayOptions, TwimlError,
    VoiceResponse,
};

pub const BRIDGE_GREETING: &str = "Connecting your WhatsApp call. Please hold.";
pub const VOICEMAIL_GREETING: &str = "Nobody is available to take your call. Please leave a message after the beep.";
pub const VOICEMAIL_THANK_YOU: &str = "Thank you for your message. Goodbye.";
pub const MENU_FALLBACK: &str = "Sorry, we did not receive a valid selection. Goodbye.";
pub const DEFAULT_VOICEMAIL_MAX_LENGTH: u32 = 120;
pub const DEFAULT_MENU_TIMEOUT: u32 = 10;

/// Conference events we want the platform to report back
const CONFERENCE_EVENTS: &str = "start end join leave mute";

/// One entry of a spoken IVR menu
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuOption {
    pub digit: String,
    pub description: String,
    /// Client identity to bridge to; `None` sends the caller to voicemail
    #[serde(default)]
    pub client: Option<String>,
}

impl MenuOption {
    pub fn new(digit: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            digit: digit.into(),
            description: description.into(),
            client: None,
        }
    }

    pub fn with_client(mut self, identity: impl Into<String>) -> Self {
        self.client = Some(identity.into());
        self
    }
}

/// Greet the caller, then bridge them to a softphone client.
///
/// Custom parameters ride along as `<Parameter>` entries so the client can
/// show who is calling. `BTreeMap` keeps their order stable.
pub fn render_answer_and_bridge(
    caller_address: &str,
    target_client_identity: &str,
    custom_parameters: &BTreeMap<String, String>,
) -> Result<String, TwimlError> {
    let caller_id = Some(caller_address)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    VoiceResponse::new()
        .say(BRIDGE_GREETING, SayOptions::default())
        .dial(DialOptions {
            caller_id,
            ..Default::default()
        })
        .client(target_client_identity, custom_parameters)
        .build()
}

/// Join or start a conference room.
///
/// A moderator starts the room on entry and ends it on exit; everybody else
/// has both behaviours switched off.
pub fn render_conference_create(
    conference_name: &str,
    is_moderator: bool,
    wait_url: Option<&str>,
    status_callback: Option<&str>,
) -> Result<String, TwimlError> {
    conference_document(
        conference_name,
        ConferenceOptions {
            start_conference_on_enter: Some(is_moderator),
            end_conference_on_exit: Some(is_moderator),
            wait_url: wait_url.map(str::to_string),
            ..callback_options(status_callback)
        },
    )
}

/// Join an existing room without moderator privileges
pub fn render_conference_join(
    conference_name: &str,
    muted: bool,
    status_callback: Option<&str>,
) -> Result<String, TwimlError> {
    conference_document(
        conference_name,
        ConferenceOptions {
            start_conference_on_enter: Some(false),
            end_conference_on_exit: Some(false),
            muted: Some(muted),
            ..callback_options(status_callback)
        },
    )
}

fn callback_options(status_callback: Option<&str>) -> ConferenceOptions {
    ConferenceOptions {
        status_callback: status_callback.map(str::to_string),
        status_callback_event: status_callback.map(|_| CONFERENCE_EVENTS.to_string()),
        ..Default::default()
    }
}

fn conference_document(name: &str, options: ConferenceOptions) -> Result<String, TwimlError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TwimlError::EmptyConferenceName);
    }

    VoiceResponse::new()
        .dial(DialOptions::default())
        .conference(name, options)
        .build()
}

/// Greeting, recording, thank-you
pub fn render_voicemail_prompt(
    greeting: Option<&str>,
    max_length_seconds: Option<u32>,
    transcribe: bool,
) -> Result<String, TwimlError> {
    VoiceResponse::new()
        .say(greeting.unwrap_or(VOICEMAIL_GREETING), SayOptions::default())
        .record(RecordOptions {
            max_length: Some(max_length_seconds.unwrap_or(DEFAULT_VOICEMAIL_MAX_LENGTH)),
            transcribe: Some(transcribe),
            play_beep: Some(true),
            ..Default::default()
        })
        .say(VOICEMAIL_THANK_YOU, SayOptions::default())
        .build()
}

/// Spoken single-digit menu. Options are announced in the order given.
///
/// When the caller presses nothing the gather falls through to the fallback
/// line and the call ends.
pub fn render_ivr_menu(
    options: &[MenuOption],
    timeout_seconds: Option<u32>,
    action_url: Option<&str>,
) -> Result<String, TwimlError> {
    validate_menu(options)?;

    VoiceResponse::new()
        .gather(GatherOptions {
            num_digits: Some(1),
            timeout: Some(timeout_seconds.unwrap_or(DEFAULT_MENU_TIMEOUT)),
            action: action_url.map(str::to_string),
            method: action_url.map(|_| "POST".to_string()),
            prompt: Some(menu_prompt(options)),
            ..Default::default()
        })
        .say(MENU_FALLBACK, SayOptions::default())
        .hangup()
        .build()
}

/// Route a gathered digit.
///
/// Unknown or missing digits get the fallback line and a hangup, the same as
/// a timeout on the menu itself.
pub fn render_ivr_selection(
    options: &[MenuOption],
    digit: Option<&str>,
    voicemail_url: &str,
) -> Result<String, TwimlError> {
    validate_menu(options)?;

    let selected = digit
        .map(str::trim)
        .and_then(|d| options.iter().find(|o| o.digit == d));

    let Some(option) = selected else {
        return render_hangup(Some(MENU_FALLBACK));
    };

    let response = VoiceResponse::new().say(
        format!("Connecting you to {}.", option.description),
        SayOptions::default(),
    );

    match &option.client {
        Some(identity) => response
            .dial(DialOptions::default())
            .client(identity.as_str(), Vec::<(String, String)>::new())
            .build(),
        None => response.redirect(voicemail_url).build(),
    }
}

/// Optional message, then hang up
pub fn render_hangup(message: Option<&str>) -> Result<String, TwimlError> {
    let response = match message {
        Some(text) => VoiceResponse::new().say(text, SayOptions::default()),
        None => VoiceResponse::new(),
    };
    response.hangup().build()
}

pub fn menu_prompt(options: &[MenuOption]) -> String {
    options
        .iter()
        .map(|o| format!("Press {} for {}.", o.digit, o.description))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_menu(options: &[MenuOption]) -> Result<(), TwimlError> {
    if options.is_empty() {
        return Err(TwimlError::EmptyMenu);
    }

    let mut seen = HashSet::new();
    for option in options {
        let valid = option.digit.len() == 1
            && option
                .digit
                .chars()
                .all(|c| c.is_ascii_digit() || c == '*' || c == '#');
        if !valid {
            return Err(TwimlError::InvalidDigit(option.digit.clone()));
        }
        if !seen.insert(option.digit.as_str()) {
            return Err(TwimlError::DuplicateDigit(option.digit.clone()));
        }
    }

    Ok(())
}
