//! Softphone call state
//!
//! The browser/desktop calling SDK hands us a call object and reports what
//! happens to it through events. [`SoftphoneCall`] is the slice of that object
//! we drive; [`DeviceEvents`] has one method per event type. [`Softphone`]
//! owns the current call and mirrors its state for the UI.

use crate::models::CallState;

/// Call object exposed by the calling SDK
pub trait SoftphoneCall {
    fn call_id(&self) -> &str;
    fn accept(&mut self);
    fn reject(&mut self);
    fn disconnect(&mut self);
    fn mute(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
}

/// Events emitted by the SDK for a call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Incoming { call_id: String, from: Option<String> },
    Accept { call_id: String },
    Disconnect { call_id: String },
    Error { call_id: String, code: u32, message: String },
    Mute { call_id: String, muted: bool },
    Volume { call_id: String, input: f32, output: f32 },
}

impl DeviceEvent {
    pub fn call_id(&self) -> &str {
        match self {
            DeviceEvent::Incoming { call_id, .. }
            | DeviceEvent::Accept { call_id }
            | DeviceEvent::Disconnect { call_id }
            | DeviceEvent::Error { call_id, .. }
            | DeviceEvent::Mute { call_id, .. }
            | DeviceEvent::Volume { call_id, .. } => call_id,
        }
    }
}

/// One handler per SDK event; all default to no-ops
pub trait DeviceEvents {
    fn on_incoming(&mut self, _call_id: &str, _from: Option<&str>) {}
    fn on_accept(&mut self, _call_id: &str) {}
    fn on_disconnect(&mut self, _call_id: &str) {}
    fn on_error(&mut self, _call_id: &str, _code: u32, _message: &str) {}
    fn on_mute(&mut self, _call_id: &str, _muted: bool) {}
    fn on_volume(&mut self, _call_id: &str, _input: f32, _output: f32) {}
}

pub fn dispatch_device_event<H: DeviceEvents + ?Sized>(handler: &mut H, event: &DeviceEvent) {
    match event {
        DeviceEvent::Incoming { call_id, from } => handler.on_incoming(call_id, from.as_deref()),
        DeviceEvent::Accept { call_id } => handler.on_accept(call_id),
        DeviceEvent::Disconnect { call_id } => handler.on_disconnect(call_id),
        DeviceEvent::Error { call_id, code, message } => handler.on_error(call_id, *code, message),
        DeviceEvent::Mute { call_id, muted } => handler.on_mute(call_id, *muted),
        DeviceEvent::Volume { call_id, input, output } => {
            handler.on_volume(call_id, *input, *output)
        }
    }
}

/// What the UI shows about the current call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftphoneState {
    pub current_call_id: Option<String>,
    pub caller: Option<String>,
    pub call_state: Option<CallState>,
    pub is_muted: bool,
    pub input_volume: f32,
    pub output_volume: f32,
    pub last_error: Option<String>,
}

impl SoftphoneState {
    pub fn is_in_call(&self) -> bool {
        self.call_state.map(|s| s.is_active()).unwrap_or(false)
    }

    pub fn is_ringing(&self) -> bool {
        self.call_state == Some(CallState::Ringing)
    }

    fn is_current(&self, call_id: &str) -> bool {
        self.current_call_id.as_deref() == Some(call_id)
    }

    fn end_call(&mut self) {
        *self = SoftphoneState {
            last_error: self.last_error.take(),
            ..Default::default()
        };
    }
}

impl DeviceEvents for SoftphoneState {
    fn on_incoming(&mut self, call_id: &str, from: Option<&str>) {
        self.current_call_id = Some(call_id.to_string());
        self.caller = from.map(str::to_string);
        self.call_state = Some(CallState::Ringing);
        self.is_muted = false;
        self.last_error = None;
    }

    fn on_accept(&mut self, call_id: &str) {
        if self.is_current(call_id) {
            self.call_state = Some(CallState::Active);
        }
    }

    fn on_disconnect(&mut self, call_id: &str) {
        if self.is_current(call_id) {
            self.end_call();
        }
    }

    fn on_error(&mut self, call_id: &str, code: u32, message: &str) {
        tracing::warn!("Softphone call {} error {}: {}", call_id, code, message);
        self.last_error = Some(format!("{} ({})", message, code));
        if self.is_current(call_id) {
            self.end_call();
        }
    }

    fn on_mute(&mut self, call_id: &str, muted: bool) {
        if self.is_current(call_id) {
            self.is_muted = muted;
        }
    }

    fn on_volume(&mut self, call_id: &str, input: f32, output: f32) {
        if self.is_current(call_id) {
            self.input_volume = input;
            self.output_volume = output;
        }
    }
}

/// Owner of the SDK call object for the one call a softphone handles at a time
pub struct Softphone<C: SoftphoneCall> {
    call: Option<C>,
    state: SoftphoneState,
}

impl<C: SoftphoneCall> Default for Softphone<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SoftphoneCall> Softphone<C> {
    pub fn new() -> Self {
        Self {
            call: None,
            state: SoftphoneState::default(),
        }
    }

    pub fn state(&self) -> &SoftphoneState {
        &self.state
    }

    /// A new call is ringing. A second call while busy is rejected.
    pub fn ring(&mut self, mut call: C, from: Option<&str>) {
        if self.call.is_some() {
            tracing::info!("Busy, rejecting call {}", call.call_id());
            call.reject();
            return;
        }

        self.state.on_incoming(call.call_id(), from);
        self.call = Some(call);
    }

    pub fn accept(&mut self) {
        if let Some(call) = self.call.as_mut() {
            call.accept();
        }
    }

    pub fn reject(&mut self) {
        if let Some(mut call) = self.call.take() {
            call.reject();
            self.state.end_call();
        }
    }

    pub fn hangup(&mut self) {
        if let Some(mut call) = self.call.take() {
            call.disconnect();
            self.state.end_call();
        }
    }

    /// Flip mute on the live call. The flag updates right away; the SDK's
    /// mute event confirms it later.
    pub fn toggle_mute(&mut self) {
        if let Some(call) = self.call.as_mut() {
            let muted = !call.is_muted();
            call.mute(muted);
            self.state.is_muted = muted;
        }
    }

    /// Feed an SDK event in. Events for other calls are ignored.
    pub fn handle_event(&mut self, event: &DeviceEvent) {
        let is_current = self
            .call
            .as_ref()
            .map(|c| c.call_id() == event.call_id())
            .unwrap_or(false);
        if !is_current {
            return;
        }

        dispatch_device_event(&mut self.state, event);

        if matches!(event, DeviceEvent::Disconnect { .. } | DeviceEvent::Error { .. }) {
            self.call = None;
        }
    }
}
