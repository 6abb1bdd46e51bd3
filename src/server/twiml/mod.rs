//! Call-control markup generation
//!
//! The platform asks our webhooks what to do with a live call and expects a
//! small XML document back (`<Response>` wrapping a list of verbs). Documents
//! are assembled as an append-only list of [`Element`]s and serialized once by
//! [`VoiceResponse::build`], so open/close tags always match and every piece
//! of user-supplied text goes through the XML escaper.
//!
//! ```ignore
//! let xml = VoiceResponse::new()
//!     .say("Connecting you now", SayOptions::default())
//!     .dial(DialOptions::default())
//!     .client("agent", [("caller", "whatsapp:+15551234567")])
//!     .build()?;
//! ```

pub mod templates;

pub use templates::*;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use thiserror::Error;

/// Content type the platform expects for markup responses
pub const CONTENT_TYPE: &str = "text/xml";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TwimlError {
    #[error("Conference name must not be empty")]
    EmptyConferenceName,
    #[error("Menu must contain at least one option")]
    EmptyMenu,
    #[error("Duplicate menu digit: {0}")]
    DuplicateDigit(String),
    #[error("Invalid menu digit: {0:?}")]
    InvalidDigit(String),
    #[error("Failed to serialize markup: {0}")]
    Serialize(String),
}

impl TwimlError {
    /// True for errors caused by bad input rather than by serialization
    pub fn is_validation(&self) -> bool {
        !matches!(self, TwimlError::Serialize(_))
    }
}

/// One markup element with its attributes, optional text and children
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    fn attr(mut self, name: &'static str, value: impl ToString) -> Self {
        self.attributes.push((name, value.to_string()));
        self
    }

    fn attr_opt<T: ToString>(self, name: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.attr(name, v),
            None => self,
        }
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn write(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<(), TwimlError> {
        let mut start = BytesStart::new(self.name);
        for (key, value) in &self.attributes {
            start.push_attribute((*key, value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| TwimlError::Serialize(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| TwimlError::Serialize(e.to_string()))?;

        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| TwimlError::Serialize(e.to_string()))?;
        }

        for child in &self.children {
            child.write(writer)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(self.name)))
            .map_err(|e| TwimlError::Serialize(e.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SayOptions {
    pub voice: Option<String>,
    pub language: Option<String>,
    pub loop_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct DialOptions {
    pub caller_id: Option<String>,
    pub timeout: Option<u32>,
    pub action: Option<String>,
    pub answer_on_bridge: Option<bool>,
    pub record: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConferenceOptions {
    pub start_conference_on_enter: Option<bool>,
    pub end_conference_on_exit: Option<bool>,
    pub muted: Option<bool>,
    pub beep: Option<bool>,
    pub wait_url: Option<String>,
    pub status_callback: Option<String>,
    pub status_callback_event: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GatherOptions {
    pub num_digits: Option<u32>,
    pub timeout: Option<u32>,
    pub action: Option<String>,
    pub method: Option<String>,
    pub finish_on_key: Option<String>,
    /// Spoken inside the gather so input can interrupt it
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub max_length: Option<u32>,
    pub transcribe: Option<bool>,
    pub action: Option<String>,
    pub play_beep: Option<bool>,
    pub finish_on_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub wait_url: Option<String>,
    pub action: Option<String>,
}

fn say_element(text: impl Into<String>, options: SayOptions) -> Element {
    Element::new("Say")
        .attr_opt("voice", options.voice)
        .attr_opt("language", options.language)
        .attr_opt("loop", options.loop_count)
        .text(text)
}

/// Append-only markup document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceResponse {
    verbs: Vec<Element>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, verb: Element) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn say(self, text: impl Into<String>, options: SayOptions) -> Self {
        self.push(say_element(text, options))
    }

    pub fn play(self, url: impl Into<String>) -> Self {
        self.push(Element::new("Play").text(url))
    }

    pub fn pause(self, seconds: u32) -> Self {
        self.push(Element::new("Pause").attr("length", seconds))
    }

    /// Start a `<Dial>`. The returned builder adds exactly one noun and hands
    /// the response back.
    pub fn dial(self, options: DialOptions) -> DialBuilder {
        let dial = Element::new("Dial")
            .attr_opt("callerId", options.caller_id)
            .attr_opt("timeout", options.timeout)
            .attr_opt("action", options.action)
            .attr_opt("answerOnBridge", options.answer_on_bridge)
            .attr_opt("record", options.record);

        DialBuilder { response: self, dial }
    }

    pub fn gather(self, options: GatherOptions) -> Self {
        let mut gather = Element::new("Gather")
            .attr_opt("numDigits", options.num_digits)
            .attr_opt("timeout", options.timeout)
            .attr_opt("action", options.action)
            .attr_opt("method", options.method)
            .attr_opt("finishOnKey", options.finish_on_key);

        if let Some(prompt) = options.prompt {
            gather = gather.child(say_element(prompt, SayOptions::default()));
        }

        self.push(gather)
    }

    pub fn record(self, options: RecordOptions) -> Self {
        self.push(
            Element::new("Record")
                .attr_opt("maxLength", options.max_length)
                .attr_opt("transcribe", options.transcribe)
                .attr_opt("action", options.action)
                .attr_opt("playBeep", options.play_beep)
                .attr_opt("finishOnKey", options.finish_on_key),
        )
    }

    pub fn enqueue(self, queue_name: impl Into<String>, options: EnqueueOptions) -> Self {
        self.push(
            Element::new("Enqueue")
                .attr_opt("waitUrl", options.wait_url)
                .attr_opt("action", options.action)
                .text(queue_name),
        )
    }

    pub fn redirect(self, url: impl Into<String>) -> Self {
        self.push(Element::new("Redirect").text(url))
    }

    pub fn hangup(self) -> Self {
        self.push(Element::new("Hangup"))
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    /// Serialize the document.
    ///
    /// Does not consume or modify the builder; calling it again yields the
    /// same document.
    pub fn build(&self) -> Result<String, TwimlError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| TwimlError::Serialize(e.to_string()))?;

        let root = Element {
            name: "Response",
            attributes: Vec::new(),
            text: None,
            children: self.verbs.clone(),
        };
        root.write(&mut writer)?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| TwimlError::Serialize(e.to_string()))
    }
}

/// Scoped builder for the single noun inside a `<Dial>`
#[derive(Debug, Clone)]
pub struct DialBuilder {
    response: VoiceResponse,
    dial: Element,
}

impl DialBuilder {
    /// Bridge to a named softphone client, passing custom parameters along
    pub fn client<I, K, V>(self, identity: impl Into<String>, parameters: I) -> VoiceResponse
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let identity = identity.into();
        let parameters: Vec<Element> = parameters
            .into_iter()
            .map(|(name, value)| {
                Element::new("Parameter")
                    .attr("name", name.as_ref())
                    .attr("value", value.as_ref())
            })
            .collect();

        let client = if parameters.is_empty() {
            Element::new("Client").text(identity)
        } else {
            parameters.into_iter().fold(
                Element::new("Client").child(Element::new("Identity").text(identity)),
                Element::child,
            )
        };

        self.finish(client)
    }

    pub fn number(self, number: impl Into<String>) -> VoiceResponse {
        self.finish(Element::new("Number").text(number))
    }

    pub fn conference(self, name: impl Into<String>, options: ConferenceOptions) -> VoiceResponse {
        let conference = Element::new("Conference")
            .attr_opt("startConferenceOnEnter", options.start_conference_on_enter)
            .attr_opt("endConferenceOnExit", options.end_conference_on_exit)
            .attr_opt("muted", options.muted)
            .attr_opt("beep", options.beep)
            .attr_opt("waitUrl", options.wait_url)
            .attr_opt("statusCallback", options.status_callback)
            .attr_opt("statusCallbackEvent", options.status_callback_event)
            .text(name);

        self.finish(conference)
    }

    fn finish(self, noun: Element) -> VoiceResponse {
        self.response.push(self.dial.child(noun))
    }
}
