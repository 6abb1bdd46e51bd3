//! Telephony platform REST client
//!
//! Only the two requests this service makes itself: placing an outbound call
//! and ending one. Everything else the platform does is driven by the markup
//! our webhooks return.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Call progress events we subscribe to on outbound calls
const STATUS_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),
}

/// What handlers need from the platform. Implemented by [`PlatformClient`]
/// and by test fakes.
#[async_trait]
pub trait CallPlatform: Send + Sync {
    /// Place an outbound call and return the platform's call id
    async fn create_call(
        &self,
        from: &str,
        to: &str,
        callback_url: &str,
        custom_params: &BTreeMap<String, String>,
    ) -> Result<String, PlatformError>;

    /// End a live call
    async fn hangup(&self, call_id: &str) -> Result<(), PlatformError>;
}

#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
    status_callback: Option<String>,
}

impl PlatformClient {
    pub fn new(account_sid: String, auth_token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            account_sid,
            auth_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            status_callback: None,
        }
    }

    /// Ask for call progress callbacks at `url` on every call we place
    pub fn with_status_callback(mut self, url: impl Into<String>) -> Self {
        self.status_callback = Some(url.into());
        self
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", self.base_url, self.account_sid)
    }

    fn call_url(&self, call_id: &str) -> String {
        format!("{}/Accounts/{}/Calls/{}.json", self.base_url, self.account_sid, call_id)
    }

    async fn post_form<R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<R, PlatformError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response.json().await?)
    }
}

/// Custom parameters travel as query parameters on the markup callback URL
pub fn callback_with_params(
    callback_url: &str,
    custom_params: &BTreeMap<String, String>,
) -> Result<String, PlatformError> {
    let mut url = Url::parse(callback_url)
        .map_err(|e| PlatformError::InvalidCallbackUrl(format!("{}: {}", callback_url, e)))?;

    if !custom_params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in custom_params {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}

#[async_trait]
impl CallPlatform for PlatformClient {
    async fn create_call(
        &self,
        from: &str,
        to: &str,
        callback_url: &str,
        custom_params: &BTreeMap<String, String>,
    ) -> Result<String, PlatformError> {
        let markup_url = callback_with_params(callback_url, custom_params)?;

        let mut form = vec![("To", to), ("From", from), ("Url", markup_url.as_str())];
        if let Some(status_callback) = &self.status_callback {
            form.push(("StatusCallback", status_callback.as_str()));
            form.push(("StatusCallbackMethod", "POST"));
            for event in STATUS_EVENTS {
                form.push(("StatusCallbackEvent", event));
            }
        }

        let created: CallResource = self.post_form(&self.calls_url(), &form).await?;
        tracing::info!("Platform call created: {} ({} -> {})", created.sid, from, to);
        Ok(created.sid)
    }

    async fn hangup(&self, call_id: &str) -> Result<(), PlatformError> {
        let _: CallResource = self
            .post_form(&self.call_url(call_id), &[("Status", "completed")])
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}
