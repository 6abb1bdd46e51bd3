//! Server configuration
//!
//! Everything comes from the environment (optionally via `.env`).

use serde::{Deserialize, Serialize};

use super::platform::DEFAULT_API_BASE;
use super::twiml::MenuOption;
use crate::address;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Platform account id, used as the basic-auth user
    pub account_sid: String,

    /// Platform auth token
    pub auth_token: String,

    /// REST API base URL
    pub api_base: String,

    /// Business WhatsApp number calls are placed from (`whatsapp:+...`)
    pub business_number: String,

    /// Publicly reachable base URL of this server, for platform callbacks
    pub public_base_url: String,

    /// Softphone client that inbound calls are bridged to
    pub agent_identity: String,

    /// Hold music played while waiting for a conference moderator
    pub hold_music_url: Option<String>,

    pub port: u16,

    pub menu: Vec<MenuOption>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            business_number: String::new(),
            public_base_url: "http://localhost:3000".to_string(),
            agent_identity: "agent".to_string(),
            hold_music_url: None,
            port: 3000,
            menu: default_menu(),
        }
    }
}

pub fn default_menu() -> Vec<MenuOption> {
    vec![
        MenuOption::new("1", "sales").with_client("sales"),
        MenuOption::new("2", "support").with_client("support"),
        MenuOption::new("3", "voicemail"),
    ]
}

/// Menu from `IVR_MENU`. Malformed JSON is reported and the default menu used.
fn parse_menu(raw: Option<String>) -> Vec<MenuOption> {
    let Some(raw) = raw else {
        return default_menu();
    };

    match serde_json::from_str(&raw) {
        Ok(menu) => menu,
        Err(e) => {
            tracing::warn!("Ignoring malformed IVR_MENU ({}), using the default menu", e);
            default_menu()
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            account_sid: std::env::var("PLATFORM_ACCOUNT_SID").unwrap_or_default(),
            auth_token: std::env::var("PLATFORM_AUTH_TOKEN").unwrap_or_default(),
            api_base: std::env::var("PLATFORM_API_BASE").unwrap_or(defaults.api_base),
            business_number: std::env::var("WHATSAPP_BUSINESS_NUMBER")
                .map(|n| address::normalize_address(&n))
                .unwrap_or_default(),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            agent_identity: std::env::var("AGENT_IDENTITY").unwrap_or(defaults.agent_identity),
            hold_music_url: std::env::var("HOLD_MUSIC_URL").ok(),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            menu: parse_menu(std::env::var("IVR_MENU").ok()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.account_sid.is_empty() {
            return Err("PLATFORM_ACCOUNT_SID is required".to_string());
        }
        if self.auth_token.is_empty() {
            return Err("PLATFORM_AUTH_TOKEN is required".to_string());
        }
        if !address::is_valid_address(&self.business_number) {
            return Err(format!("WHATSAPP_BUSINESS_NUMBER is invalid: {:?}", self.business_number));
        }
        if self.agent_identity.is_empty() {
            return Err("AGENT_IDENTITY must not be empty".to_string());
        }
        super::twiml::validate_menu(&self.menu).map_err(|e| format!("IVR_MENU: {}", e))?;
        Ok(())
    }

    /// Absolute URL for one of our webhook paths
    pub fn callback_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base_url, path)
    }
}
