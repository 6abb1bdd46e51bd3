//! WhatsApp address handling
//!
//! Calls over the WhatsApp voice channel are addressed as
//! `whatsapp:+<country code><number>`. These helpers normalize raw input into
//! that form and check it before anything is sent to the platform.

use thiserror::Error;

/// Channel tag identifying the WhatsApp voice channel
pub const CHANNEL_PREFIX: &str = "whatsapp:";

const MIN_DIGITS: usize = 2;
const MAX_DIGITS: usize = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid WhatsApp address: {0}")]
    Invalid(String),
}

/// Normalize a raw address into `whatsapp:+<digits>` form.
///
/// Always returns a string, even for garbage input; use [`is_valid_address`]
/// to check the result.
pub fn normalize_address(raw: &str) -> String {
    let number = strip_channel_prefix(raw.trim()).trim();
    if number.starts_with('+') {
        with_channel_prefix(number)
    } else {
        with_channel_prefix(&format!("+{}", number))
    }
}

/// True if `candidate` is exactly `whatsapp:+` followed by 2-15 digits
pub fn is_valid_address(candidate: &str) -> bool {
    let Some(number) = candidate.strip_prefix(CHANNEL_PREFIX) else {
        return false;
    };
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };

    (MIN_DIGITS..=MAX_DIGITS).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Remove the channel prefix if present
pub fn strip_channel_prefix(address: &str) -> &str {
    address.strip_prefix(CHANNEL_PREFIX).unwrap_or(address)
}

pub fn with_channel_prefix(number: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, number)
}

/// Normalize and validate in one step. Gate for call-initiating actions.
pub fn validate_address(raw: &str) -> Result<String, AddressError> {
    let normalized = normalize_address(raw);
    if is_valid_address(&normalized) {
        Ok(normalized)
    } else {
        Err(AddressError::Invalid(raw.to_string()))
    }
}
