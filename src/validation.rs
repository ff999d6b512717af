//! Structural checks on admission input. Everything here is pure and runs
//! before any unit lock is taken.

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::ValidationError;
use crate::limits::*;
use crate::model::{GuestInfo, Ms, Span};

/// 8-digit local number with an optional `+216` / `216` country prefix.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+216|216)?[0-9]{8}$").expect("phone pattern compiles"));

/// Strip all whitespace and check the phone pattern. Returns the normalized number.
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let phone: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if phone.is_empty() {
        return Err(ValidationError::PhoneRequired);
    }
    if !PHONE_RE.is_match(&phone) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(phone)
}

/// Trimmed names plus normalized phone.
pub fn validate_guest(guest: &GuestInfo) -> Result<GuestInfo, ValidationError> {
    let first_name = guest.first_name.trim();
    if first_name.is_empty() {
        return Err(ValidationError::FirstNameRequired);
    }
    let last_name = guest.last_name.trim();
    if last_name.is_empty() {
        return Err(ValidationError::LastNameRequired);
    }
    if first_name.len() > MAX_GUEST_NAME_LEN || last_name.len() > MAX_GUEST_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    let phone = normalize_phone(&guest.phone)?;
    Ok(GuestInfo {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        phone,
    })
}

pub fn validate_party_size(party_size: Option<u32>) -> Result<u32, ValidationError> {
    let party = party_size.unwrap_or(MIN_PARTY_SIZE);
    if !(MIN_PARTY_SIZE..=MAX_PARTY_SIZE).contains(&party) {
        return Err(ValidationError::PartySizeOutOfRange(party));
    }
    Ok(party)
}

pub fn validate_span(start: Ms, end: Ms) -> Result<Span, ValidationError> {
    if start >= end {
        return Err(ValidationError::InvalidInterval { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(ValidationError::TimestampOutOfRange);
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(ValidationError::SpanTooWide);
    }
    Ok(span)
}
