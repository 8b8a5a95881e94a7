//! WhatsApp Business webhook payloads.
//!
//! Parsing never fails: anything that does not look like a text message
//! delivery is dropped, because the provider must always get a 200 back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";
const SUBSCRIBE_MODE: &str = "subscribe";

/// One inbound text message, independent of the provider payload shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// Business phone number id the message was delivered to; used to find the tenant.
    pub routing_key: Option<String>,
    pub from_address: String,
    pub external_message_id: String,
    pub body: String,
    pub display_name: Option<String>,
    /// Provider-side send time, when the payload carries a parsable one.
    pub sent_at: Option<DateTime<Utc>>,
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map_or(&[][..], Vec::as_slice)
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// Digits of a phone address; `+55 11 9999-0000` and `551199990000` compare equal.
#[must_use]
pub fn phone_digits(address: &str) -> String {
    address.chars().filter(char::is_ascii_digit).collect()
}

/// Profile names from the `contacts` array of a change, keyed by phone digits.
fn contact_profile_names(value: &Value) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for contact in array(value, "contacts") {
        let Some(wa_id) = text(contact, "wa_id") else {
            continue;
        };
        let Some(name) = contact.get("profile").and_then(|p| text(p, "name")) else {
            continue;
        };
        names.insert(phone_digits(wa_id), name.to_string());
    }
    names
}

fn parse_timestamp(message: &Value) -> Option<DateTime<Utc>> {
    let seconds = match message.get("timestamp")? {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    DateTime::from_timestamp(seconds, 0)
}

fn text_message(message: &Value, routing_key: Option<&str>, names: &HashMap<String, String>) -> Option<NormalizedEvent> {
    if message.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    let from_address = text(message, "from")?;
    let external_message_id = text(message, "id")?;
    let body = message.get("text").and_then(|t| t.get("body")).and_then(Value::as_str)?;

    Some(NormalizedEvent {
        routing_key: routing_key.map(str::to_string),
        from_address: from_address.to_string(),
        external_message_id: external_message_id.to_string(),
        body: body.to_string(),
        display_name: names.get(&phone_digits(from_address)).cloned(),
        sent_at: parse_timestamp(message),
    })
}

/// Flattens every text message of every change of every entry, in payload order.
#[must_use]
pub fn normalize(payload: &Value) -> Vec<NormalizedEvent> {
    if payload.get("object").and_then(Value::as_str) != Some(BUSINESS_ACCOUNT_OBJECT) {
        return Vec::new();
    }

    let mut events = Vec::new();
    for entry in array(payload, "entry") {
        for change in array(entry, "changes") {
            if change.get("field").and_then(Value::as_str) != Some("messages") {
                continue;
            }
            let Some(value) = change.get("value") else {
                continue;
            };
            let routing_key = value.get("metadata").and_then(|m| text(m, "phone_number_id"));
            let names = contact_profile_names(value);
            events.extend(
                array(value, "messages")
                    .iter()
                    .filter_map(|message| text_message(message, routing_key, &names)),
            );
        }
    }
    events
}

/// Provider subscription handshake: echoes the challenge when the token matches.
#[must_use]
pub fn verify(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>, expected_token: &str) -> Option<String> {
    match (mode, token, challenge) {
        (Some(SUBSCRIBE_MODE), Some(token), Some(challenge)) if token == expected_token => Some(challenge.to_string()),
        _ => None,
    }
}
