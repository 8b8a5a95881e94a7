use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Upper bound for email addresses, as in RFC 5321.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Field-level validation messages, keyed by the JSON field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) -> &mut Self {
        self.0.entry(field).or_insert_with(|| message.into());
        self
    }

    pub fn min_chars(&mut self, field: &'static str, value: &str, min: usize) -> &mut Self {
        if value.trim().chars().count() < min {
            self.add(field, format!("{field} must be at least {min} characters"));
        }
        self
    }

    pub fn required(&mut self, field: &'static str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.add(field, format!("{field} is required"));
        }
        self
    }

    pub fn email(&mut self, field: &'static str, value: &str) -> &mut Self {
        if !is_valid_email(value) {
            self.add(field, "Invalid email address");
        }
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn finish(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.values().map(String::as_str).collect();
        write!(f, "{}", messages.join(", "))
    }
}

/// Basic `local@domain.tld` shape check.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !domain.starts_with('.'),
        None => false,
    }
}
