//! Checks applied to inbound fields before they reach the resolver.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::{ContactIdentifier, NewContact};
use crate::errors::CrmError;

pub const MAX_NAME_CHARS: usize = 255;

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[\d\s\-\(\)]{7,20}$").expect("valid phone regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub fn validate_new_contact(contact: NewContact) -> Result<NewContact, CrmError> {
    let name = contact.name.trim();
    if name.is_empty() {
        return Err(CrmError::validation("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(CrmError::validation(
            "name",
            format!("must be at most {MAX_NAME_CHARS} characters"),
        ));
    }

    let email = match contact.email.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(email) if EMAIL_RE.is_match(email) => Some(email.to_string()),
        Some(_) => return Err(CrmError::validation("email", "is not a valid email address")),
    };

    let phone = match contact.phone.as_deref() {
        None => None,
        Some(phone) if PHONE_RE.is_match(phone) => Some(phone.to_string()),
        Some(_) => {
            return Err(CrmError::validation(
                "phone",
                "invalid format, use international format (e.g. +57 300 123 4567)",
            ))
        }
    };

    Ok(NewContact { name: name.to_string(), email, phone })
}

pub fn validate_identifier(raw: &str) -> Result<ContactIdentifier, CrmError> {
    if raw.trim().is_empty() {
        return Err(CrmError::validation("contact_identifier", "must not be empty"));
    }
    Ok(ContactIdentifier::new(raw))
}

pub fn validate_note_content(content: &str) -> Result<(), CrmError> {
    if content.trim().is_empty() {
        return Err(CrmError::validation("content", "must not be empty"));
    }
    Ok(())
}

pub fn validate_update_fields(fields: &Map<String, Value>) -> Result<(), CrmError> {
    if fields.is_empty() {
        return Err(CrmError::validation("fields", "must contain at least one field"));
    }
    Ok(())
}
