use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream person id. The only stable identity a contact has.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub u64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied string naming a contact: a numeric id, an email or a name.
///
/// There is no type tag. Whether the value is tried as an id first is decided
/// by [`ContactIdentifier::as_person_id`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactIdentifier(pub String);

impl ContactIdentifier {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id form of an all-digit identifier.
    ///
    /// Digit strings too large for a [`PersonId`] are treated as free text.
    pub fn as_person_id(&self) -> Option<PersonId> {
        let raw = self.0.as_str();
        if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        raw.parse::<u64>().ok().map(PersonId)
    }
}

impl fmt::Display for ContactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContactIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Full person record as returned by the upstream get/create/update calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: PersonId,
    pub name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub add_time: Option<String>,
    pub update_time: Option<String>,
}

impl ContactRecord {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }
}

/// A search hit. Carries only what the upstream search index returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSummary {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
}

impl ContactSummary {
    pub fn has_email(&self, email: &str) -> bool {
        let wanted = email.to_lowercase();
        self.emails.iter().any(|candidate| candidate.to_lowercase() == wanted)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// One entry of the list handed back when an identifier is ambiguous.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub id: PersonId,
    pub name: String,
    pub email: Option<String>,
}

impl From<&ContactSummary> for CandidateSummary {
    fn from(summary: &ContactSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name.clone(),
            email: summary.emails.first().cloned(),
        }
    }
}

/// Payload for creating a person upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: u64,
    pub created_at: Option<String>,
}
