#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use crmlink_core::{
    ContactRecord, ContactSummary, CrmError, NewContact, NoteRecord, PersonGateway, PersonId,
};
use serde_json::{Map, Value};

/// In-memory stand-in for the upstream CRM.
///
/// Search is a case-insensitive substring match on name and emails, which is
/// close enough to upstream fuzzy search for resolver tests.
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    persons: Vec<ContactRecord>,
    notes: Vec<(PersonId, String)>,
    calls: Vec<String>,
    search_error: Option<CrmError>,
    extra_hits: Vec<ContactSummary>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_person(self, id: u64, name: &str, emails: &[&str]) -> Self {
        self.lock().persons.push(ContactRecord {
            id: PersonId(id),
            name: name.to_string(),
            emails: emails.iter().map(|email| email.to_string()).collect(),
            phones: vec![],
            add_time: Some("2024-01-01 10:00:00".to_string()),
            update_time: None,
        });
        self
    }

    /// Makes every search fail with `error`, as a gateway without a
    /// fail-open policy would.
    pub fn failing_search(self, error: CrmError) -> Self {
        self.lock().search_error = Some(error);
        self
    }

    /// Adds a search hit with no backing record, as after a concurrent delete.
    pub fn with_stale_hit(self, id: u64, name: &str) -> Self {
        self.lock().extra_hits.push(ContactSummary {
            id: PersonId(id),
            name: name.to_string(),
            emails: vec![],
            phones: vec![],
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn notes(&self) -> Vec<(PersonId, String)> {
        self.lock().notes.clone()
    }

    pub fn person_count(&self) -> usize {
        self.lock().persons.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PersonGateway for InMemoryGateway {
    async fn search_persons(&self, term: &str) -> Result<Vec<ContactSummary>, CrmError> {
        let mut state = self.lock();
        state.calls.push(format!("search:{term}"));
        if let Some(error) = &state.search_error {
            return Err(error.clone());
        }

        let needle = term.to_lowercase();
        let mut hits: Vec<ContactSummary> = state
            .persons
            .iter()
            .filter(|person| {
                person.name.to_lowercase().contains(&needle)
                    || person.emails.iter().any(|email| email.to_lowercase().contains(&needle))
            })
            .map(|person| ContactSummary {
                id: person.id,
                name: person.name.clone(),
                emails: person.emails.clone(),
                phones: person.phones.clone(),
            })
            .collect();
        hits.extend(
            state
                .extra_hits
                .iter()
                .filter(|hit| hit.name.to_lowercase().contains(&needle))
                .cloned(),
        );
        Ok(hits)
    }

    async fn get_person(&self, id: PersonId) -> Result<ContactRecord, CrmError> {
        let mut state = self.lock();
        state.calls.push(format!("get:{id}"));
        state
            .persons
            .iter()
            .find(|person| person.id == id)
            .cloned()
            .ok_or_else(|| CrmError::not_found(id.to_string()))
    }

    async fn create_person(&self, contact: &NewContact) -> Result<ContactRecord, CrmError> {
        let mut state = self.lock();
        state.calls.push(format!("create:{}", contact.name));
        let next_id = state.persons.iter().map(|person| person.id.0).max().unwrap_or(100) + 1;
        let record = ContactRecord {
            id: PersonId(next_id),
            name: contact.name.clone(),
            emails: contact.email.iter().cloned().collect(),
            phones: contact.phone.iter().cloned().collect(),
            add_time: Some("2024-06-01 09:30:00".to_string()),
            update_time: None,
        };
        state.persons.push(record.clone());
        Ok(record)
    }

    async fn update_person(
        &self,
        id: PersonId,
        fields: &Map<String, Value>,
    ) -> Result<ContactRecord, CrmError> {
        let mut state = self.lock();
        state.calls.push(format!("update:{id}"));
        let person = state
            .persons
            .iter_mut()
            .find(|person| person.id == id)
            .ok_or_else(|| CrmError::Upstream { status: 404, body: "missing".to_string() })?;
        if let Some(name) = fields.get("name").and_then(Value::as_str) {
            person.name = name.to_string();
        }
        person.update_time = Some("2024-06-02 12:00:00".to_string());
        Ok(person.clone())
    }

    async fn add_note(&self, person_id: PersonId, content: &str) -> Result<NoteRecord, CrmError> {
        let mut state = self.lock();
        state.calls.push(format!("note:{person_id}"));
        state.notes.push((person_id, content.to_string()));
        Ok(NoteRecord {
            id: state.notes.len() as u64,
            created_at: Some("2024-06-01 09:31:00".to_string()),
        })
    }

    fn person_url(&self, id: PersonId) -> String {
        format!("https://crm.test/person/{id}")
    }
}
