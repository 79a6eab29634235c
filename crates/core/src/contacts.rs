use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::domain::{ContactIdentifier, ContactRecord, NewContact, NoteRecord};
use crate::errors::CrmError;
use crate::gateway::PersonGateway;
use crate::resolver::ContactResolver;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactOutcome {
    pub record: ContactRecord,
    pub is_new: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteOutcome {
    pub note: NoteRecord,
    pub contact: ContactRecord,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The contact as resolved before the update was applied.
    pub contact: ContactRecord,
    pub updated: ContactRecord,
}

/// The three contact use cases offered to the conversational agent.
#[derive(Clone)]
pub struct ContactService {
    resolver: ContactResolver,
}

impl ContactService {
    pub fn new(gateway: Arc<dyn PersonGateway>) -> Self {
        Self { resolver: ContactResolver::new(gateway) }
    }

    pub fn resolver(&self) -> &ContactResolver {
        &self.resolver
    }

    pub fn person_url(&self, record: &ContactRecord) -> String {
        self.resolver.gateway().person_url(record.id)
    }

    /// Creates a contact unless one with the same email or name exists, in
    /// which case the existing record is returned with `is_new = false`.
    pub async fn create_contact(&self, contact: &NewContact) -> Result<ContactOutcome, CrmError> {
        if let Some(existing) =
            self.resolver.check_duplicate(&contact.name, contact.email.as_deref()).await?
        {
            return Ok(ContactOutcome { record: existing, is_new: false });
        }

        let record = self.resolver.gateway().create_person(contact).await?;
        info!(
            event_name = "crm.contact.created",
            person_id = %record.id,
            "contact created upstream"
        );
        Ok(ContactOutcome { record, is_new: true })
    }

    pub async fn add_note(
        &self,
        identifier: &ContactIdentifier,
        content: &str,
    ) -> Result<NoteOutcome, CrmError> {
        let contact = self.resolver.resolve(identifier).await?;
        let note = self.resolver.gateway().add_note(contact.id, content).await?;
        info!(
            event_name = "crm.note.created",
            person_id = %contact.id,
            note_id = note.id,
            "note attached to contact"
        );
        Ok(NoteOutcome { note, contact })
    }

    pub async fn update_contact(
        &self,
        identifier: &ContactIdentifier,
        fields: &Map<String, Value>,
    ) -> Result<UpdateOutcome, CrmError> {
        let contact = self.resolver.resolve(identifier).await?;
        let updated = self.resolver.gateway().update_person(contact.id, fields).await?;
        info!(
            event_name = "crm.contact.updated",
            person_id = %contact.id,
            field_count = fields.len(),
            "contact updated upstream"
        );
        Ok(UpdateOutcome { contact, updated })
    }
}
