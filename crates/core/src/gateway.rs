use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{ContactRecord, ContactSummary, NewContact, NoteRecord, PersonId};
use crate::errors::CrmError;

/// Calls against the upstream CRM's person and note endpoints.
///
/// Implementations translate transport failures into [`CrmError::Connection`]
/// and HTTP failures into [`CrmError::Upstream`]. `get_person` reports a
/// missing id as [`CrmError::NotFound`].
#[async_trait]
pub trait PersonGateway: Send + Sync {
    /// Fuzzy search on name and email. Only the first upstream page is read.
    async fn search_persons(&self, term: &str) -> Result<Vec<ContactSummary>, CrmError>;

    async fn get_person(&self, id: PersonId) -> Result<ContactRecord, CrmError>;

    async fn create_person(&self, contact: &NewContact) -> Result<ContactRecord, CrmError>;

    /// Forwards `fields` to upstream verbatim.
    async fn update_person(
        &self,
        id: PersonId,
        fields: &Map<String, Value>,
    ) -> Result<ContactRecord, CrmError>;

    async fn add_note(&self, person_id: PersonId, content: &str) -> Result<NoteRecord, CrmError>;

    /// Link to the person in the CRM web app.
    fn person_url(&self, id: PersonId) -> String;
}
