pub mod config;
pub mod contacts;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod resolver;
pub mod retry;
pub mod validation;

pub use contacts::{ContactOutcome, ContactService, NoteOutcome, UpdateOutcome};
pub use domain::{
    CandidateSummary, ContactIdentifier, ContactRecord, ContactSummary, NewContact, NoteRecord,
    PersonId,
};
pub use errors::CrmError;
pub use gateway::PersonGateway;
pub use resolver::{ContactResolver, Selection};
pub use retry::RetryPolicy;
