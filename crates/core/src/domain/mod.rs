pub mod contact;

pub use contact::{
    CandidateSummary, ContactIdentifier, ContactRecord, ContactSummary, NewContact, NoteRecord,
    PersonId,
};
