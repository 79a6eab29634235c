//! Identifier resolution and duplicate detection.
//!
//! Both routines are sequential: every step depends on the previous upstream
//! answer, and nothing is cached between calls. Matching is case-insensitive
//! on name and email; the person id is the only stable identity.
//!
//! Two matching contracts are encoded as standalone policy functions so they
//! can be tested without a gateway:
//! - [`select_match`]: exact matches suppress partial matches.
//! - [`first_email_match`] / [`first_name_match`]: the first textual match
//!   wins when checking for duplicates.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{CandidateSummary, ContactIdentifier, ContactRecord, ContactSummary, PersonId};
use crate::errors::CrmError;
use crate::gateway::PersonGateway;

/// Outcome of matching an identifier against one page of search results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Single(PersonId),
    Ambiguous(Vec<CandidateSummary>),
    Empty,
}

/// Keeps the first occurrence of each id, preserving upstream order.
pub fn dedup_by_id(results: &[ContactSummary]) -> Vec<&ContactSummary> {
    let mut seen = HashSet::new();
    results.iter().filter(|summary| seen.insert(summary.id)).collect()
}

/// Results whose name or any email equals `identifier`, ignoring case.
pub fn exact_matches<'a>(
    identifier: &str,
    results: &'a [ContactSummary],
) -> Vec<&'a ContactSummary> {
    dedup_by_id(results)
        .into_iter()
        .filter(|summary| summary.has_email(identifier) || summary.has_name(identifier))
        .collect()
}

pub fn candidates_from(matches: &[&ContactSummary]) -> Vec<CandidateSummary> {
    matches.iter().map(|summary| CandidateSummary::from(*summary)).collect()
}

/// Exact matches take priority and hide partial matches. Partial matches are
/// only considered when nothing matched exactly.
pub fn select_match(identifier: &str, results: &[ContactSummary]) -> Selection {
    let exact = exact_matches(identifier, results);
    let pool = if exact.is_empty() { dedup_by_id(results) } else { exact };

    match pool.as_slice() {
        [] => Selection::Empty,
        [only] => Selection::Single(only.id),
        many => Selection::Ambiguous(candidates_from(many)),
    }
}

pub fn first_email_match<'a>(
    email: &str,
    results: &'a [ContactSummary],
) -> Option<&'a ContactSummary> {
    results.iter().find(|summary| summary.has_email(email))
}

pub fn first_name_match<'a>(
    name: &str,
    results: &'a [ContactSummary],
) -> Option<&'a ContactSummary> {
    results.iter().find(|summary| summary.has_name(name))
}

#[derive(Clone)]
pub struct ContactResolver {
    gateway: Arc<dyn PersonGateway>,
}

impl ContactResolver {
    pub fn new(gateway: Arc<dyn PersonGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn PersonGateway> {
        &self.gateway
    }

    /// Maps a free-form identifier to exactly one contact.
    ///
    /// Fails with [`CrmError::NotFound`] when nothing matches and with
    /// [`CrmError::MultipleCandidates`] (two or more entries) when the caller
    /// has to disambiguate, typically by retrying with an id.
    pub async fn resolve(&self, identifier: &ContactIdentifier) -> Result<ContactRecord, CrmError> {
        if let Some(id) = identifier.as_person_id() {
            match self.gateway.get_person(id).await {
                Ok(record) => {
                    debug!(
                        event_name = "crm.resolve.by_id",
                        person_id = %id,
                        "identifier resolved as person id"
                    );
                    return Ok(record);
                }
                // digit strings may also be names
                Err(CrmError::NotFound { .. }) => {}
                Err(error) => return Err(error),
            }
        }

        let results = self.gateway.search_persons(identifier.as_str()).await?;
        if results.is_empty() {
            return Err(CrmError::not_found(identifier.as_str()));
        }

        match select_match(identifier.as_str(), &results) {
            Selection::Single(id) => {
                info!(
                    event_name = "crm.resolve.matched",
                    identifier = %identifier,
                    person_id = %id,
                    "identifier resolved to a single contact"
                );
                self.gateway.get_person(id).await
            }
            Selection::Ambiguous(candidates) => {
                info!(
                    event_name = "crm.resolve.ambiguous",
                    identifier = %identifier,
                    candidate_count = candidates.len(),
                    "identifier matched multiple contacts"
                );
                Err(CrmError::MultipleCandidates { candidates })
            }
            Selection::Empty => Err(CrmError::not_found(identifier.as_str())),
        }
    }

    /// Looks for an existing contact before a create.
    ///
    /// Email wins over name. Only the first textual match is considered;
    /// `None` means it is safe to create.
    pub async fn check_duplicate(
        &self,
        name: &str,
        email: Option<&str>,
    ) -> Result<Option<ContactRecord>, CrmError> {
        let mut found = None;

        if let Some(email) = email.filter(|value| !value.is_empty()) {
            let results = self.gateway.search_persons(email).await?;
            found = first_email_match(email, &results).map(|summary| summary.id);
        }

        if found.is_none() {
            let results = self.gateway.search_persons(name).await?;
            found = first_name_match(name, &results).map(|summary| summary.id);
        }

        let Some(id) = found else {
            return Ok(None);
        };

        match self.gateway.get_person(id).await {
            Ok(record) => {
                info!(
                    event_name = "crm.duplicate.found",
                    person_id = %id,
                    "existing contact matches create request"
                );
                Ok(Some(record))
            }
            Err(CrmError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}
