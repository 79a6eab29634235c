//! Contact endpoints used by the conversational agent.
//!
//! - `POST /crm/contact`: create, returning the existing contact when the
//!   email or name is already known
//! - `POST /crm/contact/note`: attach a note to a contact found by identifier
//! - `PATCH /crm/contact`: update a contact found by identifier
//!
//! Resolution outcomes map to `404` (not found) and `409` (ambiguous, with the
//! candidate list). Invalid input is rejected with `422` before any upstream
//! call; other upstream failures answer `400`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use crmlink_core::validation::{
    validate_identifier, validate_new_contact, validate_note_content, validate_update_fields,
};
use crmlink_core::{CandidateSummary, ContactService, CrmError, NewContact};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct CrmState {
    service: ContactService,
}

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactNoteRequest {
    pub contact_identifier: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub contact_identifier: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse<D> {
    pub success: bool,
    pub message: String,
    pub contact_id: u64,
    pub contact_url: String,
    pub data: D,
}

#[derive(Debug, Serialize)]
pub struct ContactData {
    pub id: u64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_new: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdatedContactData {
    pub id: u64,
    pub name: String,
    pub updated_fields: Map<String, Value>,
    pub update_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub success: bool,
    pub message: String,
    pub note_id: u64,
    pub data: NoteData,
}

#[derive(Debug, Serialize)]
pub struct NoteData {
    pub note_id: u64,
    pub contact_id: u64,
    pub contact_name: String,
    pub content: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub error_class: &'static str,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CandidateSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(service: ContactService) -> Router {
    Router::new()
        .route("/crm/contact", post(create_contact).patch(update_contact))
        .route("/crm/contact/note", post(add_contact_note))
        .with_state(CrmState { service })
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn map_crm_error(error: CrmError, correlation_id: &str) -> ApiError {
    let error_class = error.error_class();
    let message = error.to_string();
    let mut body = ErrorBody {
        success: false,
        error: message,
        error_class,
        correlation_id: correlation_id.to_string(),
        contact_identifier: None,
        candidates: None,
        details: None,
    };

    let status = match error {
        CrmError::NotFound { identifier } => {
            info!(
                event_name = "crm.request.not_found",
                correlation_id,
                identifier = %identifier,
                "contact could not be resolved"
            );
            body.contact_identifier = Some(identifier);
            StatusCode::NOT_FOUND
        }
        CrmError::MultipleCandidates { candidates } => {
            info!(
                event_name = "crm.request.ambiguous",
                correlation_id,
                candidate_count = candidates.len(),
                "contact identifier needs disambiguation"
            );
            body.error = "multiple contacts match; specify which one using its id".to_string();
            body.candidates = Some(candidates);
            StatusCode::CONFLICT
        }
        CrmError::Validation { field, message } => {
            body.details = Some(json!({ "field": field, "message": message }));
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CrmError::Upstream { status, body: upstream_body } => {
            warn!(
                event_name = "crm.request.upstream_error",
                correlation_id,
                upstream_status = status,
                "upstream CRM rejected the call"
            );
            body.details = Some(json!({ "status_code": status, "detail": upstream_body }));
            StatusCode::BAD_REQUEST
        }
        CrmError::Connection { cause } => {
            warn!(
                event_name = "crm.request.connection_error",
                correlation_id,
                cause = %cause,
                "upstream CRM unreachable"
            );
            body.details = Some(json!({ "cause": cause }));
            StatusCode::BAD_REQUEST
        }
    };

    (status, Json(body))
}

/// Every body rejection, syntax errors included, is a `422`.
fn map_rejection(rejection: JsonRejection, correlation_id: &str) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorBody {
            success: false,
            error: rejection.body_text(),
            error_class: "validation_error",
            correlation_id: correlation_id.to_string(),
            contact_identifier: None,
            candidates: None,
            details: None,
        }),
    )
}

pub async fn create_contact(
    State(state): State<CrmState>,
    payload: Result<Json<CreateContactRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ContactResponse<ContactData>>), ApiError> {
    let correlation_id = correlation_id();
    let Json(request) = payload.map_err(|rejection| map_rejection(rejection, &correlation_id))?;
    let contact = validate_new_contact(NewContact {
        name: request.name,
        email: request.email,
        phone: request.phone,
    })
    .map_err(|error| map_crm_error(error, &correlation_id))?;

    let outcome = state
        .service
        .create_contact(&contact)
        .await
        .map_err(|error| map_crm_error(error, &correlation_id))?;

    let record = &outcome.record;
    let message = if outcome.is_new {
        format!("contact '{}' created", record.name)
    } else {
        format!("contact '{}' already exists; returning the existing contact", contact.name)
    };

    Ok((
        StatusCode::CREATED,
        Json(ContactResponse {
            success: true,
            message,
            contact_id: record.id.0,
            contact_url: state.service.person_url(record),
            data: ContactData {
                id: record.id.0,
                name: record.name.clone(),
                email: record.primary_email().map(str::to_string),
                phone: record.primary_phone().map(str::to_string),
                is_new: outcome.is_new,
            },
        }),
    ))
}

pub async fn add_contact_note(
    State(state): State<CrmState>,
    payload: Result<Json<ContactNoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NoteResponse>), ApiError> {
    let correlation_id = correlation_id();
    let Json(request) = payload.map_err(|rejection| map_rejection(rejection, &correlation_id))?;
    let identifier = validate_identifier(&request.contact_identifier)
        .and_then(|identifier| validate_note_content(&request.content).map(|()| identifier))
        .map_err(|error| map_crm_error(error, &correlation_id))?;

    let outcome = state
        .service
        .add_note(&identifier, &request.content)
        .await
        .map_err(|error| map_crm_error(error, &correlation_id))?;

    Ok((
        StatusCode::CREATED,
        Json(NoteResponse {
            success: true,
            message: format!("note added to contact '{}'", outcome.contact.name),
            note_id: outcome.note.id,
            data: NoteData {
                note_id: outcome.note.id,
                contact_id: outcome.contact.id.0,
                contact_name: outcome.contact.name,
                content: request.content,
                created_at: outcome.note.created_at,
            },
        }),
    ))
}

pub async fn update_contact(
    State(state): State<CrmState>,
    payload: Result<Json<UpdateContactRequest>, JsonRejection>,
) -> Result<Json<ContactResponse<UpdatedContactData>>, ApiError> {
    let correlation_id = correlation_id();
    let Json(request) = payload.map_err(|rejection| map_rejection(rejection, &correlation_id))?;
    let identifier = validate_identifier(&request.contact_identifier)
        .and_then(|identifier| validate_update_fields(&request.fields).map(|()| identifier))
        .map_err(|error| map_crm_error(error, &correlation_id))?;

    let outcome = state
        .service
        .update_contact(&identifier, &request.fields)
        .await
        .map_err(|error| map_crm_error(error, &correlation_id))?;

    Ok(Json(ContactResponse {
        success: true,
        message: format!("contact '{}' updated", outcome.contact.name),
        contact_id: outcome.contact.id.0,
        contact_url: state.service.person_url(&outcome.contact),
        data: UpdatedContactData {
            id: outcome.updated.id.0,
            name: outcome.updated.name,
            updated_fields: request.fields,
            update_time: outcome.updated.update_time,
        },
    }))
}
