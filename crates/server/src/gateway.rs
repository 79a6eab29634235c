//! reqwest-backed [`PersonGateway`] for the Pipedrive v1 REST API.
//!
//! Every call sends `api_token` as a query parameter and is bounded by the
//! client timeout. Searches and person lookups are retried under the
//! configured [`RetryPolicy`]; creates, updates and notes are sent once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use crmlink_core::config::{SearchFailurePolicy, UpstreamConfig};
use crmlink_core::{
    ContactRecord, ContactSummary, CrmError, NewContact, NoteRecord, PersonGateway, PersonId,
    RetryPolicy,
};
use reqwest::{header, Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct PipedriveGateway {
    client: Client,
    base_url: String,
    app_url: String,
    api_token: SecretString,
    retry: RetryPolicy,
    search_failure_policy: SearchFailurePolicy,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    item: SearchItem,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    phones: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PersonData {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Vec<LabeledValue>,
    #[serde(default)]
    phone: Vec<LabeledValue>,
    #[serde(default)]
    add_time: Option<String>,
    #[serde(default)]
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabeledValue {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct NoteData {
    id: u64,
    #[serde(default)]
    add_time: Option<String>,
}

impl From<SearchItem> for ContactSummary {
    fn from(item: SearchItem) -> Self {
        Self {
            id: PersonId(item.id),
            name: item.name.unwrap_or_default(),
            emails: item.emails,
            phones: item.phones,
        }
    }
}

fn non_empty_values(values: Vec<LabeledValue>) -> Vec<String> {
    values.into_iter().map(|entry| entry.value).filter(|value| !value.is_empty()).collect()
}

impl From<PersonData> for ContactRecord {
    fn from(person: PersonData) -> Self {
        Self {
            id: PersonId(person.id),
            name: person.name.unwrap_or_default(),
            emails: non_empty_values(person.email),
            phones: non_empty_values(person.phone),
            add_time: person.add_time,
            update_time: person.update_time,
        }
    }
}

fn connection_error(error: reqwest::Error) -> CrmError {
    let kind = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "request"
    };
    CrmError::Connection { cause: format!("{kind}: {error}") }
}

/// Body of a create request. Absent email or phone keys are omitted.
pub fn create_person_body(contact: &NewContact) -> Value {
    let mut body = json!({ "name": contact.name });
    if let Some(email) = &contact.email {
        body["email"] = json!([{ "value": email }]);
    }
    if let Some(phone) = &contact.phone {
        body["phone"] = json!([{ "value": phone }]);
    }
    body
}

impl PipedriveGateway {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_url: config.app_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            retry: RetryPolicy::from_config(config),
            search_failure_policy: config.search_failure_policy,
        })
    }

    /// Sends one request and returns the decoded JSON body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), CrmError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .query(&[("api_token", self.api_token.expose_secret())])
            .query(query)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(connection_error)?;
        let status = response.status();
        let text = response.text().await.map_err(connection_error)?;
        debug!(
            event_name = "crm.upstream.response",
            method = %method,
            endpoint,
            status = status.as_u16(),
            "upstream call finished"
        );

        if !status.is_success() {
            return Err(CrmError::Upstream { status: status.as_u16(), body: text });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Ok((status, value)),
            Err(_) => Err(CrmError::Upstream { status: status.as_u16(), body: text }),
        }
    }

    /// Unwraps `{success, data}`. `success = false` or a missing `data`
    /// becomes an upstream error carrying the raw body.
    fn unwrap_envelope<T: DeserializeOwned>(
        status: StatusCode,
        value: Value,
    ) -> Result<T, CrmError> {
        let raw = value.to_string();
        let envelope: Envelope<T> = serde_json::from_value(value)
            .map_err(|_| CrmError::Upstream { status: status.as_u16(), body: raw.clone() })?;
        match envelope {
            Envelope { success: true, data: Some(data) } => Ok(data),
            _ => Err(CrmError::Upstream { status: status.as_u16(), body: raw }),
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, CrmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CrmError>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let Some(delay) = self.retry.next_delay(retry, &error) else {
                        return Err(error);
                    };
                    warn!(
                        event_name = "crm.upstream.retry",
                        operation,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error_class = error.error_class(),
                        error = %error,
                        "retrying idempotent upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }

    async fn search_once(&self, term: &str) -> Result<Vec<ContactSummary>, CrmError> {
        let (status, value) = self
            .send(
                Method::GET,
                "persons/search",
                &[("term", term), ("fields", "name,email"), ("exact_match", "false")],
                None,
            )
            .await?;

        let envelope: Envelope<SearchData> = serde_json::from_value(value.clone())
            .map_err(|_| CrmError::Upstream { status: status.as_u16(), body: value.to_string() })?;
        if !envelope.success {
            return Err(CrmError::Upstream { status: status.as_u16(), body: value.to_string() });
        }

        Ok(envelope
            .data
            .map(|data| data.items.into_iter().map(|hit| ContactSummary::from(hit.item)).collect())
            .unwrap_or_default())
    }

    async fn get_once(&self, id: PersonId) -> Result<ContactRecord, CrmError> {
        let endpoint = format!("persons/{id}");
        match self.send(Method::GET, &endpoint, &[], None).await {
            Ok((status, value)) => match Self::unwrap_envelope::<PersonData>(status, value) {
                Ok(person) => Ok(person.into()),
                Err(_) => Err(CrmError::not_found(id.to_string())),
            },
            Err(CrmError::Upstream { status: 404 | 410, .. }) => {
                Err(CrmError::not_found(id.to_string()))
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl PersonGateway for PipedriveGateway {
    async fn search_persons(&self, term: &str) -> Result<Vec<ContactSummary>, CrmError> {
        let result = self.with_retry("search_persons", || self.search_once(term)).await;

        match (result, self.search_failure_policy) {
            (Ok(results), _) => Ok(results),
            (Err(error), SearchFailurePolicy::FailOpen) => {
                warn!(
                    event_name = "crm.search.failed_open",
                    error_class = error.error_class(),
                    error = %error,
                    "upstream search failed; treating as no results"
                );
                Ok(Vec::new())
            }
            (Err(error), SearchFailurePolicy::FailClosed) => Err(error),
        }
    }

    async fn get_person(&self, id: PersonId) -> Result<ContactRecord, CrmError> {
        self.with_retry("get_person", || self.get_once(id)).await
    }

    async fn create_person(&self, contact: &NewContact) -> Result<ContactRecord, CrmError> {
        let body = create_person_body(contact);
        let (status, value) = self.send(Method::POST, "persons", &[], Some(&body)).await?;
        Self::unwrap_envelope::<PersonData>(status, value).map(ContactRecord::from)
    }

    async fn update_person(
        &self,
        id: PersonId,
        fields: &Map<String, Value>,
    ) -> Result<ContactRecord, CrmError> {
        let body = Value::Object(fields.clone());
        let endpoint = format!("persons/{id}");
        let (status, value) = self.send(Method::PUT, &endpoint, &[], Some(&body)).await?;
        Self::unwrap_envelope::<PersonData>(status, value).map(ContactRecord::from)
    }

    async fn add_note(&self, person_id: PersonId, content: &str) -> Result<NoteRecord, CrmError> {
        let body = json!({ "content": content, "person_id": person_id.0 });
        let (status, value) = self.send(Method::POST, "notes", &[], Some(&body)).await?;
        let note = Self::unwrap_envelope::<NoteData>(status, value)?;
        Ok(NoteRecord { id: note.id, created_at: note.add_time })
    }

    fn person_url(&self, id: PersonId) -> String {
        format!("{}/person/{id}", self.app_url)
    }
}
