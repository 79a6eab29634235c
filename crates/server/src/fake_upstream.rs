//! In-process stand-in for the Pipedrive person and note endpoints, bound to
//! an ephemeral port. Test-only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub const TEST_TOKEN: &str = "test-token";

#[derive(Clone, Debug)]
struct FakePerson {
    id: u64,
    name: String,
    emails: Vec<String>,
    phones: Vec<String>,
    update_time: Option<String>,
}

impl FakePerson {
    fn to_json(&self) -> Value {
        let labeled = |values: &[String]| -> Value {
            if values.is_empty() {
                json!([{ "label": "work", "value": "", "primary": true }])
            } else {
                Value::Array(
                    values
                        .iter()
                        .enumerate()
                        .map(|(index, value)| {
                            json!({ "label": "work", "value": value, "primary": index == 0 })
                        })
                        .collect(),
                )
            }
        };
        json!({
            "id": self.id,
            "name": self.name,
            "email": labeled(&self.emails),
            "phone": labeled(&self.phones),
            "add_time": "2024-05-01 08:00:00",
            "update_time": self.update_time,
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeCrm {
    persons: Vec<FakePerson>,
    notes: Vec<(u64, String)>,
    hits: HashMap<&'static str, usize>,
    search_failure: Option<u16>,
    write_failure: Option<u16>,
    transient_get_failures: usize,
    get_delay: Option<Duration>,
    reject_notes: bool,
}

impl FakeCrm {
    pub fn with_person(mut self, id: u64, name: &str, emails: &[&str]) -> Self {
        self.persons.push(FakePerson {
            id,
            name: name.to_string(),
            emails: emails.iter().map(|email| email.to_string()).collect(),
            phones: vec![],
            update_time: None,
        });
        self
    }

    pub fn failing_search(mut self, status: u16) -> Self {
        self.search_failure = Some(status);
        self
    }

    pub fn failing_writes(mut self, status: u16) -> Self {
        self.write_failure = Some(status);
        self
    }

    /// The next `count` person lookups answer 503.
    pub fn failing_gets(mut self, count: usize) -> Self {
        self.transient_get_failures = count;
        self
    }

    /// Person lookups answer only after `delay`.
    pub fn slow_gets(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    /// Notes are answered with HTTP 200 and `success: false`.
    pub fn rejecting_notes(mut self) -> Self {
        self.reject_notes = true;
        self
    }

    fn record_hit(&mut self, endpoint: &'static str) {
        *self.hits.entry(endpoint).or_default() += 1;
    }

    fn next_id(&self) -> u64 {
        self.persons.iter().map(|person| person.id).max().unwrap_or(100) + 1
    }
}

type Shared = Arc<Mutex<FakeCrm>>;
type Reply = (StatusCode, Json<Value>);

pub struct FakeUpstream {
    pub base_url: String,
    state: Shared,
}

impl FakeUpstream {
    pub fn hits(&self, endpoint: &str) -> usize {
        self.lock().hits.get(endpoint).copied().unwrap_or(0)
    }

    pub fn notes(&self) -> Vec<(u64, String)> {
        self.lock().notes.clone()
    }

    pub fn person_count(&self) -> usize {
        self.lock().persons.len()
    }

    fn lock(&self) -> MutexGuard<'_, FakeCrm> {
        lock(&self.state)
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, FakeCrm> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub async fn spawn(crm: FakeCrm) -> FakeUpstream {
    let state: Shared = Arc::new(Mutex::new(crm));
    let router = Router::new()
        .route("/persons/search", get(search))
        .route("/persons", post(create))
        .route("/persons/{id}", get(fetch).put(update))
        .route("/notes", post(add_note))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake upstream");
    let address = listener.local_addr().expect("fake upstream address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    FakeUpstream { base_url: format!("http://{address}"), state }
}

fn unauthorized(params: &HashMap<String, String>) -> Option<Reply> {
    if params.get("api_token").map(String::as_str) == Some(TEST_TOKEN) {
        return None;
    }
    Some((
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": "You need to be authorized" })),
    ))
}

fn failure(status: u16, message: &str) -> Reply {
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(json!({ "success": false, "error": message })),
    )
}

async fn search(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    if let Some(reply) = unauthorized(&params) {
        return reply;
    }
    let mut crm = lock(&state);
    crm.record_hit("search");
    if let Some(status) = crm.search_failure {
        return failure(status, "search backend failure");
    }
    if params.get("fields").map(String::as_str) != Some("name,email")
        || params.get("exact_match").map(String::as_str) != Some("false")
    {
        return failure(400, "search must target name,email with exact_match=false");
    }

    let needle = params.get("term").cloned().unwrap_or_default().to_lowercase();
    let items: Vec<Value> = crm
        .persons
        .iter()
        .filter(|person| {
            person.name.to_lowercase().contains(&needle)
                || person.emails.iter().any(|email| email.to_lowercase().contains(&needle))
        })
        .map(|person| {
            json!({
                "result_score": 0.5,
                "item": {
                    "id": person.id,
                    "type": "person",
                    "name": person.name,
                    "emails": person.emails,
                    "phones": person.phones,
                }
            })
        })
        .collect();

    (StatusCode::OK, Json(json!({ "success": true, "data": { "items": items } })))
}

async fn fetch(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    if let Some(reply) = unauthorized(&params) {
        return reply;
    }
    let delay = lock(&state).get_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let mut crm = lock(&state);
    crm.record_hit("get");
    if crm.transient_get_failures > 0 {
        crm.transient_get_failures -= 1;
        return failure(503, "temporarily unavailable");
    }

    match crm.persons.iter().find(|person| person.id == id) {
        Some(person) => {
            (StatusCode::OK, Json(json!({ "success": true, "data": person.to_json() })))
        }
        None => failure(404, "Person not found"),
    }
}

fn values_of(body: &Value, key: &str) -> Vec<String> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("value").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn create(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    if let Some(reply) = unauthorized(&params) {
        return reply;
    }
    let mut crm = lock(&state);
    crm.record_hit("create");
    if let Some(status) = crm.write_failure {
        return failure(status, "service unavailable");
    }

    let person = FakePerson {
        id: crm.next_id(),
        name: body.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        emails: values_of(&body, "email"),
        phones: values_of(&body, "phone"),
        update_time: None,
    };
    let data = person.to_json();
    crm.persons.push(person);
    (StatusCode::CREATED, Json(json!({ "success": true, "data": data })))
}

async fn update(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    if let Some(reply) = unauthorized(&params) {
        return reply;
    }
    let mut crm = lock(&state);
    crm.record_hit("update");
    if let Some(status) = crm.write_failure {
        return failure(status, "service unavailable");
    }

    let Some(person) = crm.persons.iter_mut().find(|person| person.id == id) else {
        return failure(404, "Person not found");
    };
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        person.name = name.to_string();
    }
    if let Some(phone) = body.get("phone").and_then(Value::as_str) {
        person.phones = vec![phone.to_string()];
    }
    person.update_time = Some("2024-05-02 09:15:00".to_string());
    let data = person.to_json();
    (StatusCode::OK, Json(json!({ "success": true, "data": data })))
}

async fn add_note(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    if let Some(reply) = unauthorized(&params) {
        return reply;
    }
    let mut crm = lock(&state);
    crm.record_hit("note");
    if crm.reject_notes {
        return (StatusCode::OK, Json(json!({ "success": false, "error": "note rejected" })));
    }

    let person_id = body.get("person_id").and_then(Value::as_u64).unwrap_or_default();
    let content = body.get("content").and_then(Value::as_str).unwrap_or_default().to_string();
    crm.notes.push((person_id, content));
    let id = crm.notes.len() as u64;
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": { "id": id, "add_time": "2024-05-03 10:00:00" } })),
    )
}
