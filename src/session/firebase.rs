//! Firebase-backed session client (Cloud Firestore + Cloud Storage REST).
//!
//! Talks to the same REST surface the student page uses, relying on the
//! session-scoped security rules of the project; the service account file
//! only contributes the project id for endpoint addressing. All calls are
//! blocking `ureq` requests hopped onto the blocking thread pool.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::time::Duration;

use super::{SessionClient, SessionError, SessionResult, SessionSnapshot, SlidePointer, TapResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct FirebaseSessionClient {
    project_id: String,
    bucket: String,
    agent: ureq::Agent,
}

impl FirebaseSessionClient {
    pub fn new(project_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            bucket: bucket.into(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    fn session_doc_url(&self, session_id: &str) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents/sessions/{}",
            self.project_id,
            urlencoding::encode(session_id)
        )
    }

    fn responses_url(&self, session_id: &str, slide_index: u64) -> String {
        format!(
            "{}/slides/{}/responses?pageSize=300",
            self.session_doc_url(session_id),
            slide_index
        )
    }

    fn storage_object_name(session_id: &str, slide_index: u64, taken_at: DateTime<Utc>) -> String {
        format!(
            "sessions/{}/slides/{:04}_{}.jpg",
            session_id,
            slide_index,
            taken_at.format("%Y%m%d_%H%M%S%3f")
        )
    }

    fn storage_upload_url(&self, object_name: &str) -> String {
        format!(
            "https://firebasestorage.googleapis.com/v0/b/{}/o?uploadType=media&name={}",
            self.bucket,
            urlencoding::encode(object_name)
        )
    }

    fn storage_download_url(&self, object_name: &str, token: Option<&str>) -> String {
        let base = format!(
            "https://firebasestorage.googleapis.com/v0/b/{}/o/{}?alt=media",
            self.bucket,
            urlencoding::encode(object_name)
        );
        match token {
            Some(token) => format!("{base}&token={token}"),
            None => base,
        }
    }
}

fn map_ureq(err: ureq::Error) -> SessionError {
    match err {
        ureq::Error::Status(status, response) => SessionError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        other => SessionError::Transport(other.to_string()),
    }
}

/// Run one blocking REST call on the blocking pool.
async fn blocking<T, F>(op: F) -> SessionResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SessionResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| SessionError::Join(e.to_string()))?
}

// ---------------------------------------------------------------------------
// Firestore value encoding/decoding
//
// Firestore's REST representation wraps every value in a typed envelope
// ({"integerValue": "3"} and friends); only the handful of shapes the session
// document uses are covered here.
// ---------------------------------------------------------------------------

fn fv_str(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn fv_int(value: u64) -> Value {
    json!({ "integerValue": value.to_string() })
}

fn fv_timestamp(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

fn fv_str_array(values: &[String]) -> Value {
    json!({ "arrayValue": { "values": values.iter().map(|v| fv_str(v)).collect::<Vec<_>>() } })
}

fn fv_map(entries: Vec<(&str, Value)>) -> Value {
    let mut fields = serde_json::Map::new();
    for (key, value) in entries {
        fields.insert(key.to_string(), value);
    }
    json!({ "mapValue": { "fields": fields } })
}

fn field_int(fields: &Value, name: &str) -> Option<u64> {
    let value = fields.get(name)?;
    if let Some(s) = value.get("integerValue").and_then(Value::as_str) {
        return s.parse().ok();
    }
    value.get("doubleValue").and_then(Value::as_f64).map(|f| f as u64)
}

fn field_double(fields: &Value, name: &str) -> Option<f64> {
    let value = fields.get(name)?;
    if let Some(f) = value.get("doubleValue").and_then(Value::as_f64) {
        return Some(f);
    }
    value
        .get("integerValue")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn field_str_array(fields: &Value, name: &str) -> Vec<String> {
    fields
        .get(name)
        .and_then(|v| v.get("arrayValue"))
        .and_then(|v| v.get("values"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.get("stringValue").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_session_document(doc: &Value) -> SessionSnapshot {
    let fields = doc.get("fields").cloned().unwrap_or(Value::Null);
    SessionSnapshot {
        slide_index: field_int(&fields, "slideIndex"),
        slides: field_str_array(&fields, "slides"),
    }
}

fn parse_response_document(doc: &Value, slide_index: u64) -> Option<TapResponse> {
    let name = doc.get("name")?.as_str()?;
    let id = name.rsplit('/').next()?.to_string();

    let fields = doc.get("fields")?;
    let x = field_double(fields, "x")?;
    let y = field_double(fields, "y")?;

    let created_at = doc
        .get("createTime")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;

    Some(TapResponse {
        id,
        slide_index,
        x,
        y,
        created_at,
    })
}

#[async_trait]
impl SessionClient for FirebaseSessionClient {
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionSnapshot> {
        let agent = self.agent.clone();
        let url = self.session_doc_url(session_id);

        blocking(move || match agent.get(&url).call() {
            Ok(response) => {
                let doc: Value = response
                    .into_json()
                    .map_err(|e| SessionError::Malformed(e.to_string()))?;
                Ok(parse_session_document(&doc))
            }
            // A session that has never captured a slide has no document yet.
            Err(ureq::Error::Status(404, _)) => Ok(SessionSnapshot::default()),
            Err(err) => Err(map_ureq(err)),
        })
        .await
    }

    async fn upload_image(
        &self,
        session_id: &str,
        slide_index: u64,
        bytes: Vec<u8>,
    ) -> SessionResult<String> {
        let object_name = Self::storage_object_name(session_id, slide_index, Utc::now());
        let upload_url = self.storage_upload_url(&object_name);
        let this = self.clone();

        blocking(move || {
            let response = this
                .agent
                .post(&upload_url)
                .set("Content-Type", "image/jpeg")
                .send_bytes(&bytes)
                .map_err(map_ureq)?;

            let body: Value = response
                .into_json()
                .map_err(|e| SessionError::Malformed(e.to_string()))?;
            let token = body
                .get("downloadTokens")
                .and_then(Value::as_str)
                // Multiple tokens come comma-separated; any one works.
                .and_then(|tokens| tokens.split(',').next());

            Ok(this.storage_download_url(&object_name, token))
        })
        .await
    }

    async fn set_current_slide(
        &self,
        session_id: &str,
        pointer: &SlidePointer,
        slides: &[String],
    ) -> SessionResult<()> {
        let url = format!(
            "{}?updateMask.fieldPaths=slides&updateMask.fieldPaths=slideIndex\
             &updateMask.fieldPaths=screenshotMeta&updateMask.fieldPaths=lastUpdated",
            self.session_doc_url(session_id)
        );

        let body = json!({
            "fields": {
                "slides": fv_str_array(slides),
                "slideIndex": fv_int(pointer.slide_index),
                "screenshotMeta": fv_map(vec![
                    ("width", fv_int(pointer.width as u64)),
                    ("height", fv_int(pointer.height as u64)),
                    ("monitorIndex", fv_int(pointer.monitor_index as u64)),
                ]),
                "lastUpdated": fv_timestamp(pointer.updated_at),
            }
        });

        let agent = self.agent.clone();
        blocking(move || {
            agent
                .request("PATCH", &url)
                .set("Content-Type", "application/json")
                .send_json(body)
                .map_err(map_ureq)?;
            Ok(())
        })
        .await
    }

    async fn fetch_tap_responses(
        &self,
        session_id: &str,
        slide_index: u64,
    ) -> SessionResult<Vec<TapResponse>> {
        let agent = self.agent.clone();
        let url = self.responses_url(session_id, slide_index);

        blocking(move || match agent.get(&url).call() {
            Ok(response) => {
                let body: Value = response
                    .into_json()
                    .map_err(|e| SessionError::Malformed(e.to_string()))?;
                let documents = body
                    .get("documents")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                Ok(documents
                    .iter()
                    .filter_map(|doc| parse_response_document(doc, slide_index))
                    .collect())
            }
            // No responses collection yet for this slide.
            Err(ureq::Error::Status(404, _)) => Ok(Vec::new()),
            Err(err) => Err(map_ureq(err)),
        })
        .await
    }
}
