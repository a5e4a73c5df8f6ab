//! In-memory repositories for tests

use async_trait::async_trait;
use ferry_client::{ClientError, Result};
use ferry_core::dto::search::{CreateSearchJob, SearchJobStatus};
use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{IngestRepository, SearchRepository};

pub fn status(state: &str, message_count: u64) -> SearchJobStatus {
    serde_json::from_value(json!({"state": state, "messageCount": message_count})).unwrap()
}

/// Wraps a JSON record the way the search service returns it
pub fn wrapped(raw: JsonValue) -> JsonValue {
    json!({"map": {"_raw": raw.to_string(), "_messagetime": "1667448300000"}})
}

/// Scripted search service
///
/// Status polls pop from `statuses`; the last status repeats once the script
/// runs out.
pub struct FakeSearch {
    statuses: Mutex<VecDeque<SearchJobStatus>>,
    messages: Vec<JsonValue>,
    pub submitted: Mutex<Vec<CreateSearchJob>>,
    pub polls: Mutex<u32>,
    pub requested_limit: Mutex<Option<u64>>,
    pub deleted: Mutex<Vec<String>>,
    delete_status: Option<u16>,
}

impl FakeSearch {
    pub fn new(statuses: Vec<SearchJobStatus>, messages: Vec<JsonValue>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            messages,
            submitted: Mutex::new(Vec::new()),
            polls: Mutex::new(0),
            requested_limit: Mutex::new(None),
            deleted: Mutex::new(Vec::new()),
            delete_status: None,
        }
    }

    /// Deletes are recorded, then answered with `status`
    pub fn failing_delete(mut self, status: u16) -> Self {
        self.delete_status = Some(status);
        self
    }

    pub fn done_with(messages: Vec<JsonValue>) -> Self {
        let count = messages.len() as u64;
        Self::new(vec![status("DONE GATHERING RESULTS", count)], messages)
    }
}

#[async_trait]
impl SearchRepository for FakeSearch {
    async fn submit(&self, req: &CreateSearchJob) -> Result<String> {
        self.submitted.lock().unwrap().push(req.clone());
        Ok("JOB-1".to_string())
    }

    async fn status(&self, _job_id: &str) -> Result<SearchJobStatus> {
        *self.polls.lock().unwrap() += 1;

        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.pop_front().unwrap())
        } else {
            statuses
                .front()
                .cloned()
                .ok_or_else(|| ClientError::api_error(500, "no status scripted"))
        }
    }

    async fn messages(&self, _job_id: &str, limit: u64) -> Result<Vec<JsonValue>> {
        *self.requested_limit.lock().unwrap() = Some(limit);
        Ok(self.messages.iter().take(limit as usize).cloned().collect())
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(job_id.to_string());
        match self.delete_status {
            Some(status) => Err(ClientError::api_error(status, "delete failed")),
            None => Ok(()),
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Ingestion endpoint that records what it receives
pub struct FakeIngest {
    reply: std::result::Result<String, (u16, String)>,
    on_receive: Option<Hook>,
    pub received: Mutex<Vec<JsonValue>>,
}

impl FakeIngest {
    pub fn accepting() -> Self {
        Self {
            reply: Ok(r#"{"status":"success"}"#.to_string()),
            on_receive: None,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Accepts every envelope, running `hook` as each one arrives
    pub fn accepting_then(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_receive: Some(Box::new(hook)),
            ..Self::accepting()
        }
    }

    pub fn rejecting(status: u16, body: &str) -> Self {
        Self {
            reply: Err((status, body.to_string())),
            on_receive: None,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl IngestRepository for FakeIngest {
    async fn add_events(&self, body: Vec<u8>) -> Result<String> {
        let envelope: JsonValue = serde_json::from_slice(&body).unwrap();
        self.received.lock().unwrap().push(envelope);

        if let Some(hook) = &self.on_receive {
            hook();
        }

        match &self.reply {
            Ok(body) => Ok(body.clone()),
            Err((status, body)) => Err(ClientError::api_error(*status, body.clone())),
        }
    }
}
