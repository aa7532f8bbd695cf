//! In-memory transport used by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio::sync::Notify;

use crate::error::{FetchError, Result};
use crate::response::HttpResponse;
use crate::transport::{HttpTransport, TransportRequest};

enum Step {
    Respond(u16, String),
    Fail(String),
    Pending,
    Gated(Arc<Notify>, u16, String),
}

/// Replays queued outcomes in order and records every request it sees.
///
/// Once the queue is empty every request gets `200 {}`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub(crate) fn push_ok(&self, status: u16, body: &str) {
        self.push(Step::Respond(status, body.to_string()));
    }

    pub(crate) fn push_err(&self, message: &str) {
        self.push(Step::Fail(message.to_string()));
    }

    /// A request that never settles on its own.
    pub(crate) fn push_pending(&self) {
        self.push(Step::Pending);
    }

    /// A request that settles with `status`/`body` once the returned gate is opened.
    pub(crate) fn push_gated(&self, status: u16, body: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(Step::Gated(gate.clone(), status, body.to_string()));
        gate
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn respond(url: &str, status: u16, body: String) -> HttpResponse {
    HttpResponse::new(
        StatusCode::from_u16(status).unwrap(),
        url,
        HeaderMap::new(),
        Bytes::from(body),
    )
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: TransportRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(respond(&url, 200, "{}".to_string())),
            Some(Step::Respond(status, body)) => Ok(respond(&url, status, body)),
            Some(Step::Fail(message)) => Err(FetchError::Transport(message)),
            Some(Step::Pending) => std::future::pending().await,
            Some(Step::Gated(gate, status, body)) => {
                gate.notified().await;
                Ok(respond(&url, status, body))
            }
        }
    }
}
