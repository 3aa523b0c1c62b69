//! Scripted [`GenerationService`] for tests. Records every request it sees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{GenerationError, GenerationRequest, GenerationResponse, GenerationService};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Empty,
    Timeout,
    RateLimited,
    Api(u16, String),
    Malformed(String),
    /// Fixed JSON object per flow name.
    PerFlow(Vec<(String, Value)>),
}

#[derive(Clone)]
pub struct StubGenerationService {
    reply: Reply,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl StubGenerationService {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn replying_json(value: Value) -> Self {
        Self::new(Reply::Text(value.to_string()))
    }

    pub fn replying_text(text: impl Into<String>) -> Self {
        Self::new(Reply::Text(text.into()))
    }

    pub fn replying_nothing() -> Self {
        Self::new(Reply::Empty)
    }

    pub fn timing_out() -> Self {
        Self::new(Reply::Timeout)
    }

    pub fn rate_limited() -> Self {
        Self::new(Reply::RateLimited)
    }

    pub fn failing(status: u16, message: impl Into<String>) -> Self {
        Self::new(Reply::Api(status, message.into()))
    }

    /// A 200 reply whose envelope could not be read.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(Reply::Malformed(reason.into()))
    }

    /// Replies with a fixed JSON object per flow name.
    pub fn per_flow(replies: Vec<(&str, Value)>) -> Self {
        Self::new(Reply::PerFlow(
            replies
                .into_iter()
                .map(|(flow, value)| (flow.to_string(), value))
                .collect(),
        ))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationService for StubGenerationService {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            Reply::Text(text) => Ok(GenerationResponse::text(text.clone())),
            Reply::Empty => Ok(GenerationResponse::default()),
            Reply::Timeout => Err(GenerationError::Timeout(Duration::from_secs(120))),
            Reply::RateLimited => Err(GenerationError::RateLimited),
            Reply::Api(status, message) => Err(GenerationError::Api {
                status: *status,
                message: message.clone(),
            }),
            Reply::Malformed(reason) => Err(GenerationError::MalformedResponse(reason.clone())),
            Reply::PerFlow(replies) => replies
                .iter()
                .find(|(flow, _)| *flow == request.flow)
                .map(|(_, value)| GenerationResponse::text(value.to_string()))
                .ok_or_else(|| GenerationError::Api {
                    status: 404,
                    message: format!("no scripted reply for {}", request.flow),
                }),
        }
    }
}
