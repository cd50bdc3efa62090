use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use grasp_core::errors::InvocationError;
use grasp_core::invoker::ModelInvoker;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this raw text.
    Text(String),
    /// Fail the invocation.
    Error(InvocationError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn quiet() -> Self {
        Self::Text(r#"{"shouldIntervene": false, "reason": "nothing to add", "message": ""}"#.into())
    }

    pub fn intervene(message: &str) -> Self {
        Self::Text(
            serde_json::json!({
                "shouldIntervene": true,
                "reason": "mock",
                "message": message,
            })
            .to_string(),
        )
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// A recorded call: when it started and what prompt it carried.
#[derive(Clone, Debug)]
pub struct MockCall {
    pub at: Instant,
    pub prompt: String,
}

/// Mock invoker that returns queued responses in order, then repeats a
/// fallback once the queue is drained.
pub struct MockInvoker {
    queue: Mutex<VecDeque<MockResponse>>,
    fallback: MockResponse,
    calls: Mutex<Vec<MockCall>>,
    call_count: AtomicUsize,
}

impl MockInvoker {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            fallback: MockResponse::Error(InvocationError::Transport(
                "MockInvoker: no response configured".into(),
            )),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Answer every call with the same response.
    pub fn always(response: MockResponse) -> Self {
        let mut mock = Self::new(Vec::new());
        mock.fallback = response;
        mock
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Calls whose prompt contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelInvoker for MockInvoker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, InvocationError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push(MockCall {
            at: Instant::now(),
            prompt: prompt.to_string(),
        });

        let response = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        resolve_response(response).await
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: MockResponse) -> Result<String, InvocationError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Text(text) => return Ok(text),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
