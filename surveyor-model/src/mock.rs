use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use surveyor_core::{LanguageModel, ModelRequest, ModelResponse, ProviderError, Usage};
use tokio::sync::Mutex;

/// Produces a response for a request and its 1-based call number
pub type Responder =
    Arc<dyn Fn(&ModelRequest, u32) -> Result<ModelResponse, ProviderError> + Send + Sync>;

/// Scripted provider for tests and dry runs.
///
/// Records every request and tracks how many calls were in flight at once.
pub struct MockModel {
    name: String,
    responder: Responder,
    latency: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

/// Rough token estimate used for mock usage accounting
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

fn text_response(request: &ModelRequest, text: &str) -> ModelResponse {
    let input = estimate_tokens(&request.system_prompt) + estimate_tokens(&request.user_prompt);
    ModelResponse::new(text).with_usage(Usage::new(input, estimate_tokens(text), 0.0))
}

impl MockModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responder: Arc::new(|request: &ModelRequest, _: u32| {
                Ok(text_response(request, "mock answer"))
            }),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.responder =
            Arc::new(move |request: &ModelRequest, _: u32| Ok(text_response(request, &text)));
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ModelRequest, u32) -> Result<ModelResponse, ProviderError> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Fail the first `count` calls with `error`, then respond as before
    pub fn with_failures(mut self, count: u32, error: ProviderError) -> Self {
        let inner = Arc::clone(&self.responder);
        self.responder = Arc::new(move |request: &ModelRequest, call: u32| {
            if call <= count { Err(error.clone()) } else { inner(request, call) }
        });
        self
    }

    pub fn always_failing(self, error: ProviderError) -> Self {
        self.with_responder(move |_, _| Err(error.clone()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed so far
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.requests.lock().await.push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(&request, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use surveyor_core::ModelSpec;

    fn request(user_prompt: &str) -> ModelRequest {
        ModelRequest {
            system_prompt: "system".into(),
            user_prompt: user_prompt.into(),
            model: ModelSpec::new("mock", "echo"),
            question: "q1".into(),
        }
    }

    #[tokio::test]
    async fn test_mock_model_text() {
        let mock = MockModel::new("echo").with_text("Yes\nI like it");
        let response = mock.invoke(request("Do you like it?")).await.unwrap();
        assert_eq!(response.answer_text, "Yes\nI like it");
        assert!(response.usage.input_tokens > 0);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requests().await[0].user_prompt, "Do you like it?");
    }

    #[tokio::test]
    async fn test_mock_model_failures_then_success() {
        let mock = MockModel::new("flaky")
            .with_text("ok")
            .with_failures(2, ProviderError::rate_limited("429"));
        assert!(mock.invoke(request("a")).await.is_err());
        assert!(mock.invoke(request("a")).await.is_err());
        assert_eq!(mock.invoke(request("a")).await.unwrap().answer_text, "ok");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_model_tracks_concurrency() {
        let mock = MockModel::new("slow").with_latency(Duration::from_millis(50));
        let calls = (0..4).map(|_| mock.invoke(request("x")));
        let results = join_all(calls).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(mock.max_in_flight(), 4);
        assert_eq!(mock.in_flight(), 0);
    }
}
