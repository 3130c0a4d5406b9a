use std::sync::Arc;
use std::time::Duration;
use surveyor_core::{LanguageModel, ModelRequest, ModelSpec, ProviderError, TaskError};
use surveyor_model::{MockModel, ProviderRegistry, RetryPolicy, execute_with_retry};
use tokio_util::sync::CancellationToken;

fn request() -> ModelRequest {
    ModelRequest {
        system_prompt: "You are answering questions as if you were a human.".into(),
        user_prompt: "Do you like tea?".into(),
        model: ModelSpec::new("mock", "test-model"),
        question: "likes".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_through_registry() {
    let mock = Arc::new(
        MockModel::new("test-model")
            .with_text("Yes")
            .with_failures(2, ProviderError::timeout("slow")),
    );
    let registry = ProviderRegistry::new().with("mock", mock.clone());
    let model = registry.get("mock").unwrap();

    let policy = RetryPolicy::default().with_initial_delay(Duration::from_millis(100));
    let outcome = execute_with_retry(&policy, &CancellationToken::new(), |_| {
        let model = Arc::clone(&model);
        async move { model.invoke(request()).await }
    })
    .await;

    assert_eq!(outcome.result.unwrap().answer_text, "Yes");
    assert_eq!(outcome.attempts, 3);
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn fatal_failures_stop_after_one_attempt() {
    let mock = Arc::new(
        MockModel::new("test-model").always_failing(ProviderError::authentication("bad key")),
    );

    let outcome = execute_with_retry(&RetryPolicy::default(), &CancellationToken::new(), |_| {
        let mock = Arc::clone(&mock);
        async move { mock.invoke(request()).await }
    })
    .await;

    let err: TaskError = outcome.result.unwrap_err().into();
    assert!(matches!(err, TaskError::ProviderFatal(_)));
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn unknown_provider_is_unsupported() {
    let registry = ProviderRegistry::new();
    let err = registry.get("nope").err().unwrap();
    assert!(!err.retryable);
}
