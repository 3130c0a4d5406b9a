//! Span helpers for run, interview, task and provider-call scopes

use tracing::Span;

/// Span covering a whole run
///
/// # Example
/// ```
/// use surveyor_telemetry::run_span;
/// let span = run_span(8, 24);
/// let _enter = span.enter();
/// ```
pub fn run_span(interviews: usize, tasks: usize) -> Span {
    tracing::info_span!("survey.run", interviews = interviews, tasks = tasks)
}

/// Span covering one interview, keyed by its stable index
pub fn interview_span(index: usize, model: &str) -> Span {
    tracing::info_span!("survey.interview", interview = index, model = model)
}

pub fn task_span(interview: usize, question: &str) -> Span {
    tracing::debug_span!("survey.task", interview = interview, question = question)
}

/// Span around a single provider attempt
pub fn provider_call_span(provider: &str, model: &str, attempt: u32) -> Span {
    tracing::info_span!(
        "provider.call",
        provider = provider,
        model.name = model,
        attempt = attempt,
        otel.kind = "client"
    )
}
