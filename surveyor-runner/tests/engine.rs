use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use surveyor_cache::{CacheEntry, CacheKey, MemoryCache, ResponseCache};
use surveyor_core::{
    Agent, AnswerContext, ErrorKind, ModelRequest, ModelResponse, ModelSpec, ProviderError,
    Question, Scenario, Survey, Usage, render_prompt,
};
use surveyor_model::{MockModel, ProviderRegistry};
use surveyor_runner::{Job, RetryConfig, RunConfig, RunEvent, Runner};
use tokio_util::sync::CancellationToken;

fn runner(mock: Arc<MockModel>, config: RunConfig) -> Runner {
    Runner::new(config, ProviderRegistry::new().with("mock", mock))
}

fn by_question(answers: &'static [(&'static str, &'static str)]) -> MockModel {
    MockModel::new("m").with_responder(move |request: &ModelRequest, _| {
        let text = answers
            .iter()
            .find(|(q, _)| *q == request.question)
            .map_or("unexpected", |(_, a)| *a);
        Ok(ModelResponse::new(text).with_usage(Usage::new(10, 2, 0.001)))
    })
}

fn likes_survey() -> Survey {
    Survey::builder()
        .question(Question::multiple_choice("likes", "Do you like {{ product }}?", ["Yes", "No"]))
        .question(
            Question::free_text("why", "Why do you answer {{ likes.answer }}?")
                .with_skip_if("likes == 'No'"),
        )
        .build()
        .unwrap()
}

fn single_question(question: Question) -> Survey {
    Survey::builder().question(question).build().unwrap()
}

fn on_mock(survey: Survey) -> Job {
    Job::new(survey).by_models([ModelSpec::new("mock", "m")])
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig { max_attempts, initial_delay_ms: 1, max_delay_ms: 2, backoff_multiplier: 2.0 }
}

fn count(values: &[Value], expected: &Value) -> usize {
    values.iter().filter(|v| *v == expected).count()
}

#[tokio::test]
async fn one_row_per_agent_scenario_model() {
    let survey = single_question(Question::free_text("describe", "Describe {{ product }}."));
    let job = Job::new(survey)
        .by_agents([Agent::named("a1"), Agent::named("a2")])
        .by_scenarios([Scenario::new().with("product", "tea")])
        .by_models([ModelSpec::new("mock", "m1"), ModelSpec::new("mock", "m2")]);
    let mock = Arc::new(MockModel::new("m").with_text("Warm and bitter"));

    let output = runner(mock.clone(), RunConfig::default()).run(&job).await.unwrap();

    assert_eq!(output.results.len(), 4);
    assert_eq!(
        output.results.column("interview.index").unwrap(),
        &[json!(0), json!(1), json!(2), json!(3)]
    );
    assert_eq!(
        output.results.column("model.model").unwrap(),
        &[json!("m1"), json!("m2"), json!("m1"), json!("m2")]
    );
    assert_eq!(output.results.answers("describe").unwrap()[0], json!("Warm and bitter"));
    assert_eq!(mock.call_count(), 4);
    assert!(output.is_clean());
    assert_eq!(output.summary.succeeded, 4);
}

#[tokio::test]
async fn cached_response_skips_provider() {
    let survey = Survey::builder()
        .question(Question::multiple_choice("likes", "Do you like tea?", ["Yes", "No"]))
        .build()
        .unwrap();
    let model = ModelSpec::new("mock", "m");
    let none = AnswerContext::new();
    let rendered =
        render_prompt(survey.question(0), &[], &Agent::new(), &Scenario::new(), &none).unwrap();
    let key = CacheKey::derive(&rendered.prompt, &model, 0);
    let cache = Arc::new(MemoryCache::new());
    let response = ModelResponse::new("No\nToo bitter").with_usage(Usage::new(20, 3, 0.01));
    cache.put(CacheEntry::new(key, &model, 0, response)).await.unwrap();

    let mock = Arc::new(MockModel::new("m").with_text("Yes"));
    let job = Job::new(survey).by_models([model]);
    let output =
        runner(mock.clone(), RunConfig::default()).with_cache(cache).run(&job).await.unwrap();

    assert_eq!(mock.call_count(), 0);
    let row = output.results.row(0).unwrap();
    assert_eq!(row.get("answer.likes"), Some(&json!("No")));
    assert_eq!(row.get("comment.likes"), Some(&json!("Too bitter")));
    assert_eq!(row.get("cache_used.likes"), Some(&json!(true)));
    assert_eq!(output.summary.cache_hits, 1);
    assert_eq!(output.summary.provider_calls, 0);
    assert_eq!(output.summary.cached_usage, Usage::new(20, 3, 0.01));
    assert_eq!(output.summary.live_usage, Usage::default());
}

#[tokio::test]
async fn skipped_question_is_never_dispatched() {
    let mock = Arc::new(by_question(&[("likes", "No"), ("why", "Because")]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let job = Job::new(likes_survey())
        .by_scenarios([Scenario::new().with("product", "coffee")])
        .by_models([ModelSpec::new("mock", "m")]);

    let output =
        runner(mock.clone(), RunConfig::default()).with_events(tx).run(&job).await.unwrap();

    let row = output.results.row(0).unwrap();
    assert_eq!(row.get("answer.likes"), Some(&json!("No")));
    assert_eq!(row.get("answer.why"), Some(&Value::Null));
    assert_eq!(row.get("task_status.why"), Some(&json!("skipped")));
    assert_eq!(row.get("error.why"), Some(&Value::Null));
    assert_eq!(row.get("prompt.why_user_prompt"), Some(&Value::Null));
    assert!(output.exceptions.is_empty());

    let requests = mock.requests().await;
    assert!(requests.iter().all(|r| r.question == "likes"));

    let mut dispatched = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RunEvent::TaskDispatched { question, .. } = event {
            dispatched.push(question);
        }
    }
    assert_eq!(dispatched, vec!["likes".to_string()]);
}

#[tokio::test]
async fn answered_question_unblocks_dependent() {
    let mock = Arc::new(by_question(&[("likes", "yes"), ("why", "It is warm")]));
    let job = Job::new(likes_survey())
        .by_scenarios([Scenario::new().with("product", "tea")])
        .by_models([ModelSpec::new("mock", "m")]);

    let output = runner(mock.clone(), RunConfig::default()).run(&job).await.unwrap();

    assert_eq!(output.results.answers("likes").unwrap(), &[json!("Yes")]);
    assert_eq!(output.results.answers("why").unwrap(), &[json!("It is warm")]);
    let requests = mock.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests[1].user_prompt.starts_with("Why do you answer Yes?"));
    assert_eq!(output.summary.live_usage, Usage::new(20, 4, 0.002));
}

#[tokio::test]
async fn transient_failure_is_attempted_max_attempts_times() {
    let survey = single_question(Question::free_text("q", "Anything?"));
    let mock =
        Arc::new(MockModel::new("m").always_failing(ProviderError::rate_limited("HTTP 429")));
    let config = RunConfig::default().with_retry(fast_retry(3));

    let output = runner(mock.clone(), config).run(&on_mock(survey)).await.unwrap();

    assert_eq!(mock.call_count(), 3);
    assert_eq!(output.results.row(0).unwrap().get("task_status.q"), Some(&json!("failed")));
    assert_eq!(output.exceptions.len(), 1);
    let exception = &output.exceptions[0];
    assert_eq!(exception.kind, ErrorKind::ProviderTransient);
    assert_eq!(exception.attempts, 3);
    assert_eq!(exception.question, "q");
    assert_eq!(output.summary.failed, 1);
    assert_eq!(output.summary.complete_interviews, 1);
}

#[tokio::test]
async fn fatal_failure_is_not_retried_and_fails_dependents() {
    let survey = Survey::builder()
        .question(Question::free_text("name", "Name a color."))
        .question(Question::free_text("why", "Why {{ name.answer }}?"))
        .build()
        .unwrap();
    let mock =
        Arc::new(MockModel::new("m").always_failing(ProviderError::authentication("bad key")));

    let output = runner(mock.clone(), RunConfig::default())
        .run(&Job::new(survey).by_models([ModelSpec::new("mock", "m")]))
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 1);
    let kinds: Vec<ErrorKind> = output.exceptions.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::ProviderFatal, ErrorKind::TemplateRender]);
    assert_eq!(output.summary.complete_interviews, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn provider_ceiling_is_never_exceeded() {
    let questions =
        (0..5).map(|i| Question::free_text(format!("q{}", i), format!("Question {}?", i)));
    let survey = Survey::builder().questions(questions).build().unwrap();
    let agents = (0..12).map(|i| Agent::named(format!("a{}", i)).with_trait("id", i));
    let job = Job::new(survey).by_agents(agents).by_models([ModelSpec::new("mock", "m")]);
    let mock = Arc::new(MockModel::new("m").with_text("ok").with_latency(Duration::from_millis(5)));
    let config = RunConfig::default().with_max_concurrency(64).with_provider_concurrency(5);

    let output = runner(mock.clone(), config).run(&job).await.unwrap();

    assert_eq!(job.task_count(), 60);
    assert_eq!(mock.call_count(), 60);
    assert_eq!(output.summary.succeeded, 60);
    assert!(mock.max_in_flight() <= 5, "observed {} concurrent calls", mock.max_in_flight());
    assert!(mock.max_in_flight() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn global_ceiling_applies_across_providers() {
    let survey = single_question(Question::free_text("q", "Anything?"));
    let latency = Duration::from_millis(5);
    let first = Arc::new(MockModel::new("a").with_text("ok").with_latency(latency));
    let second = Arc::new(MockModel::new("b").with_text("ok").with_latency(latency));
    let registry =
        ProviderRegistry::new().with("first", first.clone()).with("second", second.clone());
    let agents = (0..20).map(|i| Agent::new().with_trait("id", i));
    let job = Job::new(survey)
        .by_agents(agents)
        .by_models([ModelSpec::new("first", "a"), ModelSpec::new("second", "b")]);
    let config = RunConfig::default().with_max_concurrency(3).with_provider_concurrency(10);

    let output = Runner::new(config, registry).run(&job).await.unwrap();

    assert_eq!(output.summary.succeeded, 40);
    assert!(first.max_in_flight() + second.max_in_flight() <= 6);
    assert!(first.max_in_flight() <= 3 && second.max_in_flight() <= 3);
}

#[tokio::test]
async fn cancellation_keeps_partial_rows() {
    let survey = Survey::builder()
        .question(Question::free_text("color", "Name a color."))
        .question(Question::free_text("why", "Why {{ color.answer }}?"))
        .build()
        .unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let mock = Arc::new(MockModel::new("m").with_responder(move |_: &ModelRequest, call: u32| {
        if call == 5 {
            trigger.cancel();
        }
        Ok(ModelResponse::new(format!("answer {}", call)))
    }));
    let job = Job::new(survey).by_models([ModelSpec::new("mock", "m")]).with_iterations(5);
    let config = RunConfig::default().with_max_concurrent_interviews(1);

    let output = runner(mock.clone(), config).run_with_cancel(&job, token).await.unwrap();

    let results = &output.results;
    assert_eq!(results.len(), 5);
    assert_eq!(mock.call_count(), 5);
    assert!(output.summary.cancelled);
    assert_eq!(output.summary.complete_interviews, 2);
    assert_eq!(output.summary.incomplete_interviews, 3);

    let complete = results.column("interview.complete").unwrap();
    assert_eq!(count(complete, &json!(true)), 2);

    let incomplete = results.filter(|row| row.get("interview.complete") == Some(&json!(false)));
    let partial = incomplete.filter(|row| row.get("answer.color") != Some(&Value::Null));
    assert_eq!(partial.len(), 1);
    assert_eq!(partial.row(0).unwrap().get("task_status.why"), Some(&json!("pending")));
    assert_eq!(count(incomplete.answers("color").unwrap(), &Value::Null), 2);
}

#[tokio::test]
async fn stop_on_exception_cancels_run() {
    let survey = Survey::builder()
        .question(Question::free_text("first", "First?"))
        .question(Question::free_text("second", "Second {{ first.answer? }}?"))
        .build()
        .unwrap();
    let mock = Arc::new(
        MockModel::new("m").always_failing(ProviderError::invalid_request("bad request")),
    );
    let config =
        RunConfig::default().with_stop_on_exception(true).with_max_concurrent_interviews(1);
    let job = Job::new(survey).by_models([ModelSpec::new("mock", "m")]).with_iterations(3);

    let output = runner(mock.clone(), config).run(&job).await.unwrap();

    assert!(output.summary.cancelled);
    assert_eq!(output.exceptions.len(), 1);
    assert_eq!(mock.call_count(), 1);
    assert_eq!(output.results.len(), 3);
    assert_eq!(output.summary.complete_interviews, 0);
}

#[tokio::test(start_paused = true)]
async fn run_timeout_cancels_remaining_tasks() {
    let survey = Survey::builder()
        .question(Question::free_text("first", "First?"))
        .question(Question::free_text("second", "Second, after {{ first.answer }}?"))
        .build()
        .unwrap();
    let mock = Arc::new(MockModel::new("m").with_text("slow").with_latency(Duration::from_secs(1)));
    let config = RunConfig::default().with_run_timeout(Duration::from_millis(100));

    let output = runner(mock.clone(), config).run(&on_mock(survey)).await.unwrap();

    assert!(output.summary.cancelled);
    assert_eq!(mock.call_count(), 1);
    let row = output.results.row(0).unwrap();
    assert_eq!(row.get("answer.first"), Some(&json!("slow")));
    assert_eq!(row.get("task_status.second"), Some(&json!("pending")));
    assert_eq!(row.get("interview.complete"), Some(&json!(false)));
}

#[tokio::test(start_paused = true)]
async fn slow_provider_call_times_out_and_is_retried() {
    let survey = single_question(Question::free_text("q", "Anything?"));
    let mock =
        Arc::new(MockModel::new("m").with_text("late").with_latency(Duration::from_secs(10)));
    let config =
        RunConfig::default().with_retry(fast_retry(3)).with_task_timeout(Duration::from_secs(1));
    let job = on_mock(survey);

    let output = runner(mock.clone(), config).run(&job).await.unwrap();

    assert_eq!(mock.call_count(), 3);
    assert_eq!(output.summary.provider_calls, 3);
    assert_eq!(output.exceptions.len(), 1);
    assert_eq!(output.exceptions[0].kind, ErrorKind::ProviderTransient);
    assert_eq!(output.exceptions[0].attempts, 3);
    assert_eq!(output.results.row(0).unwrap().get("task_status.q"), Some(&json!("failed")));
    assert!(!output.summary.cancelled);
}

#[tokio::test]
async fn invalid_answer_is_reprompted() {
    let survey = Survey::builder()
        .question(Question::multiple_choice("likes", "Do you like tea?", ["Yes", "No"]))
        .build()
        .unwrap();
    let job = Job::new(survey).by_models([ModelSpec::new("mock", "m")]);
    let responder = |_: &ModelRequest, call: u32| {
        Ok(ModelResponse::new(if call == 1 { "Maybe" } else { "Yes" }))
    };

    let mock = Arc::new(MockModel::new("m").with_responder(responder));
    let config = RunConfig::default().with_validation_retries(1);
    let output = runner(mock.clone(), config).run(&job).await.unwrap();
    assert_eq!(output.results.answers("likes").unwrap(), &[json!("Yes")]);
    let requests = mock.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests[1].user_prompt.contains("Your previous answer could not be used"));
    assert!(output.exceptions.is_empty());

    let mock = Arc::new(MockModel::new("m").with_responder(responder));
    let config = RunConfig::default().with_validation_retries(0);
    let output = runner(mock.clone(), config).run(&job).await.unwrap();
    assert_eq!(mock.call_count(), 1);
    assert_eq!(output.exceptions[0].kind, ErrorKind::Validation);
    let row = output.results.row(0).unwrap();
    assert_eq!(row.get("raw_model_response.likes_raw_model_response"), Some(&json!("Maybe")));
}

#[tokio::test]
async fn direct_answers_and_functional_questions_skip_the_provider() {
    let survey = Survey::builder()
        .question(Question::free_text("mood", "How are you?"))
        .question(Question::functional(
            "product_length",
            "Length",
            |scenario: &Scenario, _: &Agent| {
                let product = scenario.get("product").and_then(Value::as_str).ok_or("no product")?;
                Ok(json!(product.len()))
            },
        ))
        .build()
        .unwrap();
    let agent = Agent::named("scripted").with_direct_answer(
        |question: &Question, _: &Scenario, _: &AnswerContext| {
            Ok::<Value, String>(json!(format!("scripted answer to {}", question.name)))
        },
    );
    let job = Job::new(survey)
        .by_agents([agent])
        .by_scenarios([Scenario::new().with("product", "coffee")])
        .by_models([ModelSpec::new("mock", "m")]);
    let mock = Arc::new(MockModel::new("m"));

    let output = runner(mock.clone(), RunConfig::default()).run(&job).await.unwrap();

    assert_eq!(mock.call_count(), 0);
    let row = output.results.row(0).unwrap();
    assert_eq!(row.get("answer.mood"), Some(&json!("scripted answer to mood")));
    assert_eq!(row.get("answer.product_length"), Some(&json!(6)));
    assert!(output.is_clean());
}

#[tokio::test]
async fn panicking_direct_answer_fails_only_its_task() {
    let survey = single_question(Question::free_text("mood", "How are you?"));
    let broken = Agent::named("broken").with_direct_answer(
        |_: &Question, _: &Scenario, _: &AnswerContext| -> Result<Value, String> { panic!("boom") },
    );
    let job = Job::new(survey)
        .by_agents([Agent::named("steady"), broken])
        .by_models([ModelSpec::new("mock", "m")]);
    let mock = Arc::new(MockModel::new("m").with_text("Fine"));

    let output = runner(mock.clone(), RunConfig::default()).run(&job).await.unwrap();

    assert_eq!(output.results.len(), 2);
    assert_eq!(mock.call_count(), 1);
    assert_eq!(output.results.answers("mood").unwrap(), &[json!("Fine"), Value::Null]);
    assert_eq!(output.results.row(1).unwrap().get("task_status.mood"), Some(&json!("failed")));
    assert_eq!(output.summary.complete_interviews, 2);
    assert_eq!(output.exceptions.len(), 1);
    assert_eq!(output.exceptions[0].interview_index, 1);
    assert_eq!(output.exceptions[0].kind, ErrorKind::DirectAnswer);
    assert!(output.exceptions[0].message.contains("boom"));
}

#[tokio::test]
async fn stop_rule_skips_remaining_questions() {
    let survey = Survey::builder()
        .question(Question::multiple_choice("consent", "May we continue?", ["Yes", "No"]))
        .question(Question::free_text("age", "How old are you?"))
        .question(Question::free_text("city", "Where do you live?"))
        .stop_rule("consent", "consent == 'No'")
        .build()
        .unwrap();
    let mock = Arc::new(by_question(&[("consent", "No"), ("age", "40"), ("city", "Oslo")]));

    let output = runner(mock.clone(), RunConfig::default())
        .run(&Job::new(survey).by_models([ModelSpec::new("mock", "m")]))
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 1);
    let row = output.results.row(0).unwrap();
    assert_eq!(row.get("task_status.age"), Some(&json!("skipped")));
    assert_eq!(row.get("task_status.city"), Some(&json!("skipped")));
    assert_eq!(output.summary.skipped, 2);
}

#[tokio::test]
async fn memory_embeds_prior_question_and_answer() {
    let survey = Survey::builder()
        .question(Question::free_text("color", "Favourite color?"))
        .question(Question::free_text("why", "Why?"))
        .memory("why", ["color"])
        .build()
        .unwrap();
    let mock = Arc::new(by_question(&[("color", "Green"), ("why", "Calm")]));

    runner(mock.clone(), RunConfig::default())
        .run(&Job::new(survey).by_models([ModelSpec::new("mock", "m")]))
        .await
        .unwrap();

    let requests = mock.requests().await;
    let why = requests.iter().find(|r| r.question == "why").unwrap();
    assert!(why.user_prompt.contains("\tQuestion: Favourite color?\n\tAnswer: Green"));
}

#[tokio::test]
async fn read_only_cache_is_not_written() {
    let survey = single_question(Question::free_text("q", "Anything?"));
    let job = Job::new(survey).by_models([ModelSpec::new("mock", "m")]);
    let cache = Arc::new(MemoryCache::new());

    let mock = Arc::new(MockModel::new("m").with_text("ok"));
    let config = RunConfig::default().with_cache_mode(surveyor_runner::CacheMode::ReadOnly);
    runner(mock, config).with_cache(cache.clone()).run(&job).await.unwrap();
    assert_eq!(cache.len().await.unwrap(), 0);

    let mock = Arc::new(MockModel::new("m").with_text("ok"));
    runner(mock, RunConfig::default()).with_cache(cache.clone()).run(&job).await.unwrap();
    assert_eq!(cache.len().await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_provider_is_a_fatal_task_error() {
    let survey = single_question(Question::free_text("q", "Anything?"));
    let mock = Arc::new(MockModel::new("m"));
    let job = Job::new(survey).by_models([ModelSpec::new("missing", "m")]);

    let output = runner(mock.clone(), RunConfig::default()).run(&job).await.unwrap();

    assert_eq!(mock.call_count(), 0);
    assert_eq!(output.exceptions[0].kind, ErrorKind::ProviderFatal);
}
