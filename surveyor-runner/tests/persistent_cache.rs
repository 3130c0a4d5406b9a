use std::sync::Arc;
use surveyor_cache::{JsonlCache, ResponseCache};
use surveyor_core::{Agent, ModelSpec, Question, Scenario, Survey};
use surveyor_model::{MockModel, ProviderRegistry};
use surveyor_runner::{Job, RunConfig, Runner};

fn job() -> Job {
    let survey = Survey::builder()
        .question(Question::multiple_choice("likes", "Do you like {{ product }}?", ["Yes", "No"]))
        .question(Question::free_text("why", "Why {{ likes.answer }}?"))
        .build()
        .unwrap();
    Job::new(survey)
        .by_agents([Agent::new().with_trait("age", 30), Agent::new().with_trait("age", 60)])
        .by_scenarios([Scenario::new().with("product", "tea")])
        .by_models([ModelSpec::new("mock", "m").with_temperature(0.0)])
}

#[tokio::test]
async fn second_run_is_served_from_file_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("responses.jsonl");

    let first = Arc::new(MockModel::new("m").with_text("Yes\nI drink it daily"));
    let cache = Arc::new(JsonlCache::open(&path).await.unwrap());
    let registry = ProviderRegistry::new().with("mock", first.clone());
    let output = Runner::new(RunConfig::default(), registry)
        .with_cache(cache.clone())
        .run(&job())
        .await
        .unwrap();
    assert_eq!(first.call_count(), 4);
    assert_eq!(output.summary.cache_hits, 0);
    assert_eq!(cache.len().await.unwrap(), 4);
    drop(cache);

    let second = Arc::new(MockModel::new("m").with_text("No"));
    let cache = Arc::new(JsonlCache::open(&path).await.unwrap());
    let registry = ProviderRegistry::new().with("mock", second.clone());
    let output = Runner::new(RunConfig::default(), registry)
        .with_cache(cache)
        .run(&job())
        .await
        .unwrap();

    assert_eq!(second.call_count(), 0);
    assert_eq!(output.summary.cache_hits, 4);
    assert_eq!(output.results.answers("likes").unwrap()[1], serde_json::json!("Yes"));
}
