use surveyor_cli::{Study, commands};

const STUDY: &str = r#"{
    "survey": {
        "questions": [
            {"name": "likes", "text": "Do you like {{ product }}?",
             "question_type": "multiple_choice", "options": ["Yes", "No"]},
            {"name": "why", "text": "Why did you say {{ likes.answer }}?",
             "question_type": "free_text"},
            {"name": "spend", "text": "How much per week?", "question_type": "numeric",
             "min_value": 0, "max_value": 50}
        ],
        "stop_rules": [{"question": "likes", "condition": "likes == 'No'"}]
    },
    "scenarios": [{"product": "tea"}, {"product": "coffee"}],
    "agents": [{"name": "ada", "traits": {"age": 36}}, {"traits": {"age": 61}}],
    "models": [{"provider": "mock", "name": "small"}],
    "iterations": 2
}"#;

fn study() -> Study {
    Study::from_json_str(STUDY).unwrap()
}

#[test]
fn validate_lists_questions_in_order() {
    let report = commands::validate(study()).unwrap();
    assert!(report.starts_with("Survey is valid: 3 question(s)"));
    assert!(report.contains("why (free_text) after likes"));
}

#[test]
fn plan_counts_interviews_and_tasks() {
    let report = commands::plan(study()).unwrap();
    assert!(report.contains("Interviews: 8"));
    assert!(report.contains("Tasks:      24"));
    assert!(report.contains("  answer.spend"));
    assert!(report.contains("  task_status.why"));
    assert!(report.contains("  agent.age"));
    assert!(report.contains("  scenario.product"));
}

#[tokio::test]
async fn dry_run_writes_results_and_fills_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache.jsonl");
    let output = dir.path().join("results.json");

    let report = commands::dry_run(study(), None, Some(&cache), Some(&output)).await.unwrap();
    assert!(report.contains("Interviews: 8"), "{}", report);

    let written = std::fs::read_to_string(&output).unwrap();
    let written: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(written["results"]["rows"].as_array().unwrap().len(), 8);
    assert!(written["exceptions"].as_array().unwrap().is_empty());

    let stats = commands::cache_stats(&cache).await.unwrap();
    assert!(stats.contains("mock/small"), "{}", stats);

    let report = commands::dry_run(study(), None, Some(&cache), None).await.unwrap();
    assert!(report.contains("Provider calls: 0"), "{}", report);
}

#[tokio::test]
async fn cache_stats_rejects_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(commands::cache_stats(&dir.path().join("missing.jsonl")).await.is_err());
}
