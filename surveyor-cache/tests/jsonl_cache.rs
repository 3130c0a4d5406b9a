use std::io::Write;
use surveyor_cache::{CacheEntry, CacheKey, JsonlCache, ResponseCache};
use surveyor_core::{ModelResponse, ModelSpec, RenderedPrompt, Usage};

fn entry(user: &str, answer: &str) -> CacheEntry {
    let model = ModelSpec::new("mock", "m").with_temperature(0.0);
    let prompt = RenderedPrompt { system_prompt: "system".into(), user_prompt: user.into() };
    let response = ModelResponse::new(answer).with_usage(Usage::new(12, 3, 0.002));
    CacheEntry::new(CacheKey::derive(&prompt, &model, 0), &model, 0, response)
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.jsonl");

    let cache = JsonlCache::open(&path).await.unwrap();
    assert!(cache.is_empty().await.unwrap());
    assert!(cache.put(entry("q1", "yes")).await.unwrap());
    assert!(cache.put(entry("q2", "no")).await.unwrap());
    assert!(!cache.put(entry("q1", "maybe")).await.unwrap());
    drop(cache);

    let reopened = JsonlCache::open(&path).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 2);
    let stored = reopened.get(&entry("q1", "").key).await.unwrap().unwrap();
    assert_eq!(stored.response.answer_text, "yes");
    assert_eq!(stored.response.usage, Usage::new(12, 3, 0.002));
}

#[tokio::test]
async fn corrupt_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.jsonl");
    let good = serde_json::to_string(&entry("q1", "yes")).unwrap();
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", good).unwrap();
        writeln!(file, "{{\"key\": \"truncated").unwrap();
        writeln!(file).unwrap();
    }

    let cache = JsonlCache::open(&path).await.unwrap();
    assert_eq!(cache.len().await.unwrap(), 1);
    assert_eq!(cache.skipped_lines(), 1);
}

#[tokio::test]
async fn missing_file_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cache = JsonlCache::open(dir.path().join("absent.jsonl")).await.unwrap();
    assert_eq!(cache.len().await.unwrap(), 0);
    assert!(cache.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_append_leaves_key_writable() {
    let dir = tempfile::tempdir().unwrap();
    let cache = JsonlCache::open(dir.path().join("missing-dir").join("cache.jsonl")).await.unwrap();

    assert!(cache.put(entry("q1", "yes")).await.is_err());
    assert_eq!(cache.len().await.unwrap(), 0);
    assert!(cache.get(&entry("q1", "").key).await.unwrap().is_none());

    std::fs::create_dir(dir.path().join("missing-dir")).unwrap();
    assert!(cache.put(entry("q1", "yes")).await.unwrap());
    assert_eq!(cache.len().await.unwrap(), 1);
}
