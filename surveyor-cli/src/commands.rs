//! Subcommand implementations. Each returns the text to print.

use crate::dry_run::dry_run_registry;
use crate::study::Study;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use surveyor_cache::{JsonlCache, ResponseCache};
use surveyor_core::AnswerContext;
use surveyor_runner::{InterviewRecord, Results, RunConfig, Runner};
use surveyor_telemetry::info;

pub fn validate(study: Study) -> Result<String> {
    let job = study.into_job()?;
    let survey = job.survey();
    let mut out = format!("Survey is valid: {} question(s)\n", survey.len());
    for &i in survey.graph().order() {
        let question = survey.question(i);
        let predecessors: Vec<&str> = survey
            .graph()
            .predecessors(i)
            .iter()
            .map(|&p| survey.question(p).name.as_str())
            .collect();
        let _ = write!(out, "  {} ({})", question.name, question.kind.type_name());
        if !predecessors.is_empty() {
            let _ = write!(out, " after {}", predecessors.join(", "));
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn plan(study: Study) -> Result<String> {
    let job = study.into_job()?;
    let records: Vec<InterviewRecord> = job
        .interviews()?
        .into_iter()
        .map(|interview| InterviewRecord {
            interview,
            context: AnswerContext::new(),
            complete: false,
        })
        .collect();
    let columns = Results::assemble(job.survey(), &records).columns().to_vec();

    let mut out = String::new();
    let _ = writeln!(out, "Interviews: {}", records.len());
    let _ = writeln!(out, "Tasks:      {}", job.task_count());
    let models: Vec<String> = job.models().iter().map(|m| m.identity()).collect();
    let _ = writeln!(out, "Models:     {}", models.join(", "));
    let _ = writeln!(out, "Columns:");
    for column in columns {
        let _ = writeln!(out, "  {}", column);
    }
    Ok(out)
}

pub async fn dry_run(
    study: Study,
    config: Option<&Path>,
    cache: Option<&Path>,
    output: Option<&Path>,
) -> Result<String> {
    let config = match config {
        Some(path) => {
            RunConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?
        }
        None => RunConfig::default(),
    };
    let job = study.into_job()?;
    let registry = dry_run_registry(job.survey(), job.models());

    let mut runner = Runner::new(config, registry);
    if let Some(path) = cache {
        let cache = JsonlCache::open(path)
            .await
            .with_context(|| format!("failed to open cache {}", path.display()))?;
        runner = runner.with_cache(Arc::new(cache));
    }

    info!(interviews = job.interview_count(), tasks = job.task_count(), "Starting dry run");
    let run = runner.run(&job).await?;

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&run)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let mut out = run.summary.format_summary();
    for exception in &run.exceptions {
        let _ = write!(
            out,
            "\n  interview {} / {}: {}: {}",
            exception.interview_index, exception.question, exception.kind, exception.message
        );
    }
    Ok(out)
}

pub async fn cache_stats(path: &Path) -> Result<String> {
    if !path.exists() {
        anyhow::bail!("cache file {} does not exist", path.display());
    }
    let cache = JsonlCache::open(path)
        .await
        .with_context(|| format!("failed to open cache {}", path.display()))?;
    let entries = cache.entries().await?;

    let mut by_model: BTreeMap<&str, usize> = BTreeMap::new();
    let (mut input_tokens, mut output_tokens, mut cost) = (0u64, 0u64, 0.0f64);
    for entry in &entries {
        *by_model.entry(entry.model.as_str()).or_default() += 1;
        input_tokens += entry.response.usage.input_tokens;
        output_tokens += entry.response.usage.output_tokens;
        cost += entry.response.usage.cost;
    }

    let mut out = String::new();
    let _ = writeln!(out, "Cache: {}", path.display());
    let _ = writeln!(out, "Entries: {}", entries.len());
    if cache.skipped_lines() > 0 {
        let _ = writeln!(out, "Unreadable lines: {}", cache.skipped_lines());
    }
    for (model, count) in &by_model {
        let _ = writeln!(out, "  {}: {}", model, count);
    }
    let _ = writeln!(out, "Tokens: {} in / {} out", input_tokens, output_tokens);
    let _ = write!(out, "Cost: ${:.4}", cost);
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        let _ = write!(
            out,
            "\nWritten: {} .. {}",
            first.created_at.to_rfc3339(),
            last.created_at.to_rfc3339()
        );
    }
    Ok(out)
}

