//! Run-level reporting: task exceptions and summary statistics

use crate::results::Results;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use surveyor_core::{ErrorKind, Usage};

/// A task failure, surfaced alongside the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskException {
    pub interview_index: usize,
    pub question: String,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub interviews: usize,
    pub complete_interviews: usize,
    pub incomplete_interviews: usize,
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tasks that never reached a terminal status
    pub unfinished: usize,
    pub provider_calls: u64,
    pub cache_hits: u64,
    pub cache_errors: u64,
    /// Usage of responses obtained from providers during this run
    pub live_usage: Usage,
    /// Original usage of responses served from the cache
    pub cached_usage: Usage,
    pub cancelled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn total_cost(&self) -> f64 {
        self.live_usage.cost + self.cached_usage.cost
    }

    pub fn format_summary(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Duration: {:?}\n", self.duration));
        output.push_str(&format!(
            "Interviews: {} ({} complete, {} incomplete)\n",
            self.interviews, self.complete_interviews, self.incomplete_interviews
        ));
        output.push_str(&format!(
            "Tasks: {} ({} succeeded, {} failed, {} skipped, {} unfinished)\n",
            self.tasks, self.succeeded, self.failed, self.skipped, self.unfinished
        ));
        output.push_str(&format!(
            "Provider calls: {}  Cache hits: {}  Cache errors: {}\n",
            self.provider_calls, self.cache_hits, self.cache_errors
        ));
        output.push_str(&format!(
            "Tokens: {} in / {} out live, {} in / {} out cached\n",
            self.live_usage.input_tokens,
            self.live_usage.output_tokens,
            self.cached_usage.input_tokens,
            self.cached_usage.output_tokens
        ));
        output.push_str(&format!(
            "Cost: {:.4} live, {:.4} cached\n",
            self.live_usage.cost, self.cached_usage.cost
        ));
        if self.cancelled {
            output.push_str("Run was cancelled\n");
        }
        output
    }
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub results: Results,
    pub exceptions: Vec<TaskException>,
    pub summary: RunSummary,
}

impl RunOutput {
    /// Every interview finished and no task failed
    pub fn is_clean(&self) -> bool {
        self.exceptions.is_empty() && self.summary.incomplete_interviews == 0
    }

    pub fn exceptions_for(&self, interview_index: usize) -> impl Iterator<Item = &TaskException> {
        self.exceptions.iter().filter(move |e| e.interview_index == interview_index)
    }
}
