//! Study files: a survey plus the agents, scenarios and models to run it with

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use surveyor_core::{Agent, ModelSpec, Scenario, SurveyDefinition};
use surveyor_runner::Job;

fn default_iterations() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub survey: SurveyDefinition,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    pub models: Vec<ModelSpec>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl Study {
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid study file")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read study file {}", path.display()))?;
        Self::from_json_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Build the survey and expand it into a job
    pub fn into_job(self) -> Result<Job> {
        let survey = self.survey.build().context("invalid survey")?;
        Ok(Job::new(survey)
            .by_agents(self.agents)
            .by_scenarios(self.scenarios)
            .by_models(self.models)
            .with_iterations(self.iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUDY: &str = r#"{
        "survey": {
            "questions": [
                {"name": "likes", "text": "Do you like {{ product }}?",
                 "question_type": "multiple_choice", "options": ["Yes", "No"]},
                {"name": "why", "text": "Why?", "question_type": "free_text",
                 "skip_if": "likes == 'No'"}
            ]
        },
        "scenarios": [{"product": "tea"}, {"product": "coffee"}],
        "agents": [{"name": "ada", "traits": {"age": 36}}],
        "models": [{"provider": "mock", "name": "m1"}]
    }"#;

    #[test]
    fn parses_study_with_defaults() {
        let study = Study::from_json_str(STUDY).unwrap();
        assert_eq!(study.iterations, 1);
        assert_eq!(study.scenarios.len(), 2);

        let job = study.into_job().unwrap();
        assert_eq!(job.interview_count(), 2);
        assert_eq!(job.task_count(), 4);
    }

    #[test]
    fn rejects_invalid_survey() {
        let study = Study::from_json_str(
            r#"{"survey": {"questions": [
                {"name": "q", "text": "{{ later.answer }}", "question_type": "free_text"},
                {"name": "later", "text": "Later", "question_type": "free_text"}]},
                "models": [{"provider": "mock", "name": "m"}]}"#,
        )
        .unwrap();
        assert!(study.into_job().is_err());
    }

    #[test]
    fn rejects_missing_models() {
        assert!(Study::from_json_str(r#"{"survey": {"questions": []}}"#).is_err());
    }
}
