//! Task expansion
//!
//! A [`Job`] pairs a survey with the agents, scenarios and models it is
//! administered to. [`Job::interviews`] expands the cross product into
//! independent interviews with stable, zero-based indices: scenario is the
//! outermost loop, then agent, then model, then iteration.

use crate::error::{Result, RunError};
use std::sync::Arc;
use surveyor_core::{Agent, ModelSpec, Scenario, Survey};

#[derive(Debug, Clone)]
pub struct Job {
    survey: Arc<Survey>,
    agents: Vec<Agent>,
    scenarios: Vec<Scenario>,
    models: Vec<ModelSpec>,
    iterations: u32,
}

/// One question's execution within one interview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub question: usize,
    pub name: String,
    /// Questions that must be terminal before this task is eligible
    pub predecessors: Vec<usize>,
}

/// One (agent, scenario, model, iteration) combination
#[derive(Debug, Clone)]
pub struct Interview {
    pub index: usize,
    pub iteration: u32,
    pub agent_index: usize,
    pub scenario_index: usize,
    pub model_index: usize,
    pub agent: Agent,
    pub scenario: Scenario,
    pub model: ModelSpec,
    pub tasks: Vec<Task>,
}

impl Interview {
    pub fn agent_name(&self) -> String {
        self.agent.display_name(self.agent_index)
    }
}

impl Job {
    pub fn new(survey: Survey) -> Self {
        Self {
            survey: Arc::new(survey),
            agents: Vec::new(),
            scenarios: Vec::new(),
            models: Vec::new(),
            iterations: 1,
        }
    }

    pub fn by_agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn by_scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn by_models(mut self, models: impl IntoIterator<Item = ModelSpec>) -> Self {
        self.models.extend(models);
        self
    }

    /// Administer every combination `iterations` times
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn survey(&self) -> &Arc<Survey> {
        &self.survey
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn interview_count(&self) -> usize {
        self.agents.len().max(1)
            * self.scenarios.len().max(1)
            * self.models.len()
            * self.iterations as usize
    }

    pub fn task_count(&self) -> usize {
        self.interview_count() * self.survey.len()
    }

    pub fn interviews(&self) -> Result<Vec<Interview>> {
        if self.models.is_empty() {
            return Err(RunError::Config("job has no models".into()));
        }
        if self.iterations == 0 {
            return Err(RunError::Config("iterations must be at least 1".into()));
        }

        let default_agents = [Agent::new()];
        let default_scenarios = [Scenario::new()];
        let agents = if self.agents.is_empty() { &default_agents[..] } else { &self.agents[..] };
        let scenarios =
            if self.scenarios.is_empty() { &default_scenarios[..] } else { &self.scenarios[..] };
        let tasks = self.tasks();

        let mut interviews = Vec::with_capacity(self.interview_count());
        for (scenario_index, scenario) in scenarios.iter().enumerate() {
            for (agent_index, agent) in agents.iter().enumerate() {
                for (model_index, model) in self.models.iter().enumerate() {
                    for iteration in 0..self.iterations {
                        interviews.push(Interview {
                            index: interviews.len(),
                            iteration,
                            agent_index,
                            scenario_index,
                            model_index,
                            agent: agent.clone(),
                            scenario: scenario.clone(),
                            model: model.clone(),
                            tasks: tasks.clone(),
                        });
                    }
                }
            }
        }
        Ok(interviews)
    }

    fn tasks(&self) -> Vec<Task> {
        let graph = self.survey.graph();
        self.survey
            .questions()
            .iter()
            .enumerate()
            .map(|(i, q)| Task {
                question: i,
                name: q.name.clone(),
                predecessors: graph.predecessors(i).iter().copied().collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surveyor_core::Question;

    fn survey() -> Survey {
        Survey::builder()
            .question(Question::multiple_choice(
                "likes",
                "Do you like {{ product }}?",
                ["yes", "no"],
            ))
            .question(Question::free_text("why", "Why?").with_skip_if("likes == 'no'"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_cross_product_order() {
        let job = Job::new(survey())
            .by_agents([Agent::named("a1"), Agent::named("a2")])
            .by_scenarios([
                Scenario::new().with("product", "tea"),
                Scenario::new().with("product", "coffee"),
            ])
            .by_models([ModelSpec::new("mock", "m1"), ModelSpec::new("mock", "m2")]);

        let interviews = job.interviews().unwrap();
        assert_eq!(interviews.len(), 8);
        assert_eq!(job.task_count(), 16);

        let keys: Vec<_> = interviews
            .iter()
            .map(|i| (i.index, i.scenario_index, i.agent_index, i.model_index))
            .collect();
        assert_eq!(keys[0], (0, 0, 0, 0));
        assert_eq!(keys[1], (1, 0, 0, 1));
        assert_eq!(keys[2], (2, 0, 1, 0));
        assert_eq!(keys[4], (4, 1, 0, 0));
        assert_eq!(interviews[5].agent_name(), "a1");
    }

    #[test]
    fn test_defaults_and_iterations() {
        let job = Job::new(survey()).by_models([ModelSpec::new("mock", "m")]).with_iterations(3);
        let interviews = job.interviews().unwrap();
        assert_eq!(interviews.len(), 3);
        assert_eq!(interviews.iter().map(|i| i.iteration).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(interviews[0].scenario.is_empty());
        assert_eq!(interviews[0].agent_name(), "agent_0");
        assert_eq!(interviews[0].tasks[1].predecessors, vec![0]);
        assert!(interviews[0].tasks[0].predecessors.is_empty());
    }

    #[test]
    fn test_job_without_models_is_rejected() {
        let err = Job::new(survey()).interviews().unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
        let err = Job::new(survey())
            .by_models([ModelSpec::new("mock", "m")])
            .with_iterations(0)
            .interviews()
            .unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }
}
