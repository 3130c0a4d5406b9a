//! Survey construction
//!
//! A survey is an ordered list of questions plus survey-level rules. Every
//! expression is parsed and every reference resolved in [`SurveyBuilder::build`];
//! a survey that builds successfully cannot fail on its own rules at run time.

use crate::error::{Result, SurveyError};
use crate::expression::{Environment, Expression, Truth};
use crate::question::Question;
use crate::resolver::{DependencyGraph, DependencyKind};
use crate::template::piped_questions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// How questions remember earlier questions, on top of explicit memory rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "lag", rename_all = "snake_case")]
pub enum MemoryPlan {
    #[default]
    None,
    /// Every question remembers all prior questions
    Full,
    /// Every question remembers the previous `n` questions
    Lagged(usize),
}

/// A condition attached to a question by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub question: String,
    pub condition: String,
}

/// After question `after` is answered, skip every later question when the
/// condition holds
#[derive(Debug, Clone, PartialEq)]
pub struct StopRule {
    pub after: usize,
    pub condition: Expression,
}

/// Serializable survey description, as found in study files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyDefinition {
    pub questions: Vec<Question>,
    #[serde(default)]
    pub skip_rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub stop_rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub memory: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub full_memory: bool,
    #[serde(default)]
    pub lagged_memory: Option<usize>,
}

impl SurveyDefinition {
    pub fn build(self) -> Result<Survey> {
        let mut builder = Survey::builder().questions(self.questions);
        for rule in self.skip_rules {
            builder = builder.skip_rule(rule.question, rule.condition);
        }
        for rule in self.stop_rules {
            builder = builder.stop_rule(rule.question, rule.condition);
        }
        for (question, prior) in self.memory {
            builder = builder.memory(question, prior);
        }
        if self.full_memory {
            builder = builder.full_memory();
        } else if let Some(lag) = self.lagged_memory {
            builder = builder.lagged_memory(lag);
        }
        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct SurveyBuilder {
    questions: Vec<Question>,
    skip_rules: Vec<RuleDefinition>,
    stop_rules: Vec<RuleDefinition>,
    memory: Vec<(String, Vec<String>)>,
    memory_plan: MemoryPlan,
}

impl SurveyBuilder {
    pub fn question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn questions(mut self, questions: impl IntoIterator<Item = Question>) -> Self {
        self.questions.extend(questions);
        self
    }

    /// Skip `question` when `condition` holds. Combined with the question's
    /// own `skip_if` using `or`.
    pub fn skip_rule(mut self, question: impl Into<String>, condition: impl Into<String>) -> Self {
        self.skip_rules
            .push(RuleDefinition { question: question.into(), condition: condition.into() });
        self
    }

    pub fn stop_rule(mut self, question: impl Into<String>, condition: impl Into<String>) -> Self {
        self.stop_rules
            .push(RuleDefinition { question: question.into(), condition: condition.into() });
        self
    }

    pub fn memory<I, S>(mut self, question: impl Into<String>, prior: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.memory.push((question.into(), prior.into_iter().map(Into::into).collect()));
        self
    }

    pub fn full_memory(mut self) -> Self {
        self.memory_plan = MemoryPlan::Full;
        self
    }

    pub fn lagged_memory(mut self, lag: usize) -> Self {
        self.memory_plan = MemoryPlan::Lagged(lag);
        self
    }

    pub fn build(self) -> Result<Survey> {
        if self.questions.is_empty() {
            return Err(SurveyError::EmptySurvey);
        }

        let mut index = HashMap::new();
        for (i, question) in self.questions.iter().enumerate() {
            question.validate()?;
            if index.insert(question.name.clone(), i).is_some() {
                return Err(SurveyError::DuplicateQuestion(question.name.clone()));
            }
        }
        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| SurveyError::UnknownRuleTarget(name.to_string()))
        };

        let n = self.questions.len();
        let mut skip_conditions: Vec<Vec<Expression>> = vec![Vec::new(); n];
        for (i, question) in self.questions.iter().enumerate() {
            if let Some(source) = &question.skip_if {
                skip_conditions[i].push(Expression::parse(source)?);
            }
        }
        for rule in &self.skip_rules {
            let i = lookup(&rule.question)?;
            skip_conditions[i].push(Expression::parse(&rule.condition)?);
        }

        let mut stop_rules = Vec::with_capacity(self.stop_rules.len());
        for rule in &self.stop_rules {
            let after = lookup(&rule.question)?;
            let condition = Expression::parse(&rule.condition)?;
            for reference in condition.question_refs() {
                match index.get(&reference) {
                    None => {
                        return Err(SurveyError::UnknownQuestion {
                            question: rule.question.clone(),
                            reference,
                        });
                    }
                    Some(&j) if j > after => {
                        return Err(SurveyError::ForwardReference {
                            question: rule.question.clone(),
                            reference,
                        });
                    }
                    Some(_) => {}
                }
            }
            stop_rules.push(StopRule { after, condition });
        }

        let mut memory: Vec<Vec<String>> =
            self.questions.iter().map(|q| q.memory.clone()).collect();
        for (question, prior) in &self.memory {
            let i = lookup(question)?;
            memory[i].extend(prior.iter().cloned());
        }
        for (i, remembered) in memory.iter_mut().enumerate() {
            let start = match self.memory_plan {
                MemoryPlan::None => continue,
                MemoryPlan::Full => 0,
                MemoryPlan::Lagged(lag) => i.saturating_sub(lag),
            };
            remembered.extend(self.questions[start..i].iter().map(|q| q.name.clone()));
        }

        let mut references: Vec<Vec<(String, DependencyKind)>> = vec![Vec::new(); n];
        for (i, question) in self.questions.iter().enumerate() {
            let refs = &mut references[i];
            for expr in &skip_conditions[i] {
                refs.extend(expr.question_refs().into_iter().map(|r| (r, DependencyKind::Skip)));
            }
            let piped: BTreeSet<String> =
                question.templates().into_iter().flat_map(piped_questions).collect();
            refs.extend(piped.into_iter().map(|r| (r, DependencyKind::Piping)));
            refs.extend(memory[i].iter().map(|r| (r.clone(), DependencyKind::Memory)));
        }
        for rule in &stop_rules {
            let mut sources: BTreeSet<String> = rule.condition.question_refs();
            sources.insert(self.questions[rule.after].name.clone());
            for refs in references.iter_mut().skip(rule.after + 1) {
                refs.extend(sources.iter().map(|r| (r.clone(), DependencyKind::Stop)));
            }
        }

        let names = self.questions.iter().map(|q| q.name.clone()).collect();
        let graph = DependencyGraph::resolve(names, references)?;
        tracing::debug!(questions = n, stop_rules = stop_rules.len(), "survey built");

        Ok(Survey {
            questions: self.questions,
            index,
            skip_conditions,
            stop_rules,
            memory_plan: self.memory_plan,
            graph,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Survey {
    questions: Vec<Question>,
    index: HashMap<String, usize>,
    skip_conditions: Vec<Vec<Expression>>,
    stop_rules: Vec<StopRule>,
    memory_plan: MemoryPlan,
    graph: DependencyGraph,
}

impl Survey {
    pub fn builder() -> SurveyBuilder {
        SurveyBuilder::default()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, i: usize) -> &Question {
        &self.questions[i]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.questions.iter().map(|q| q.name.as_str())
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn memory_plan(&self) -> MemoryPlan {
        self.memory_plan
    }

    pub fn skip_conditions(&self, i: usize) -> &[Expression] {
        &self.skip_conditions[i]
    }

    pub fn stop_rules(&self) -> &[StopRule] {
        &self.stop_rules
    }

    /// Prior questions embedded in question `i`'s prompt, in survey order
    pub fn memory(&self, i: usize) -> Vec<&Question> {
        self.graph.memory(i).iter().map(|&j| &self.questions[j]).collect()
    }

    /// Whether question `i` should be skipped. Any true condition skips.
    pub fn skip_truth(&self, i: usize, env: &Environment<'_>) -> Truth {
        any_true(self.skip_conditions[i].iter().map(|c| c.evaluate(env)))
    }

    /// Whether a stop rule on an earlier question has ended the survey
    /// before question `i`
    pub fn stopped_before(&self, i: usize, env: &Environment<'_>) -> Truth {
        any_true(self.stop_rules.iter().filter(|r| r.after < i).map(|r| r.condition.evaluate(env)))
    }

    /// Question names that some rule reads, for diagnostics
    pub fn referenced_questions(&self) -> HashSet<&str> {
        (0..self.len())
            .flat_map(|i| {
                self.graph.predecessors(i).iter().map(|&j| self.questions[j].name.as_str())
            })
            .collect()
    }
}

/// Three-valued `or` over a sequence of truths
fn any_true(truths: impl Iterator<Item = Truth>) -> Truth {
    let mut result = Truth::False;
    for truth in truths {
        match truth {
            Truth::True => return Truth::True,
            Truth::Undecided => result = Truth::Undecided,
            Truth::False => {}
        }
    }
    result
}
