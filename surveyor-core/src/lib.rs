//! # surveyor-core
//!
//! Survey model for Surveyor: questions, agents, scenarios and models, plus
//! the pure machinery that runs before and after a provider call.
//!
//! ## Overview
//!
//! - [`Survey`] / [`SurveyBuilder`] - ordered questions with skip, stop and memory rules
//! - [`Expression`] - skip and stop conditions, parsed once at build time
//! - [`template::render`] - `{{ ... }}` placeholder substitution
//! - [`DependencyGraph`] - per-question predecessors and execution order
//! - [`render_prompt`] / [`parse_answer`] - prompt construction and answer validation
//! - [`AnswerContext`] - per-interview record of every question's outcome
//! - [`LanguageModel`] - the provider adapter contract
//!
//! ## Quick Start
//!
//! ```rust
//! use surveyor_core::{Question, Survey};
//!
//! let survey = Survey::builder()
//!     .question(Question::multiple_choice("likes", "Do you like {{ product }}?", ["yes", "no"]))
//!     .question(Question::free_text("why", "Why?").with_skip_if("likes == 'no'"))
//!     .build()
//!     .unwrap();
//! assert_eq!(survey.graph().order(), &[0, 1]);
//! ```

pub mod agent;
pub mod answer;
pub mod context;
pub mod error;
pub mod expression;
pub mod model;
pub mod prompt;
pub mod question;
pub mod resolver;
pub mod scenario;
pub mod survey;
pub mod template;
pub mod value;

pub use agent::{Agent, AnswerSource, DirectAnswer, TraitProvider};
pub use answer::{ParsedAnswer, parse_answer};
pub use context::{AnswerContext, AnswerRecord, TaskFailure, TaskStatus};
pub use error::{ErrorKind, Result, SurveyError, TaskError};
pub use expression::{Environment, Expression, Truth};
pub use model::{
    LanguageModel, ModelParameters, ModelRequest, ModelResponse, ModelSpec, ProviderError,
    ProviderErrorKind, Usage,
};
pub use prompt::{DEFAULT_AGENT_INSTRUCTION, RenderedPrompt, RenderedQuestion, render_prompt};
pub use question::{FunctionalFn, Question, QuestionKind};
pub use resolver::{Dependency, DependencyGraph, DependencyKind};
pub use scenario::Scenario;
pub use survey::{MemoryPlan, RuleDefinition, StopRule, Survey, SurveyBuilder, SurveyDefinition};
pub use template::TemplateContext;
