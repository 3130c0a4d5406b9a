//! # surveyor-runner
//!
//! Administers a survey to every combination of agents, scenarios and
//! models.
//!
//! - [`Job`] expands the cross product into indexed [`Interview`]s
//! - [`Runner`] drives every interview's tasks under global and
//!   per-provider concurrency ceilings, with caching, retry and cancellation
//! - [`Results`] folds the answer contexts into one row per interview
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use surveyor_core::{Agent, ModelSpec, Question, Survey};
//! use surveyor_model::{MockModel, ProviderRegistry};
//! use surveyor_runner::{Job, RunConfig, Runner};
//!
//! # async fn example() -> surveyor_runner::Result<()> {
//! let survey = Survey::builder()
//!     .question(Question::multiple_choice("likes", "Do you like tea?", ["Yes", "No"]))
//!     .build()?;
//! let job = Job::new(survey)
//!     .by_agents([Agent::new().with_trait("age", 30)])
//!     .by_models([ModelSpec::new("mock", "echo")]);
//!
//! let model = Arc::new(MockModel::new("echo").with_text("Yes"));
//! let registry = ProviderRegistry::new().with("mock", model);
//! let output = Runner::new(RunConfig::default(), registry).run(&job).await?;
//! println!("{}", output.summary.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod job;
pub mod limits;
pub mod report;
pub mod results;

pub use config::{CacheMode, ProviderLimits, RetryConfig, RunConfig};
pub use error::{Result, RunError};
pub use events::RunEvent;
pub use executor::Runner;
pub use job::{Interview, Job, Task};
pub use limits::ConcurrencyLimits;
pub use report::{RunOutput, RunSummary, TaskException};
pub use results::{InterviewRecord, Results, Row};
