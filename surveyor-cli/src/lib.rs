//! # surveyor-cli
//!
//! Command-line tools for Surveyor study files.
//!
//! ## Overview
//!
//! - `surveyor validate <study>` - build the survey and print its question order
//! - `surveyor plan <study>` - interview and task counts plus the result columns
//! - `surveyor dry-run <study>` - run the whole engine against a scripted provider
//! - `surveyor cache-stats <file>` - summarize a JSON-lines response cache
//!
//! A study file is JSON:
//!
//! ```json
//! {
//!   "survey": {"questions": [{"name": "likes", "text": "Do you like {{ product }}?",
//!                             "question_type": "multiple_choice", "options": ["Yes", "No"]}]},
//!   "scenarios": [{"product": "tea"}],
//!   "agents": [{"traits": {"age": 30}}],
//!   "models": [{"provider": "openai", "name": "gpt-4o"}],
//!   "iterations": 1
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod dry_run;
pub mod study;

pub use cli::{Cli, Commands};
pub use dry_run::{dry_run_registry, sample_response};
pub use study::Study;
