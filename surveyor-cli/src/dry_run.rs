//! Scripted provider used by `surveyor dry-run`
//!
//! Every question gets a syntactically valid answer for its type, so a dry
//! run exercises rendering, dependency ordering, caching and result assembly
//! without reaching a real model.

use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use surveyor_core::value::render_value;
use surveyor_core::{ModelRequest, ModelResponse, ModelSpec, QuestionKind, Survey, Usage};
use surveyor_model::{MockModel, ProviderRegistry};

const SAMPLE_TEXT: &str = "This is a sample response.";
const SAMPLE_COMMENT: &str = "Sample comment.";

/// A response that parses cleanly for a question of `kind`
pub fn sample_response(kind: &QuestionKind) -> String {
    let answer = match kind {
        QuestionKind::FreeText | QuestionKind::Functional => return SAMPLE_TEXT.to_string(),
        QuestionKind::MultipleChoice { options } => {
            options.first().map(render_value).unwrap_or_default()
        }
        QuestionKind::Checkbox { options, min_selections, .. } => {
            let count = min_selections.unwrap_or(1).max(1);
            let picked: Vec<String> = options.iter().take(count).map(render_value).collect();
            json!(picked).to_string()
        }
        QuestionKind::Numeric { min_value, max_value } => match (min_value, max_value) {
            (Some(min), Some(max)) => ((min + max) / 2.0).to_string(),
            (Some(bound), None) | (None, Some(bound)) => bound.to_string(),
            (None, None) => "1".to_string(),
        },
        QuestionKind::LinearScale { options, .. } => {
            options.first().map(ToString::to_string).unwrap_or_default()
        }
        QuestionKind::List { .. } => json!(["first item", "second item"]).to_string(),
        QuestionKind::Budget { options, budget_sum } => {
            let mut shares = Map::new();
            for (i, option) in options.iter().enumerate() {
                let share = if i == 0 { *budget_sum } else { 0.0 };
                shares.insert(render_value(option), json!(share));
            }
            Value::Object(shares).to_string()
        }
        QuestionKind::Rank { options, num_selections } => {
            let count = num_selections.unwrap_or(options.len());
            let ranked: Vec<String> = options.iter().take(count).map(render_value).collect();
            json!(ranked).to_string()
        }
        QuestionKind::Extract { answer_template } => json!(answer_template).to_string(),
    };
    format!("{}\n{}", answer, SAMPLE_COMMENT)
}

/// One scripted model per provider named by `models`, each answering every
/// question of `survey` with its sample response
pub fn dry_run_registry(survey: &Survey, models: &[ModelSpec]) -> ProviderRegistry {
    let samples: Arc<HashMap<String, String>> = Arc::new(
        survey.questions().iter().map(|q| (q.name.clone(), sample_response(&q.kind))).collect(),
    );
    let providers: BTreeSet<&str> = models.iter().map(|m| m.provider.as_str()).collect();

    let mut registry = ProviderRegistry::new();
    for provider in providers {
        let samples = Arc::clone(&samples);
        let model = MockModel::new(format!("{}-dry-run", provider)).with_responder(
            move |request: &ModelRequest, _| {
                let text = samples
                    .get(&request.question)
                    .cloned()
                    .unwrap_or_else(|| SAMPLE_TEXT.to_string());
                let prompt_len = request.system_prompt.len() + request.user_prompt.len();
                let input_tokens = prompt_len.div_ceil(4) as u64;
                let output_tokens = text.len().div_ceil(4) as u64;
                let usage = Usage::new(input_tokens, output_tokens, 0.0);
                Ok(ModelResponse::new(text).with_usage(usage))
            },
        );
        registry.register(provider, Arc::new(model));
    }
    registry
}
