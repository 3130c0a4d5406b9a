//! Prompt construction for a single task

use crate::agent::Agent;
use crate::context::AnswerContext;
use crate::error::TaskError;
use crate::question::{Question, QuestionKind};
use crate::scenario::Scenario;
use crate::template::{TemplateContext, render};
use crate::value::render_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_AGENT_INSTRUCTION: &str =
    "You are answering questions as if you were a human. Do not break character.";

const COMMENT_INSTRUCTION: &str =
    "After the answer, you can put a comment explaining your response on the next line.";

const MEMORY_PREAMBLE: &str = "Before the question you are now answering, \
                               you already answered the following question(s):";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Rendered prompt plus the rendered question text and options. Later memory
/// blocks reuse the text; answer validation matches against the options.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuestion {
    pub prompt: RenderedPrompt,
    pub question_text: String,
    pub options: Vec<Value>,
}

/// Render the system and user prompts for `question`.
///
/// `memory` lists the prior questions whose text and answer are embedded,
/// in survey order.
pub fn render_prompt(
    question: &Question,
    memory: &[&Question],
    agent: &Agent,
    scenario: &Scenario,
    answers: &AnswerContext,
) -> Result<RenderedQuestion, TaskError> {
    let traits = agent.effective_traits(question);
    let ctx = TemplateContext { scenario, traits: &traits, answers };

    let instruction = match &agent.instruction {
        Some(template) => render(template, &ctx)?,
        None => DEFAULT_AGENT_INSTRUCTION.to_string(),
    };
    let system_prompt = if traits.is_empty() {
        instruction
    } else {
        let traits_json =
            serde_json::to_string(&traits).map_err(|e| TaskError::TemplateRender(e.to_string()))?;
        format!("{}\nYour traits: {}", instruction, traits_json)
    };

    let question_text = render(&question.text, &ctx)?;
    let mut sections = vec![question_text.clone()];

    let options = question
        .kind
        .options()
        .iter()
        .map(|o| render_option(o, &ctx))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(block) = options_block(&question.kind, &options) {
        sections.push(block);
    }

    let instructions = match &question.instructions {
        Some(template) => render(template, &ctx)?,
        None => default_instructions(&question.kind),
    };
    if !instructions.is_empty() {
        sections.push(instructions);
    }

    if !memory.is_empty() {
        sections.push(memory_block(memory, answers));
    }

    Ok(RenderedQuestion {
        prompt: RenderedPrompt { system_prompt, user_prompt: sections.join("\n\n") },
        question_text,
        options,
    })
}

fn render_option(option: &Value, ctx: &TemplateContext<'_>) -> Result<Value, TaskError> {
    match option {
        Value::String(template) => render(template, ctx).map(Value::String),
        other => Ok(other.clone()),
    }
}

fn options_block(kind: &QuestionKind, rendered: &[Value]) -> Option<String> {
    let lines: Vec<String> = match kind {
        QuestionKind::MultipleChoice { .. }
        | QuestionKind::Checkbox { .. }
        | QuestionKind::Budget { .. }
        | QuestionKind::Rank { .. } => rendered.iter().map(render_value).collect(),
        QuestionKind::LinearScale { options, option_labels } => options
            .iter()
            .map(|o| match option_labels.get(&o.to_string()) {
                Some(label) => format!("{} : {}", o, label),
                None => o.to_string(),
            })
            .collect(),
        _ => return None,
    };
    Some(format!("Options:\n{}", lines.join("\n")))
}

/// Answering instructions used when a question does not supply its own
pub fn default_instructions(kind: &QuestionKind) -> String {
    let body = match kind {
        QuestionKind::FreeText | QuestionKind::Functional => return String::new(),
        QuestionKind::MultipleChoice { .. } => {
            "Only 1 option may be selected.\n\
             Respond only with a string corresponding to one of the options."
                .to_string()
        }
        QuestionKind::Checkbox { min_selections, max_selections, .. } => {
            let mut text =
                "Respond only with a JSON list of the options that apply, e.g. [\"a\", \"b\"]."
                    .to_string();
            if let Some(min) = min_selections {
                text.push_str(&format!("\nYou must select at least {} option(s).", min));
            }
            if let Some(max) = max_selections {
                text.push_str(&format!("\nYou may select at most {} option(s).", max));
            }
            text
        }
        QuestionKind::Numeric { min_value, max_value } => {
            let mut text = "This question requires a numerical response in the form of an integer \
                            or decimal (e.g., -12, 0, 1, 2, 3.45, ...).\n\
                            Respond with just your number on a single line."
                .to_string();
            if let Some(min) = min_value {
                text.push_str(&format!("\nThe answer must be at least {}.", min));
            }
            if let Some(max) = max_value {
                text.push_str(&format!("\nThe answer must be at most {}.", max));
            }
            text
        }
        QuestionKind::LinearScale { .. } => {
            "Only 1 option may be selected.\n\
             Respond only with the number corresponding to one of the options."
                .to_string()
        }
        QuestionKind::List { max_list_items } => {
            let mut text =
                "Respond only with a JSON list of items, e.g. [\"first\", \"second\"].".to_string();
            if let Some(max) = max_list_items {
                text.push_str(&format!("\nThe list must not contain more than {} item(s).", max));
            }
            text
        }
        QuestionKind::Budget { budget_sum, .. } => format!(
            "Allocate a total of {} across the options.\n\
             Respond only with a JSON object mapping each option to its share; \
             the shares must sum to {}.",
            budget_sum, budget_sum
        ),
        QuestionKind::Rank { options, num_selections } => format!(
            "Rank the options from most to least preferred.\n\
             Respond only with a JSON list of exactly {} option(s), in order.",
            num_selections.unwrap_or(options.len())
        ),
        QuestionKind::Extract { answer_template } => format!(
            "Extract the requested values from the text.\n\
             Respond only with a JSON object using these keys: {}",
            serde_json::to_string(answer_template).unwrap_or_default()
        ),
    };
    format!("{}\n{}", body, COMMENT_INSTRUCTION)
}

fn memory_block(memory: &[&Question], answers: &AnswerContext) -> String {
    let mut block = MEMORY_PREAMBLE.to_string();
    for prior in memory {
        let record = answers.get(&prior.name);
        let text = record.and_then(|r| r.question_text.as_deref()).unwrap_or(&prior.text);
        let answer =
            answers.answer(&prior.name).map(render_value).unwrap_or_else(|| "None".to_string());
        block.push_str(&format!("\n\tQuestion: {}\n\tAnswer: {}", text, answer));
    }
    block
}
