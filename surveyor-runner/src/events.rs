//! Progress events emitted while a run executes

use serde::Serialize;
use surveyor_core::TaskStatus;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    InterviewStarted { interview: usize },

    /// A task passed skip evaluation and rendering and is headed for the
    /// cache or a provider
    TaskDispatched { interview: usize, question: String },

    TaskFinished { interview: usize, question: String, status: TaskStatus, cached: bool },

    InterviewFinished { interview: usize, complete: bool },

    RunCancelled,
}

/// Optional event sink. Sending never blocks and a dropped receiver is ignored.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventSink(Option<UnboundedSender<RunEvent>>);

impl EventSink {
    pub(crate) fn new(sender: Option<UnboundedSender<RunEvent>>) -> Self {
        Self(sender)
    }

    pub(crate) fn emit(&self, event: RunEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }
}
