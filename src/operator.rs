//! Operator interaction surface.
//!
//! The coordinator asks the operator one blocking question (whether to home
//! the stage on start), shows lists of warnings, and asks for views to be
//! opened and closed. How that is presented is up to the implementation.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{info, warn};

/// Question asked before the stage starts.
pub const STAGE_HOMING_PROMPT: &str = "Initialize the stage? (runs the homing sequence)";

/// External views the coordinator opens and closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKind {
    /// Live camera view, open while Vision runs.
    Camera,
    /// Dispenser control view, open while the Dispenser runs.
    Dispenser,
    /// Subject-position plotter, opened on request.
    Plotter,
}

/// Whatever presents the rig to its operator: prompts, warnings and views.
#[async_trait]
pub trait OperatorSurface: Send + Sync {
    /// Ask a yes/no question and wait for the answer.
    async fn confirm(&self, question: &str) -> bool;

    /// Show warnings, in order. Must not block.
    fn warn(&self, messages: &[String]);

    /// A view became visible.
    fn open_view(&self, _view: ViewKind) {}

    /// A view was closed.
    fn close_view(&self, _view: ViewKind) {}
}

/// Something that happened on a [`ScriptedOperator`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorEvent {
    /// A yes/no question.
    Prompted(String),
    /// One batch of warnings.
    Warned(Vec<String>),
    /// A view was opened.
    ViewOpened(ViewKind),
    /// A view was closed.
    ViewClosed(ViewKind),
}

/// Non-interactive operator with a fixed answer. Records every interaction.
#[derive(Debug)]
pub struct ScriptedOperator {
    answer: bool,
    events: Mutex<Vec<OperatorEvent>>,
}

impl ScriptedOperator {
    /// Operator answering every question with `answer`.
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            events: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, event: OperatorEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Every recorded interaction, oldest first.
    pub fn events(&self) -> Vec<OperatorEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Questions asked so far.
    pub fn prompt_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, OperatorEvent::Prompted(_)))
            .count()
    }

    /// Warning batches in the order they were shown.
    pub fn warnings(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OperatorEvent::Warned(messages) => Some(messages),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl OperatorSurface for ScriptedOperator {
    async fn confirm(&self, question: &str) -> bool {
        info!(answer = self.answer, "Operator prompt: {}", question);
        self.record(OperatorEvent::Prompted(question.to_string()));
        self.answer
    }

    fn warn(&self, messages: &[String]) {
        for message in messages {
            warn!("{}", message);
        }
        self.record(OperatorEvent::Warned(messages.to_vec()));
    }

    fn open_view(&self, view: ViewKind) {
        self.record(OperatorEvent::ViewOpened(view));
    }

    fn close_view(&self, view: ViewKind) {
        self.record(OperatorEvent::ViewClosed(view));
    }
}
