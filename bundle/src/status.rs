use crate::ExecutorError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The state of a bundle action.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum State {
    #[default]
    NotYetStarted,
    InProgress,
    Succeeded,
    Failed,
}

serde_plain::derive_display_from_serialize!(State);
serde_plain::derive_fromstr_from_deserialize!(State);

impl State {
    /// `true` for `Succeeded` and `Failed`. Nothing follows a terminal message.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Failed)
    }
}

/// One event in the life of a bundle action.
#[derive(Debug, Clone, Default)]
pub struct StatusMessage {
    pub state: State,
    pub description: String,
    pub error: Option<Arc<ExecutorError>>,
}

impl StatusMessage {
    pub(crate) fn in_progress<S: Into<String>>(description: S) -> Self {
        Self {
            state: State::InProgress,
            description: description.into(),
            error: None,
        }
    }

    pub(crate) fn succeeded<S: Into<String>>(description: S) -> Self {
        Self {
            state: State::Succeeded,
            description: description.into(),
            error: None,
        }
    }

    pub(crate) fn failed<S: Into<String>>(description: S, error: ExecutorError) -> Self {
        Self {
            state: State::Failed,
            description: description.into(),
            error: Some(Arc::new(error)),
        }
    }
}
