// src/work/mod.rs - Work pipeline: items, queue, evaluators, dispatcher
pub mod evaluators;
pub mod manager;
pub mod queue;

pub use manager::WorkManager;
pub use queue::WorkItemQueue;

use serde::Serialize;

/// One unit of drawing/control input text submitted to the pipeline.
///
/// Items are immutable once created; ownership is transient. A playlist
/// line carries its originating index, which doubles as the sub-command
/// selector when the command contains `;`-joined parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    command: String,
    origin_index: Option<usize>,
}

impl WorkItem {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            origin_index: None,
        }
    }

    pub fn with_index(command: impl Into<String>, index: usize) -> Self {
        Self {
            command: command.into(),
            origin_index: Some(index),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn origin_index(&self) -> Option<usize> {
        self.origin_index
    }
}

/// Outcome reported back to whoever submitted a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandResult {
    /// Accepted (queued or executed immediately).
    Ok,
    /// Rejected because the work queue is full.
    Busy,
    /// Nothing applicable to do (e.g. empty command, inactive toggle).
    None,
}

impl CommandResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandResult::Ok => "ok",
            CommandResult::Busy => "busy",
            CommandResult::None => "none",
        }
    }
}
