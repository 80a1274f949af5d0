// src/work/evaluators/mod.rs - Evaluator contract shared by all work-item expanders
pub mod files;
pub mod sequences;
pub mod theta_rho;

pub use files::EvaluatorFiles;
pub use sequences::EvaluatorSequences;
pub use theta_rho::EvaluatorThetaRhoLine;

use serde_json::Value;

use crate::motion::RobotAttributes;
use crate::work::{queue::WorkItemQueue, WorkItem};

/// Mutable surroundings an evaluator sees while claiming or servicing work.
///
/// Elementary motion items go straight into the downstream queue; anything
/// that needs full command handling (immediate keywords, `;` splitting) is
/// collected in `dispatches` and routed through the work manager afterwards.
pub struct EvalContext<'a> {
    pub queue: &'a mut WorkItemQueue,
    pub dispatches: Vec<WorkItem>,
}

impl<'a> EvalContext<'a> {
    pub fn new(queue: &'a mut WorkItemQueue) -> Self {
        Self {
            queue,
            dispatches: Vec::new(),
        }
    }
}

/// A component that recognizes one class of work item and progressively
/// expands it into elementary motion requests.
///
/// All outcomes cross this boundary as booleans; evaluators never fail
/// loudly. `is_valid` must be free of side effects since the dispatcher
/// probes it before committing to a dequeue.
pub trait Evaluator {
    /// Apply configuration. Missing or malformed fields fall back to
    /// defaults.
    fn set_config(&mut self, config: &Value, attributes: &RobotAttributes);

    /// Ownership test: would this evaluator handle the item?
    fn is_valid(&self, item: &WorkItem) -> bool;

    fn is_busy(&self) -> bool;

    /// Claim the item and begin processing. Returns false if it was not
    /// actually handled.
    fn exec_work_item(&mut self, item: &WorkItem, ctx: &mut EvalContext) -> bool;

    /// Advance one tick of in-progress work.
    fn service(&mut self, ctx: &mut EvalContext);

    /// Abort and reset to idle. Idempotent.
    fn stop(&mut self);
}

/// Read a float setting, substituting the default when absent or invalid.
pub(crate) fn config_f64(config: &Value, key: &str, default: f64) -> f64 {
    config.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// Read an integer setting, substituting the default when absent or invalid.
pub(crate) fn config_i64(config: &Value, key: &str, default: i64) -> i64 {
    config.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Read a flag that may be written as a bool or as 0/1.
pub(crate) fn config_flag(config: &Value, key: &str, default: bool) -> bool {
    match config.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
        _ => default,
    }
}
