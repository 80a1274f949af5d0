// src/work/manager.rs - Command dispatch and per-tick pipeline servicing
use chrono::Local;
use serde::Serialize;

use crate::config::Config;
use crate::file_manager::FileManager;
use crate::gcode;
use crate::robot::{RobotController, RobotStatus};
use crate::work::evaluators::{
    EvalContext, Evaluator, EvaluatorFiles, EvaluatorSequences, EvaluatorThetaRhoLine,
};
use crate::work::queue::WorkItemQueue;
use crate::work::{CommandResult, WorkItem};

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistStatus {
    pub name: String,
    pub index: usize,
    pub repeat: bool,
    pub shuffle: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePlaybackStatus {
    pub name: String,
    pub job_id: String,
    /// Byte position, corrected by the fraction of the current line still
    /// being interpolated.
    pub position: f64,
    pub length: u64,
}

/// Snapshot assembled for the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub tod: String,
    pub busy: bool,
    pub robot: RobotStatus,
    pub queue_len: usize,
    pub queue_full: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePlaybackStatus>,
}

/// Routes incoming command strings and drives the evaluator pipeline.
///
/// The evaluator set is fixed and serviced in a hard priority order:
/// theta-rho first, then files, then sequences. That order is an invariant
/// of the pipeline, not an accident: the file evaluator must never advance
/// to the next line while the theta-rho evaluator is mid-interpolation, and
/// sequences inject whole new commands so they only run on an empty queue.
pub struct WorkManager {
    queue: WorkItemQueue,
    theta_rho: EvaluatorThetaRhoLine,
    files: EvaluatorFiles,
    sequences: EvaluatorSequences,
}

impl WorkManager {
    pub fn new(config: &Config, file_manager: FileManager) -> Self {
        Self {
            queue: WorkItemQueue::new(config.robot.work_queue_size),
            theta_rho: EvaluatorThetaRhoLine::new(),
            files: EvaluatorFiles::new(file_manager.clone()),
            sequences: EvaluatorSequences::new(file_manager),
        }
    }

    /// Apply a (possibly new) robot profile: rebuild the queue with the
    /// configured capacity, reinstall the transform and push fresh settings
    /// and robot attributes into every evaluator.
    pub fn reconfigure(&mut self, config: &Config, robot: &mut RobotController) {
        robot.reconfigure(&config.robot);
        self.queue = WorkItemQueue::new(config.robot.work_queue_size);
        let attributes = robot.attributes();
        self.theta_rho.set_config(&config.evaluators, &attributes);
        self.files.set_config(&config.evaluators, &attributes);
        self.sequences.set_config(&config.evaluators, &attributes);
        tracing::info!(
            "Work manager configured, queue capacity {}",
            config.robot.work_queue_size
        );
    }

    /// Submit the startup command string from the configuration, if any.
    pub fn handle_startup_commands(&mut self, config: &Config, robot: &mut RobotController) {
        let cmds = config.cmds_at_start.trim();
        if !cmds.is_empty() {
            tracing::info!("Running startup commands: {}", cmds);
            self.add_work_item(robot, WorkItem::new(cmds));
        }
    }

    /// Transport entry point: one request line in, one result out.
    pub fn process_request(&mut self, robot: &mut RobotController, line: &str) -> CommandResult {
        self.add_work_item(robot, WorkItem::new(line))
    }

    pub fn can_accept_work_item(&self) -> bool {
        !self.queue.is_full()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Process a work item, splitting `;`-joined command lists.
    ///
    /// When the item carries an origin index, only the sub-command at that
    /// position runs; playlist lines reuse their line index here.
    pub fn add_work_item(&mut self, robot: &mut RobotController, item: WorkItem) -> CommandResult {
        if !item.command().contains(';') {
            return self.process_single(robot, item.command());
        }

        let selector = item.origin_index();
        let mut result = CommandResult::None;
        for (cmd_idx, part) in item
            .command()
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .enumerate()
        {
            if selector.is_none_or(|sel| sel == cmd_idx) {
                result = self.process_single(robot, part);
            }
        }
        result
    }

    /// Handle one command: immediate keywords synchronously, everything else
    /// onto the queue.
    fn process_single(&mut self, robot: &mut RobotController, command: &str) -> CommandResult {
        let command = command.trim();
        match command.to_ascii_lowercase().as_str() {
            "" => CommandResult::None,
            "pause" | "sleep" => {
                robot.pause(true);
                CommandResult::Ok
            }
            "resume" => {
                robot.pause(false);
                CommandResult::Ok
            }
            "playpause" => {
                robot.pause(!robot.is_paused());
                CommandResult::Ok
            }
            "stop" => {
                robot.stop();
                self.queue.clear();
                self.evaluators_stop();
                CommandResult::Ok
            }
            "seq_next" => self.sequence_skip(robot, false),
            "seq_prev" => self.sequence_skip(robot, true),
            "seq_shuffle_on" => self.sequence_set_shuffle(true),
            "seq_shuffle_off" => self.sequence_set_shuffle(false),
            "seq_repeat_on" => self.sequence_set_repeat(true),
            "seq_repeat_off" => self.sequence_set_repeat(false),
            _ => {
                if self.queue.add(WorkItem::new(command)) {
                    CommandResult::Ok
                } else {
                    tracing::debug!("Work queue full, rejected: {}", command);
                    CommandResult::Busy
                }
            }
        }
    }

    /// Abort the current playlist entry so the next (or previous) one starts
    /// clean. The sequence evaluator itself stays busy and picks the new
    /// line on its next service.
    fn sequence_skip(&mut self, robot: &mut RobotController, previous: bool) -> CommandResult {
        if !self.sequences.is_busy() {
            return CommandResult::None;
        }
        robot.stop();
        self.theta_rho.stop();
        self.files.stop();
        self.queue.clear();
        if previous {
            self.sequences.load_previous();
        }
        CommandResult::Ok
    }

    fn sequence_set_shuffle(&mut self, shuffle: bool) -> CommandResult {
        if !self.sequences.is_busy() {
            return CommandResult::None;
        }
        self.sequences.set_shuffle_mode(shuffle);
        CommandResult::Ok
    }

    fn sequence_set_repeat(&mut self, repeat: bool) -> CommandResult {
        if !self.sequences.is_busy() {
            return CommandResult::None;
        }
        self.sequences.set_repeat_mode(repeat);
        CommandResult::Ok
    }

    /// Would some consumer take this item right now?
    fn can_be_processed(&self, item: &WorkItem, robot: &RobotController) -> bool {
        if self.theta_rho.is_valid(item) {
            return !self.theta_rho.is_busy();
        }
        if self.files.is_valid(item) {
            return !self.files.is_busy();
        }
        if self.sequences.is_valid(item) {
            return !self.sequences.is_busy();
        }
        // Plain motion code goes straight to the robot.
        robot.can_accept_command()
    }

    /// Offer the item to each evaluator in priority order.
    fn try_exec(&mut self, robot: &mut RobotController, item: &WorkItem) -> bool {
        let (handled, dispatches) = {
            let mut ctx = EvalContext::new(&mut self.queue);
            let handled = if self.theta_rho.is_valid(item)
                && self.theta_rho.exec_work_item(item, &mut ctx)
            {
                true
            } else if self.files.is_valid(item) && self.files.exec_work_item(item, &mut ctx) {
                true
            } else {
                self.sequences.is_valid(item) && self.sequences.exec_work_item(item, &mut ctx)
            };
            (handled, ctx.dispatches)
        };
        for dispatch in dispatches {
            self.add_work_item(robot, dispatch);
        }
        handled
    }

    /// One tick of the pipeline: pump at most one queued item, then give
    /// each evaluator its service slot.
    pub fn service(&mut self, robot: &mut RobotController) {
        if robot.can_accept_command() {
            if let Some(next) = self.queue.peek().cloned() {
                if self.can_be_processed(&next, robot) {
                    if let Some(item) = self.queue.get() {
                        let handled = self.try_exec(robot, &item);
                        if !handled && !gcode::interpret_motion_code(&item, robot) {
                            tracing::warn!("Dropped unhandled work item: {}", item.command());
                        }
                    }
                }
            }
        }

        self.evaluators_service(robot);
    }

    fn evaluators_service(&mut self, robot: &mut RobotController) {
        {
            let mut ctx = EvalContext::new(&mut self.queue);
            self.theta_rho.service(&mut ctx);
        }
        if !self.evaluators_busy(false) {
            let dispatches = {
                let mut ctx = EvalContext::new(&mut self.queue);
                self.files.service(&mut ctx);
                ctx.dispatches
            };
            for dispatch in dispatches {
                self.add_work_item(robot, dispatch);
            }
        }
        if !self.evaluators_busy(true) {
            let dispatches = {
                let mut ctx = EvalContext::new(&mut self.queue);
                self.sequences.service(&mut ctx);
                ctx.dispatches
            };
            for dispatch in dispatches {
                self.add_work_item(robot, dispatch);
            }
        }
    }

    /// Whether a higher-priority evaluator still holds the pipeline.
    /// Sequences are deliberately not counted: they sit a layer above
    /// item-level flow and gate themselves on an empty queue instead.
    fn evaluators_busy(&self, include_file_evaluator: bool) -> bool {
        if self.theta_rho.is_busy() {
            return true;
        }
        include_file_evaluator && self.files.is_busy()
    }

    fn evaluators_stop(&mut self) {
        self.sequences.stop();
        self.files.stop();
        self.theta_rho.stop();
    }

    pub fn query_status(&self, robot: &RobotController) -> StatusReport {
        let playlist = self.sequences.is_busy().then(|| PlaylistStatus {
            name: self.sequences.file_name().to_string(),
            index: self.sequences.current_line_index(),
            repeat: self.sequences.repeat_mode(),
            shuffle: self.sequences.shuffle_mode(),
        });

        let file = self.files.is_busy().then(|| {
            let mut position = self.files.current_file_position() as f64;
            if self.theta_rho.is_busy() {
                // While a line is being interpolated, walk the reported
                // position back by the fraction not yet drawn.
                position -= (1.0 - self.theta_rho.line_progress())
                    * self.files.current_line_length() as f64;
            }
            FilePlaybackStatus {
                name: self.files.file_name().to_string(),
                job_id: self.files.job_id().to_string(),
                position,
                length: self.files.total_file_length(),
            }
        });

        StatusReport {
            tod: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            busy: self.theta_rho.is_busy()
                || self.files.is_busy()
                || self.sequences.is_busy()
                || !robot.is_idle(),
            robot: robot.status(),
            queue_len: self.queue.len(),
            queue_full: self.queue.is_full(),
            playlist,
            file,
        }
    }
}
