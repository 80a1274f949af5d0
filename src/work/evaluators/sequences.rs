// src/work/evaluators/sequences.rs - Playlist evaluator
use rand::Rng;
use serde_json::Value;

use crate::file_manager::FileManager;
use crate::motion::RobotAttributes;
use crate::work::evaluators::{config_flag, EvalContext, Evaluator};
use crate::work::WorkItem;

const SEQUENCE_EXTENSION: &str = "seq";
/// Playlists are bounded-size artifacts, not streamed ones.
const MAX_SEQUENCE_FILE_LEN: usize = 4096;

/// Plays a line-delimited command list, one line per service tick, with
/// optional shuffle and repeat modes.
///
/// This evaluator operates one layer above item-level flow control: it
/// injects new work items rather than consuming queued ones, so the
/// dispatcher only services it while the work queue is completely empty.
pub struct EvaluatorSequences {
    file_manager: FileManager,
    default_shuffle_mode: bool,
    default_repeat_mode: bool,
    shuffle_mode: bool,
    repeat_mode: bool,
    in_progress: bool,
    file_name: String,
    command_list: String,
    line_count: usize,
    lines_done: usize,
    req_line_idx: usize,
}

impl EvaluatorSequences {
    pub fn new(file_manager: FileManager) -> Self {
        Self {
            file_manager,
            default_shuffle_mode: false,
            default_repeat_mode: false,
            shuffle_mode: false,
            repeat_mode: false,
            in_progress: false,
            file_name: String::new(),
            command_list: String::new(),
            line_count: 0,
            lines_done: 0,
            req_line_idx: 0,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn current_line_index(&self) -> usize {
        self.req_line_idx
    }

    pub fn shuffle_mode(&self) -> bool {
        self.shuffle_mode
    }

    pub fn repeat_mode(&self) -> bool {
        self.repeat_mode
    }

    pub fn set_shuffle_mode(&mut self, shuffle: bool) {
        self.shuffle_mode = shuffle;
    }

    pub fn set_repeat_mode(&mut self, repeat: bool) {
        self.repeat_mode = repeat;
    }

    /// Step the cursor back one line (used by the "previous" control).
    pub fn load_previous(&mut self) {
        self.lines_done = self.lines_done.saturating_sub(1);
        self.req_line_idx = self.req_line_idx.saturating_sub(2);
    }

    fn count_lines(list: &str) -> usize {
        list.lines().filter(|line| !line.trim().is_empty()).count()
    }

    fn pick_shuffled_index(&self) -> usize {
        rand::rng().random_range(0..self.line_count)
    }
}

impl Evaluator for EvaluatorSequences {
    fn set_config(&mut self, config: &Value, _attributes: &RobotAttributes) {
        self.default_shuffle_mode = config_flag(config, "seqShuffleMode", false);
        self.default_repeat_mode = config_flag(config, "seqRepeatMode", false);
        self.line_count = 0;
    }

    fn is_valid(&self, item: &WorkItem) -> bool {
        let file_name = item.command().trim();
        if FileManager::extension(file_name) != SEQUENCE_EXTENSION {
            return false;
        }
        self.file_manager.file_len(file_name).unwrap_or(0) > 0
    }

    fn is_busy(&self) -> bool {
        self.in_progress
    }

    fn exec_work_item(&mut self, item: &WorkItem, _ctx: &mut EvalContext) -> bool {
        let file_name = item.command().trim();
        let Ok(command_list) = self
            .file_manager
            .read_to_string_capped(file_name, MAX_SEQUENCE_FILE_LEN)
        else {
            return false;
        };
        if command_list.is_empty() {
            return false;
        }

        self.file_name = file_name.to_string();
        self.command_list = command_list;
        self.in_progress = true;
        self.shuffle_mode = self.default_shuffle_mode;
        self.repeat_mode = self.default_repeat_mode;
        self.line_count = Self::count_lines(&self.command_list);

        // Inline directives override the configured defaults. The negated
        // form is checked second so it wins when both substrings match.
        if self.command_list.contains("ShuffleMode") {
            self.shuffle_mode = true;
        }
        if self.command_list.contains("NoShuffleMode") {
            self.shuffle_mode = false;
        }
        if self.command_list.contains("RepeatMode") {
            self.repeat_mode = true;
        }
        if self.command_list.contains("NoRepeatMode") {
            self.repeat_mode = false;
        }

        self.lines_done = 0;
        self.req_line_idx = 0;
        if self.shuffle_mode && self.line_count > 0 {
            self.req_line_idx = self.pick_shuffled_index();
        }
        tracing::info!(
            "Playing sequence '{}' ({} lines, shuffle {}, repeat {})",
            self.file_name,
            self.line_count,
            self.shuffle_mode,
            self.repeat_mode
        );
        true
    }

    fn service(&mut self, ctx: &mut EvalContext) {
        // Only inject new commands once the work queue has fully drained.
        if !ctx.queue.is_empty() {
            return;
        }
        if !self.in_progress {
            return;
        }
        if self.lines_done == self.line_count && !self.repeat_mode {
            self.in_progress = false;
            return;
        }

        let line = self
            .command_list
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .nth(self.req_line_idx)
            .map(str::to_string);

        let Some(line) = line else {
            self.in_progress = false;
            return;
        };

        // The playlist line index rides along as the sub-command selector.
        ctx.dispatches
            .push(WorkItem::with_index(line, self.req_line_idx));
        self.lines_done += 1;

        self.req_line_idx += 1;
        if self.req_line_idx >= self.line_count {
            self.req_line_idx = 0;
        }
        if self.shuffle_mode && self.line_count > 0 {
            self.req_line_idx = self.pick_shuffled_index();
        }
    }

    fn stop(&mut self) {
        self.in_progress = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::queue::WorkItemQueue;
    use serde_json::json;
    use tempfile::TempDir;

    fn sequence_dir(contents: &str) -> (TempDir, FileManager) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("evening.seq"), contents).unwrap();
        let fm = FileManager::new(dir.path());
        (dir, fm)
    }

    fn start(eval: &mut EvaluatorSequences, queue: &mut WorkItemQueue) {
        let mut ctx = EvalContext::new(queue);
        assert!(eval.exec_work_item(&WorkItem::new("evening.seq"), &mut ctx));
    }

    #[test]
    fn test_three_lines_then_idle_without_repeat() {
        let (_dir, fm) = sequence_dir("one.thr\ntwo.thr\n\nthree.thr\n");
        let mut eval = EvaluatorSequences::new(fm);
        let mut queue = WorkItemQueue::new(10);
        start(&mut eval, &mut queue);

        let mut dispatched = Vec::new();
        for _ in 0..5 {
            let mut ctx = EvalContext::new(&mut queue);
            eval.service(&mut ctx);
            dispatched.extend(ctx.dispatches);
        }
        assert_eq!(
            dispatched.iter().map(|i| i.command()).collect::<Vec<_>>(),
            vec!["one.thr", "two.thr", "three.thr"]
        );
        assert_eq!(dispatched[2].origin_index(), Some(2));
        assert!(!eval.is_busy());
    }

    #[test]
    fn test_repeat_wraps_to_first_line() {
        let (_dir, fm) = sequence_dir("one.thr\ntwo.thr\nthree.thr\n");
        let mut eval = EvaluatorSequences::new(fm);
        eval.set_config(&json!({"seqRepeatMode": true}), &RobotAttributes::default());
        let mut queue = WorkItemQueue::new(10);
        start(&mut eval, &mut queue);

        let mut dispatched = Vec::new();
        for _ in 0..4 {
            let mut ctx = EvalContext::new(&mut queue);
            eval.service(&mut ctx);
            dispatched.extend(ctx.dispatches);
        }
        assert_eq!(dispatched.len(), 4);
        assert_eq!(dispatched[3].command(), "one.thr");
        assert!(eval.is_busy());
    }

    #[test]
    fn test_inline_directives_override_defaults() {
        let (_dir, fm) = sequence_dir("RepeatMode\nNoShuffleMode\none.thr\n");
        let mut eval = EvaluatorSequences::new(fm);
        eval.set_config(&json!({"seqShuffleMode": true}), &RobotAttributes::default());
        let mut queue = WorkItemQueue::new(10);
        start(&mut eval, &mut queue);

        assert!(eval.repeat_mode());
        assert!(!eval.shuffle_mode());
    }

    #[test]
    fn test_only_services_when_queue_empty() {
        let (_dir, fm) = sequence_dir("one.thr\n");
        let mut eval = EvaluatorSequences::new(fm);
        let mut queue = WorkItemQueue::new(10);
        start(&mut eval, &mut queue);

        queue.add(WorkItem::new("G0 X1 Y1"));
        let mut ctx = EvalContext::new(&mut queue);
        eval.service(&mut ctx);
        assert!(ctx.dispatches.is_empty());
        assert!(eval.is_busy());
    }

    #[test]
    fn test_load_previous_clamps_at_start() {
        let (_dir, fm) = sequence_dir("one.thr\ntwo.thr\n");
        let mut eval = EvaluatorSequences::new(fm);
        let mut queue = WorkItemQueue::new(10);
        start(&mut eval, &mut queue);

        eval.load_previous();
        assert_eq!(eval.current_line_index(), 0);

        // After a full pass the cursor has wrapped; stepping back clamps to
        // the first line.
        for _ in 0..2 {
            let mut ctx = EvalContext::new(&mut queue);
            eval.service(&mut ctx);
        }
        eval.load_previous();
        let mut ctx = EvalContext::new(&mut queue);
        eval.service(&mut ctx);
        assert_eq!(ctx.dispatches[0].command(), "one.thr");
    }

    #[test]
    fn test_is_valid_checks_extension_and_existence() {
        let (_dir, fm) = sequence_dir("one.thr\n");
        let eval = EvaluatorSequences::new(fm);
        assert!(eval.is_valid(&WorkItem::new("evening.seq")));
        assert!(!eval.is_valid(&WorkItem::new("missing.seq")));
        assert!(!eval.is_valid(&WorkItem::new("evening.thr")));
    }

    #[test]
    fn test_runtime_toggles() {
        let (_dir, fm) = sequence_dir("one.thr\n");
        let mut eval = EvaluatorSequences::new(fm);
        let mut queue = WorkItemQueue::new(10);
        start(&mut eval, &mut queue);

        assert!(!eval.repeat_mode());
        eval.set_repeat_mode(true);
        assert!(eval.repeat_mode());
        eval.set_shuffle_mode(true);
        assert!(eval.shuffle_mode());
    }
}
