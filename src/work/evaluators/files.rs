// src/work/evaluators/files.rs - Streams pattern and motion-code files
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::file_manager::FileManager;
use crate::motion::RobotAttributes;
use crate::work::evaluators::{config_flag, EvalContext, Evaluator};
use crate::work::WorkItem;

/// Bound on how many lines may be scanned (comments, blanks) in one tick.
const MAX_LINES_SCANNED_PER_SERVICE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileType {
    Gcode,
    ThetaRho,
}

fn file_type_from_extension(file_name: &str) -> Option<FileType> {
    match FileManager::extension(file_name).as_str() {
        "thr" => Some(FileType::ThetaRho),
        "gcode" | "gc" | "nc" => Some(FileType::Gcode),
        _ => None,
    }
}

/// Plays a file one line per tick, re-emitting theta-rho data lines as
/// interpolation markers and motion-code lines verbatim.
///
/// Files are read incrementally through a small buffered reader rather than
/// loaded wholesale; byte position and current line length are tracked so
/// the dispatcher can report playback progress.
pub struct EvaluatorFiles {
    file_manager: FileManager,
    interpolate: bool,

    in_progress: bool,
    file_type: FileType,
    file_name: String,
    job_id: String,
    reader: Option<BufReader<File>>,
    file_len: u64,
    file_pos: u64,
    cur_line_len: usize,
    first_point_sent: bool,
}

impl EvaluatorFiles {
    pub fn new(file_manager: FileManager) -> Self {
        Self {
            file_manager,
            interpolate: true,
            in_progress: false,
            file_type: FileType::Gcode,
            file_name: String::new(),
            job_id: String::new(),
            reader: None,
            file_len: 0,
            file_pos: 0,
            cur_line_len: 0,
            first_point_sent: false,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn total_file_length(&self) -> u64 {
        self.file_len
    }

    pub fn current_file_position(&self) -> u64 {
        self.file_pos
    }

    pub fn current_line_length(&self) -> usize {
        self.cur_line_len
    }

    fn dispatch_theta_rho_line(&mut self, line: &str, ctx: &mut EvalContext) -> bool {
        // Data lines are `theta rho` pairs, theta in radians.
        let mut fields = line.split_whitespace();
        let (Some(theta), Some(rho)) = (
            fields.next().and_then(|f| f.parse::<f64>().ok()),
            fields.next().and_then(|f| f.parse::<f64>().ok()),
        ) else {
            tracing::debug!("Skipping unparseable theta-rho line: {}", line);
            return false;
        };

        let theta_degs = theta.to_degrees();
        let marker = if !self.interpolate {
            "_THRLINE_"
        } else if !self.first_point_sent {
            "_THRLINE0_"
        } else {
            "_THRLINEN_"
        };
        self.first_point_sent = true;
        ctx.dispatches.push(WorkItem::new(format!(
            "{marker}/{theta_degs:.5}/{rho:.5}"
        )));
        true
    }

    fn finish(&mut self) {
        tracing::info!("Finished file '{}'", self.file_name);
        self.in_progress = false;
        self.reader = None;
    }
}

impl Evaluator for EvaluatorFiles {
    fn set_config(&mut self, config: &Value, _attributes: &RobotAttributes) {
        self.interpolate = config_flag(config, "thrInterpolate", true);
    }

    fn is_valid(&self, item: &WorkItem) -> bool {
        let file_name = item.command().trim();
        if file_type_from_extension(file_name).is_none() {
            return false;
        }
        self.file_manager.file_len(file_name).is_some()
    }

    fn is_busy(&self) -> bool {
        self.in_progress
    }

    fn exec_work_item(&mut self, item: &WorkItem, _ctx: &mut EvalContext) -> bool {
        let file_name = item.command().trim();
        let Some(file_type) = file_type_from_extension(file_name) else {
            return false;
        };
        let (reader, file_len) = match self.file_manager.open_streaming(file_name) {
            Ok(opened) => opened,
            Err(err) => {
                tracing::warn!("Cannot open '{}': {}", file_name, err);
                return false;
            }
        };

        self.file_type = file_type;
        self.file_name = file_name.to_string();
        self.job_id = uuid::Uuid::new_v4().to_string();
        self.reader = Some(reader);
        self.file_len = file_len;
        self.file_pos = 0;
        self.cur_line_len = 0;
        self.first_point_sent = false;
        self.in_progress = true;
        tracing::info!(
            "Playing file '{}' ({} bytes, job {})",
            self.file_name,
            self.file_len,
            self.job_id
        );
        true
    }

    fn service(&mut self, ctx: &mut EvalContext) {
        if !self.in_progress {
            return;
        }
        // Hold the stream position until the queue can take the next item.
        if ctx.queue.is_full() {
            return;
        }
        let Some(mut reader) = self.reader.take() else {
            self.in_progress = false;
            return;
        };

        for _ in 0..MAX_LINES_SCANNED_PER_SERVICE {
            let mut raw_line = String::new();
            let bytes_read = match reader.read_line(&mut raw_line) {
                Ok(n) => n,
                Err(err) => {
                    tracing::warn!("Read error in '{}': {}", self.file_name, err);
                    self.finish();
                    return;
                }
            };
            if bytes_read == 0 {
                self.finish();
                return;
            }
            self.file_pos += bytes_read as u64;
            self.cur_line_len = bytes_read;

            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let dispatched = match self.file_type {
                FileType::ThetaRho => {
                    if line.starts_with('#') {
                        continue;
                    }
                    self.dispatch_theta_rho_line(line, ctx)
                }
                FileType::Gcode => {
                    if line.starts_with(';') {
                        continue;
                    }
                    ctx.dispatches.push(WorkItem::new(line.to_string()));
                    true
                }
            };
            if dispatched {
                self.reader = Some(reader);
                return;
            }
        }
        self.reader = Some(reader);
    }

    fn stop(&mut self) {
        self.in_progress = false;
        self.reader = None;
    }
}
