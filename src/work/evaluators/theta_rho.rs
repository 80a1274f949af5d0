// src/work/evaluators/theta_rho.rs - Polar line-art interpolation evaluator
use serde_json::Value;

use crate::motion::RobotAttributes;
use crate::work::evaluators::{config_f64, config_flag, config_i64, EvalContext, Evaluator};
use crate::work::WorkItem;

/// Work-item markers. Theta and rho follow as `/`-delimited fields, theta in
/// degrees, rho normalized 0..1.
const MARKER_PREFIX: &str = "_THRLINE";
const MARKER_DIRECT: &str = "_THRLINE_";
const MARKER_PATH_START: &str = "_THRLINE0_";
const MARKER_POINT: &str = "_THRLINEN_";

const DEFAULT_STEP_ANGLE_DEGS: f64 = 2.8125;
/// Radius at which the configured base step angle applies unchanged.
const RHO_AT_DEFAULT_STEP_ANGLE: f64 = 0.2;
const MAX_STEP_ANGLE_DEGS: f64 = 90.0;
/// Bound on interpolation work per service tick.
const PROCESS_STEPS_PER_SERVICE: u32 = 10;

/// Splits large angular jumps of a theta-rho path into bounded steps so the
/// pen path stays smooth, with a step angle that adapts to the radius:
/// coarse near the center, fine near the rim.
pub struct EvaluatorThetaRhoLine {
    step_angle_degs: f64,
    step_adaptation: bool,
    continue_from_previous: bool,
    theta_mirrored: bool,
    theta_offset_angle: i64,
    bed_radius_mm: f64,
    centre_offset_x: f64,
    centre_offset_y: f64,

    in_progress: bool,
    is_interpolating: bool,
    cur_step: u32,
    interpolate_steps: u32,
    theta_inc: f64,
    rho_inc: f64,
    cur_theta: f64,
    cur_rho: f64,
    prev_theta: f64,
    prev_rho: f64,
    theta_start_offset: f64,
}

impl EvaluatorThetaRhoLine {
    pub fn new() -> Self {
        Self {
            step_angle_degs: DEFAULT_STEP_ANGLE_DEGS,
            step_adaptation: true,
            continue_from_previous: true,
            theta_mirrored: true,
            theta_offset_angle: 1,
            bed_radius_mm: 0.0,
            centre_offset_x: 0.0,
            centre_offset_y: 0.0,
            in_progress: false,
            is_interpolating: false,
            cur_step: 0,
            interpolate_steps: 0,
            theta_inc: 0.0,
            rho_inc: 0.0,
            cur_theta: 0.0,
            cur_rho: 0.0,
            prev_theta: 0.0,
            prev_rho: 0.0,
            theta_start_offset: 0.0,
        }
    }

    /// Fraction of the current line already emitted, for progress reporting.
    pub fn line_progress(&self) -> f64 {
        if !self.is_interpolating || self.interpolate_steps == 0 {
            return 0.5;
        }
        self.cur_step as f64 / self.interpolate_steps as f64
    }

    fn parse_fields(command: &str) -> (f64, f64) {
        let mut fields = command.split('/');
        fields.next();
        let theta = fields
            .next()
            .and_then(|f| f.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        let rho = fields
            .next()
            .and_then(|f| f.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        (theta, rho)
    }

    fn calc_xy(&self, theta_degs: f64, rho: f64) -> (f64, f64) {
        let theta = theta_degs.to_radians();
        (
            theta.sin() * rho * self.bed_radius_mm + self.centre_offset_x,
            theta.cos() * rho * self.bed_radius_mm + self.centre_offset_y,
        )
    }

    fn emit_point(&self, theta_degs: f64, rho: f64, ctx: &mut EvalContext) {
        let (x, y) = self.calc_xy(theta_degs, rho);
        if !ctx.queue.add(WorkItem::new(format!("G0 X{x:.3} Y{y:.3}"))) {
            tracing::debug!("Work queue full, dropped interpolated point");
        }
    }

    fn adapted_step_angle(&self, new_rho: f64, prev_rho: f64) -> f64 {
        if !self.step_adaptation {
            return self.step_angle_degs;
        }
        let avg_rho = new_rho.abs().max(prev_rho.abs()).min(1.0);
        let max_step = (self.step_angle_degs * 16.0).min(MAX_STEP_ANGLE_DEGS);
        let min_step = self.step_angle_degs / 4.0;
        if avg_rho > RHO_AT_DEFAULT_STEP_ANGLE {
            ((avg_rho - RHO_AT_DEFAULT_STEP_ANGLE) / (1.0 - RHO_AT_DEFAULT_STEP_ANGLE))
                * (min_step - self.step_angle_degs)
                + self.step_angle_degs
        } else {
            (avg_rho / RHO_AT_DEFAULT_STEP_ANGLE) * (self.step_angle_degs - max_step) + max_step
        }
    }
}

impl Default for EvaluatorThetaRhoLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for EvaluatorThetaRhoLine {
    fn set_config(&mut self, config: &Value, attributes: &RobotAttributes) {
        self.step_angle_degs = config_f64(config, "thrStepDegs", DEFAULT_STEP_ANGLE_DEGS);
        self.step_adaptation = config_flag(config, "thrStepAdaptation", true);
        self.continue_from_previous = config_flag(config, "thrContinue", true);
        self.theta_mirrored = config_flag(config, "thrThetaMirrored", true);
        self.theta_offset_angle = config_i64(config, "thrThetaOffsetAngle", 1);
        self.bed_radius_mm = attributes.size_x.min(attributes.size_y) / 2.0;
        self.centre_offset_x = attributes.size_x / 2.0 - attributes.origin_x;
        self.centre_offset_y = attributes.size_y / 2.0 - attributes.origin_y;
    }

    fn is_valid(&self, item: &WorkItem) -> bool {
        item.command().trim().starts_with(MARKER_PREFIX)
    }

    fn is_busy(&self) -> bool {
        self.in_progress
    }

    fn exec_work_item(&mut self, item: &WorkItem, ctx: &mut EvalContext) -> bool {
        let command = item.command().trim();
        let (raw_theta, raw_rho) = Self::parse_fields(command);
        let mirrored = if self.theta_mirrored { -1.0 } else { 1.0 };
        let new_theta = raw_theta * mirrored + 180.0 * self.theta_offset_angle as f64;
        let new_rho = raw_rho;

        // Direct line: one point, no interpolation.
        if command.starts_with(MARKER_DIRECT) {
            self.is_interpolating = false;
            self.emit_point(new_theta, new_rho, ctx);
            return true;
        }

        // First point of a new path: establish the baseline, no motion.
        if command.starts_with(MARKER_PATH_START) {
            self.theta_start_offset = if self.continue_from_previous {
                new_theta - self.prev_theta
            } else {
                0.0
            };
            self.prev_theta = new_theta;
            self.prev_rho = new_rho;
            self.is_interpolating = false;
            return true;
        }

        if !command.starts_with(MARKER_POINT) {
            return false;
        }

        let delta_theta = new_theta - self.theta_start_offset - self.prev_theta;
        let abs_delta_theta = delta_theta.abs();
        let adapted_step_angle = self.adapted_step_angle(new_rho, self.prev_rho);
        let delta_rho = new_rho - self.prev_rho;

        if abs_delta_theta < adapted_step_angle {
            // Single step: use the exact delta rather than the adapted angle.
            self.theta_inc = delta_theta;
            self.rho_inc = delta_rho;
            self.interpolate_steps = 1;
        } else {
            self.interpolate_steps = (abs_delta_theta / adapted_step_angle).floor() as u32;
            self.theta_inc = if delta_theta >= 0.0 {
                adapted_step_angle
            } else {
                -adapted_step_angle
            };
            self.rho_inc = delta_rho * adapted_step_angle / abs_delta_theta;
        }

        self.cur_theta = self.prev_theta;
        self.cur_rho = self.prev_rho;
        self.prev_theta = new_theta;
        self.prev_rho = new_rho;
        self.cur_step = 0;
        self.in_progress = true;
        self.is_interpolating = true;
        true
    }

    fn service(&mut self, ctx: &mut EvalContext) {
        if !self.in_progress || !self.is_interpolating {
            return;
        }

        for _ in 0..PROCESS_STEPS_PER_SERVICE {
            if self.cur_step >= self.interpolate_steps {
                self.in_progress = false;
                return;
            }

            // Only advance while the downstream queue can take more.
            if ctx.queue.is_full() {
                return;
            }

            self.cur_step += 1;
            self.cur_theta += self.theta_inc;
            self.cur_rho += self.rho_inc;
            self.emit_point(self.cur_theta, self.cur_rho, ctx);
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

    fn plain_config() -> Value {
        json!({
            "thrStepDegs": 10.0,
            "thrStepAdaptation": false,
            "thrContinue": false,
            "thrThetaMirrored": false,
            "thrThetaOffsetAngle": 0,
        })
    }

    fn test_attrs() -> RobotAttributes {
        RobotAttributes {
            size_x: 200.0,
            size_y: 200.0,
            size_z: 0.0,
            origin_x: 100.0,
            origin_y: 100.0,
            origin_z: 0.0,
        }
    }

    fn drain(queue: &mut WorkItemQueue) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = queue.get() {
            out.push(item.command().to_string());
        }
        out
    }

    #[test]
    fn test_interpolates_half_turn_in_equal_steps() {
        let mut eval = EvaluatorThetaRhoLine::new();
        eval.set_config(&plain_config(), &test_attrs());
        let mut queue = WorkItemQueue::new(100);

        let mut ctx = EvalContext::new(&mut queue);
        assert!(eval.exec_work_item(&WorkItem::new("_THRLINE0_/0/0"), &mut ctx));
        assert!(!eval.is_busy());
        assert!(eval.exec_work_item(&WorkItem::new("_THRLINEN_/180/0.5"), &mut ctx));
        assert!(eval.is_busy());

        while eval.is_busy() {
            eval.service(&mut ctx);
        }

        let emitted = drain(&mut queue);
        assert_eq!(emitted.len(), 18);
        // Each step advances theta by 10 degrees and rho by 1/36; the final
        // point lands exactly on the target.
        assert_eq!(emitted.last().unwrap(), "G0 X0.000 Y-50.000");
        let first = &emitted[0];
        let expect_x = 10f64.to_radians().sin() * (0.5 / 18.0) * 100.0;
        assert_eq!(first, &format!("G0 X{expect_x:.3} Y{:.3}", 10f64.to_radians().cos() * (0.5 / 18.0) * 100.0));
    }

    #[test]
    fn test_single_step_uses_exact_delta() {
        let mut eval = EvaluatorThetaRhoLine::new();
        eval.set_config(&plain_config(), &test_attrs());
        let mut queue = WorkItemQueue::new(10);
        let mut ctx = EvalContext::new(&mut queue);

        eval.exec_work_item(&WorkItem::new("_THRLINE0_/0/0.5"), &mut ctx);
        eval.exec_work_item(&WorkItem::new("_THRLINEN_/3/0.5"), &mut ctx);
        eval.service(&mut ctx);
        assert!(!eval.is_busy());

        let emitted = drain(&mut queue);
        assert_eq!(emitted.len(), 1);
        let (x, y) = (
            3f64.to_radians().sin() * 0.5 * 100.0,
            3f64.to_radians().cos() * 0.5 * 100.0,
        );
        assert_eq!(emitted[0], format!("G0 X{x:.3} Y{y:.3}"));
    }

    #[test]
    fn test_adaptation_continuous_at_threshold() {
        let mut eval = EvaluatorThetaRhoLine::new();
        let mut config = plain_config();
        config["thrStepAdaptation"] = json!(true);
        eval.set_config(&config, &test_attrs());

        // At the threshold radius the adapted angle equals the base angle.
        assert!((eval.adapted_step_angle(RHO_AT_DEFAULT_STEP_ANGLE, 0.0) - 10.0).abs() < 1e-9);
        // At full radius it reaches the minimum, a quarter of the base.
        assert!((eval.adapted_step_angle(1.0, 0.0) - 2.5).abs() < 1e-9);
        // At the center it reaches the maximum, capped at 90 degrees.
        assert!((eval.adapted_step_angle(0.0, 0.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_adapted_step_count() {
        let mut eval = EvaluatorThetaRhoLine::new();
        let mut config = plain_config();
        config["thrStepAdaptation"] = json!(true);
        eval.set_config(&config, &test_attrs());
        let mut queue = WorkItemQueue::new(200);
        let mut ctx = EvalContext::new(&mut queue);

        // At rho 1.0 the step shrinks to 2.5 degrees, so a 100 degree sweep
        // takes 40 steps.
        eval.exec_work_item(&WorkItem::new("_THRLINE0_/0/1"), &mut ctx);
        eval.exec_work_item(&WorkItem::new("_THRLINEN_/100/1"), &mut ctx);
        while eval.is_busy() {
            eval.service(&mut ctx);
        }
        assert_eq!(drain(&mut queue).len(), 40);
    }

    #[test]
    fn test_service_respects_queue_back_pressure() {
        let mut eval = EvaluatorThetaRhoLine::new();
        eval.set_config(&plain_config(), &test_attrs());
        let mut queue = WorkItemQueue::new(4);

        let mut ctx = EvalContext::new(&mut queue);
        eval.exec_work_item(&WorkItem::new("_THRLINE0_/0/0"), &mut ctx);
        eval.exec_work_item(&WorkItem::new("_THRLINEN_/180/0.5"), &mut ctx);

        eval.service(&mut ctx);
        assert_eq!(ctx.queue.len(), 4);
        assert!(eval.is_busy());

        // Draining the queue lets interpolation continue where it left off.
        let batch = drain(&mut queue);
        assert_eq!(batch.len(), 4);
        let mut ctx = EvalContext::new(&mut queue);
        eval.service(&mut ctx);
        assert_eq!(ctx.queue.len(), 4);
        assert!((eval.line_progress() - 8.0 / 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_direct_line_emits_single_point() {
        let mut eval = EvaluatorThetaRhoLine::new();
        eval.set_config(&plain_config(), &test_attrs());
        let mut queue = WorkItemQueue::new(10);
        let mut ctx = EvalContext::new(&mut queue);

        assert!(eval.exec_work_item(&WorkItem::new("_THRLINE_/90/1"), &mut ctx));
        assert!(!eval.is_busy());
        let emitted = drain(&mut queue);
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].starts_with("G0 X100.000"));
    }

    #[test]
    fn test_mirror_and_offset_transform_theta() {
        let mut eval = EvaluatorThetaRhoLine::new();
        // Defaults: mirrored with a half-turn offset.
        eval.set_config(&serde_json::Value::Null, &test_attrs());
        let mut queue = WorkItemQueue::new(10);
        let mut ctx = EvalContext::new(&mut queue);

        // Theta 90 mirrored becomes -90, plus 180 gives 90 again... pick 30:
        // -30 + 180 = 150.
        eval.exec_work_item(&WorkItem::new("_THRLINE_/30/1"), &mut ctx);
        let emitted = drain(&mut queue);
        let (x, y) = (
            150f64.to_radians().sin() * 100.0,
            150f64.to_radians().cos() * 100.0,
        );
        assert_eq!(emitted[0], format!("G0 X{x:.3} Y{y:.3}"));
    }

    #[test]
    fn test_stop_resets_busy() {
        let mut eval = EvaluatorThetaRhoLine::new();
        eval.set_config(&plain_config(), &test_attrs());
        let mut queue = WorkItemQueue::new(10);
        let mut ctx = EvalContext::new(&mut queue);

        eval.exec_work_item(&WorkItem::new("_THRLINE0_/0/0"), &mut ctx);
        eval.exec_work_item(&WorkItem::new("_THRLINEN_/180/0.5"), &mut ctx);
        assert!(eval.is_busy());
        eval.stop();
        assert!(!eval.is_busy());
        eval.stop();
        assert!(!eval.is_busy());
    }

    #[test]
    fn test_rejects_unknown_items() {
        let mut eval = EvaluatorThetaRhoLine::new();
        eval.set_config(&plain_config(), &test_attrs());
        assert!(eval.is_valid(&WorkItem::new("_THRLINEN_/1/1")));
        assert!(eval.is_valid(&WorkItem::new("  _THRLINE0_/1/1")));
        assert!(!eval.is_valid(&WorkItem::new("G0 X1 Y2")));
        assert!(!eval.is_valid(&WorkItem::new("pattern.thr")));
    }
}
