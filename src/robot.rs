// src/robot.rs - Robot controller: accepts elementary moves, owns the position
use serde::Serialize;
use std::collections::VecDeque;

use crate::config::RobotConfig;
use crate::motion::{
    create_kinematics, AxesParams, AxisFloats, AxisPosition, KinematicsTransform, MotionError,
    RobotAttributes,
};

/// One elementary Cartesian move request.
#[derive(Debug, Clone, Copy)]
pub struct MoveTarget {
    pub x: f64,
    pub y: f64,
    pub allow_out_of_bounds: bool,
}

impl MoveTarget {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            allow_out_of_bounds: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RobotStatus {
    pub x_mm: f64,
    pub y_mm: f64,
    pub steps_from_home: [i32; 2],
    pub paused: bool,
    pub pending_moves: usize,
}

/// Consumes elementary Cartesian targets, applies the kinematics transform
/// and retires one planned actuator move per tick.
///
/// The pending buffer stands in for the lower motion pipeline: its fullness
/// is the back-pressure signal the work dispatcher polls before dequeuing.
pub struct RobotController {
    kinematics: Box<dyn KinematicsTransform>,
    params: AxesParams,
    position: AxisPosition,
    pending: VecDeque<AxisPosition>,
    pipeline_depth: usize,
    paused: bool,
}

impl RobotController {
    pub fn new(config: &RobotConfig) -> Self {
        let kinematics = create_kinematics(&config.model);
        let params = AxesParams::from_config(&config.axes);
        let mut controller = Self {
            kinematics,
            params,
            position: AxisPosition::default(),
            pending: VecDeque::new(),
            pipeline_depth: config.motion_pipeline_depth,
            paused: false,
        };
        controller.home();
        controller
    }

    /// Swap in a new robot profile. Pending motion is discarded and the
    /// machine is treated as freshly homed.
    pub fn reconfigure(&mut self, config: &RobotConfig) {
        self.kinematics = create_kinematics(&config.model);
        self.params = AxesParams::from_config(&config.axes);
        self.pipeline_depth = config.motion_pipeline_depth;
        self.pending.clear();
        self.paused = false;
        self.home();
        tracing::info!("Robot controller reconfigured for model '{}'", config.model);
    }

    /// Whether the pipeline has room for one more planned move.
    pub fn can_accept_command(&self) -> bool {
        self.pending.len() < self.pipeline_depth
    }

    /// Plan a move to a Cartesian target.
    pub fn move_to(&mut self, target: MoveTarget) -> Result<(), MotionError> {
        if !self.can_accept_command() {
            return Err(MotionError::PipelineFull);
        }
        let planned_from = self
            .pending
            .back()
            .copied()
            .unwrap_or(self.position);
        let steps = self.kinematics.pt_to_actuator(
            &AxisFloats::new(target.x, target.y),
            &planned_from,
            &self.params,
            target.allow_out_of_bounds,
        )?;
        let mut planned = AxisPosition {
            steps_from_home: steps,
            axis_position_mm: AxisFloats::default(),
        };
        self.kinematics.correct_step_overflow(&mut planned, &self.params);
        planned.axis_position_mm = self
            .kinematics
            .actuator_to_pt(&planned.steps_from_home, &self.params);
        self.pending.push_back(planned);
        Ok(())
    }

    /// Zero both step counters and re-derive the Cartesian snapshot.
    pub fn home(&mut self) {
        self.position.steps_from_home = Default::default();
        self.position.axis_position_mm = self
            .kinematics
            .actuator_to_pt(&self.position.steps_from_home, &self.params);
    }

    pub fn pause(&mut self, pause: bool) {
        if self.paused != pause {
            tracing::info!("Robot {}", if pause { "paused" } else { "resumed" });
        }
        self.paused = pause;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Abort: discard all planned motion immediately.
    pub fn stop(&mut self) {
        self.pending.clear();
    }

    /// Retire one planned move per tick unless paused.
    pub fn service(&mut self) {
        if self.paused {
            return;
        }
        if let Some(next) = self.pending.pop_front() {
            self.position = next;
            tracing::debug!(
                "Moved to ({:.2}, {:.2}) mm, steps {:?}",
                next.axis_position_mm.val(0),
                next.axis_position_mm.val(1),
                next.steps_from_home.0,
            );
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn position(&self) -> &AxisPosition {
        &self.position
    }

    pub fn attributes(&self) -> RobotAttributes {
        self.kinematics.robot_attributes(&self.params)
    }

    pub fn status(&self) -> RobotStatus {
        RobotStatus {
            x_mm: self.position.axis_position_mm.val(0),
            y_mm: self.position.axis_position_mm.val(1),
            steps_from_home: self.position.steps_from_home.0,
            paused: self.paused,
            pending_moves: self.pending.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;

    fn test_robot() -> RobotController {
        let mut config = RobotConfig::default();
        config.motion_pipeline_depth = 2;
        config.axes.rotary.steps_per_rotation = 3600.0;
        config.axes.linear.steps_per_rotation = 3600.0;
        config.axes.linear.units_per_rotation = 40.0;
        config.axes.linear.max_travel_mm = 100.0;
        RobotController::new(&config)
    }

    #[test]
    fn test_pipeline_back_pressure() {
        let mut robot = test_robot();
        assert!(robot.move_to(MoveTarget::new(10.0, 0.0)).is_ok());
        assert!(robot.move_to(MoveTarget::new(20.0, 0.0)).is_ok());
        assert!(!robot.can_accept_command());
        assert!(matches!(
            robot.move_to(MoveTarget::new(30.0, 0.0)),
            Err(MotionError::PipelineFull)
        ));

        robot.service();
        assert!(robot.can_accept_command());
    }

    #[test]
    fn test_service_applies_move() {
        let mut robot = test_robot();
        robot.move_to(MoveTarget::new(50.0, 0.0)).unwrap();
        robot.service();
        let status = robot.status();
        assert!((status.x_mm - 50.0).abs() < 0.5);
        assert!(status.y_mm.abs() < 0.5);
        assert!(robot.is_idle());
    }

    #[test]
    fn test_pause_blocks_service() {
        let mut robot = test_robot();
        robot.move_to(MoveTarget::new(50.0, 0.0)).unwrap();
        robot.pause(true);
        robot.service();
        assert_eq!(robot.status().pending_moves, 1);
        robot.pause(false);
        robot.service();
        assert!(robot.is_idle());
    }

    #[test]
    fn test_stop_discards_pending() {
        let mut robot = test_robot();
        robot.move_to(MoveTarget::new(50.0, 0.0)).unwrap();
        robot.stop();
        assert!(robot.is_idle());
        robot.service();
        assert!(robot.status().x_mm.abs() < 1e-9);
    }

    #[test]
    fn test_out_of_bounds_move_rejected() {
        let mut robot = test_robot();
        assert!(robot.move_to(MoveTarget::new(500.0, 0.0)).is_err());
        assert!(robot.is_idle());
    }

    #[test]
    fn test_consecutive_moves_plan_from_last_target() {
        let mut robot = test_robot();
        robot.move_to(MoveTarget::new(50.0, 0.0)).unwrap();
        robot.move_to(MoveTarget::new(0.0, 50.0)).unwrap();
        robot.service();
        robot.service();
        let status = robot.status();
        assert!(status.x_mm.abs() < 0.5);
        assert!((status.y_mm - 50.0).abs() < 0.5);
    }
}
