// src/motion/kinematics.rs - Geometry transforms between Cartesian, polar and actuator steps
use thiserror::Error;

use crate::motion::axes::{
    AxesParams, AxisFloats, AxisInt32s, AxisPosition, RobotAttributes, LINEAR_AXIS, ROTARY_AXIS,
};

/// Targets closer to the rotation axis than this are snapped to the origin,
/// since theta is undefined there.
const ORIGIN_TOLERANCE_MM: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("target ({x:.2}, {y:.2}) mm is outside the reachable radius")]
    OutOfBounds { x: f64, y: f64 },
}

/// Per-geometry transform between Cartesian targets and actuator step counts.
///
/// Implementations are pure: all state lives in the `AxisPosition` and
/// `AxesParams` the caller passes in. One implementation exists per robot
/// geometry and is injected into the controller at configuration time.
pub trait KinematicsTransform: Send {
    /// Convert a Cartesian target to absolute actuator step targets,
    /// moving relative to the current position.
    fn pt_to_actuator(
        &self,
        target: &AxisFloats,
        cur: &AxisPosition,
        params: &AxesParams,
        allow_out_of_bounds: bool,
    ) -> Result<AxisInt32s, KinematicsError>;

    /// Convert absolute actuator steps back to a Cartesian point.
    fn actuator_to_pt(&self, steps: &AxisInt32s, params: &AxesParams) -> AxisFloats;

    /// Normalize the rotary step count back into one rotation's range
    /// without changing the physical position.
    fn correct_step_overflow(&self, pos: &mut AxisPosition, params: &AxesParams);

    /// Drawable bounding box for this geometry.
    fn robot_attributes(&self, params: &AxesParams) -> RobotAttributes;
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

/// Minimum rotation from one absolute angle to another, in degrees.
/// The result is always in `(-180, 180]` so the arm takes the short way round.
pub fn shortest_rotation_degs(target: f64, current: f64) -> f64 {
    let diff = target - current;
    if diff <= -180.0 {
        diff + 360.0
    } else if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Two-axis polar geometry with a continuously rotating arm and a linear
/// carriage sharing the same gear train.
///
/// Positive rotary steps turn the plate clockwise; positive linear steps move
/// the carriage outward. Because the rack is driven through the rotor's gear
/// train, turning the arm alone displaces the carriage, so every conversion
/// here carries a coupling term proportional to the rotary step count.
pub struct CoupledRotaryLinearKinematics;

impl CoupledRotaryLinearKinematics {
    /// Absolute actuator steps to `(theta degrees in [0, 360), rho in 0..1)`.
    pub fn actuator_to_polar(steps: &AxisInt32s, params: &AxesParams) -> (f64, f64) {
        let theta = wrap_degrees(
            steps.val(ROTARY_AXIS) as f64 * 360.0 / params.steps_per_rot.val(ROTARY_AXIS),
        );
        // The rack moves with the arm, so the carriage's own travel is the
        // linear count minus the rotation-induced share.
        let decoupled_linear_steps = steps.val(LINEAR_AXIS) as f64
            - params.coupling_sign
                * steps.val(ROTARY_AXIS) as f64
                * (params.steps_per_rot.val(LINEAR_AXIS) / params.steps_per_rot.val(ROTARY_AXIS));
        let rho =
            decoupled_linear_steps / (params.max_linear_mm * params.steps_per_unit(LINEAR_AXIS));
        (theta, rho)
    }

    /// Cartesian target to `(theta degrees, rho)`, plus an in-bounds flag.
    pub fn cartesian_to_polar(target: &AxisFloats, params: &AxesParams) -> (f64, f64, bool) {
        let x = target.val(0);
        let y = target.val(1);
        let dist_from_origin = x.hypot(y);
        let valid = dist_from_origin <= params.max_linear_mm;
        let theta = wrap_degrees(y.atan2(x).to_degrees());
        let rho = dist_from_origin / params.max_linear_mm;
        (theta, rho, valid)
    }

    fn relative_polar_to_steps(
        rel_theta_degs: f64,
        rel_rho: f64,
        cur: &AxisPosition,
        params: &AxesParams,
    ) -> AxisInt32s {
        let fractional_rotation = rel_theta_degs / 360.0;
        let steps_rel_theta =
            (fractional_rotation * params.steps_per_rot.val(ROTARY_AXIS)).round() as i32;

        // The rack must first counteract the arm's rotation just to hold its
        // physical position, then add the steps for the actual radial move.
        let counteract_steps =
            params.coupling_sign * fractional_rotation * params.steps_per_rot.val(LINEAR_AXIS);
        let active_steps = rel_rho * params.max_linear_mm * params.steps_per_unit(LINEAR_AXIS);
        let steps_rel_rho = (counteract_steps + active_steps).round() as i32;

        AxisInt32s::new(
            cur.steps_from_home.val(ROTARY_AXIS) + steps_rel_theta,
            cur.steps_from_home.val(LINEAR_AXIS) + steps_rel_rho,
        )
    }
}

impl KinematicsTransform for CoupledRotaryLinearKinematics {
    fn pt_to_actuator(
        &self,
        target: &AxisFloats,
        cur: &AxisPosition,
        params: &AxesParams,
        allow_out_of_bounds: bool,
    ) -> Result<AxisInt32s, KinematicsError> {
        let (cur_theta, cur_rho) = Self::actuator_to_polar(&cur.steps_from_home, params);

        // Near the origin theta is undefined: hold the current angle and
        // retract the carriage fully.
        let (rel_theta, rel_rho) = if target.val(0).abs() <= ORIGIN_TOLERANCE_MM
            && target.val(1).abs() <= ORIGIN_TOLERANCE_MM
        {
            (0.0, -cur_rho)
        } else {
            let (target_theta, target_rho, valid) = Self::cartesian_to_polar(target, params);
            if !valid && !allow_out_of_bounds {
                return Err(KinematicsError::OutOfBounds {
                    x: target.val(0),
                    y: target.val(1),
                });
            }
            (
                shortest_rotation_degs(target_theta, cur_theta),
                target_rho - cur_rho,
            )
        };

        Ok(Self::relative_polar_to_steps(rel_theta, rel_rho, cur, params))
    }

    fn actuator_to_pt(&self, steps: &AxisInt32s, params: &AxesParams) -> AxisFloats {
        let (theta, rho) = Self::actuator_to_polar(steps, params);
        let radius_mm = rho * params.max_linear_mm;
        AxisFloats::new(
            radius_mm * theta.to_radians().cos(),
            radius_mm * theta.to_radians().sin(),
        )
    }

    fn correct_step_overflow(&self, pos: &mut AxisPosition, params: &AxesParams) {
        let rotation_steps_theta = params.steps_per_rot.val(ROTARY_AXIS).round() as i32;
        // Each whole-rotation adjustment must be mirrored on the linear axis
        // with the coupling share of one rotation, or the wrap would move the
        // carriage in the real world.
        let rotation_steps_linear =
            (params.coupling_sign * params.steps_per_rot.val(LINEAR_AXIS)).round() as i32;

        let steps = &mut pos.steps_from_home;
        while steps.val(ROTARY_AXIS) > rotation_steps_theta {
            steps.set_val(ROTARY_AXIS, steps.val(ROTARY_AXIS) - rotation_steps_theta);
            steps.set_val(LINEAR_AXIS, steps.val(LINEAR_AXIS) - rotation_steps_linear);
        }
        while steps.val(ROTARY_AXIS) <= -rotation_steps_theta {
            steps.set_val(ROTARY_AXIS, steps.val(ROTARY_AXIS) + rotation_steps_theta);
            steps.set_val(LINEAR_AXIS, steps.val(LINEAR_AXIS) + rotation_steps_linear);
        }
    }

    fn robot_attributes(&self, params: &AxesParams) -> RobotAttributes {
        // Square of side 2 * max travel, centered on the rotation axis.
        RobotAttributes {
            size_x: params.max_linear_mm * 2.0,
            size_y: params.max_linear_mm * 2.0,
            size_z: 0.0,
            origin_x: params.max_linear_mm,
            origin_y: params.max_linear_mm,
            origin_z: 0.0,
        }
    }
}

/// Build the transform for a configured robot model.
pub fn create_kinematics(model: &str) -> Box<dyn KinematicsTransform> {
    match model {
        "coupled-rotary" => Box::new(CoupledRotaryLinearKinematics),
        other => {
            tracing::warn!("Unknown robot model '{}', using coupled-rotary", other);
            Box::new(CoupledRotaryLinearKinematics)
        }
    }
}
