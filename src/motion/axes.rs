// src/motion/axes.rs - Axis value types and per-axis kinematic constants
use serde::{Deserialize, Serialize};

use crate::config::AxesConfig;

/// Number of physical axes on this machine.
pub const AXIS_COUNT: usize = 2;
/// Continuously rotating arm.
pub const ROTARY_AXIS: usize = 0;
/// Linear carriage driven through the shared gear train.
pub const LINEAR_AXIS: usize = 1;

/// Fixed-length float vector, one slot per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisFloats(pub [f64; AXIS_COUNT]);

impl AxisFloats {
    pub fn new(rotary: f64, linear: f64) -> Self {
        Self([rotary, linear])
    }

    pub fn val(&self, axis: usize) -> f64 {
        self.0[axis]
    }

    pub fn set_val(&mut self, axis: usize, value: f64) {
        self.0[axis] = value;
    }
}

/// Fixed-length step-count vector, one slot per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisInt32s(pub [i32; AXIS_COUNT]);

impl AxisInt32s {
    pub fn new(rotary: i32, linear: i32) -> Self {
        Self([rotary, linear])
    }

    pub fn val(&self, axis: usize) -> i32 {
        self.0[axis]
    }

    pub fn set_val(&mut self, axis: usize, value: i32) {
        self.0[axis] = value;
    }
}

/// Authoritative position snapshot.
///
/// `steps_from_home` accumulates signed steps since homing and is only
/// rewritten by the kinematics transform and its overflow correction;
/// `axis_position_mm` is the Cartesian point derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisPosition {
    pub steps_from_home: AxisInt32s,
    pub axis_position_mm: AxisFloats,
}

/// Read-only per-axis constants for the active robot profile.
///
/// Swapped wholesale on reconfiguration, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AxesParams {
    pub steps_per_rot: AxisFloats,
    pub units_per_rot: AxisFloats,
    /// Full travel of the linear carriage in mm (the drawable radius).
    pub max_linear_mm: f64,
    /// Direction of the gear-train coupling between the axes (+1 or -1).
    pub coupling_sign: f64,
}

impl AxesParams {
    pub fn from_config(axes: &AxesConfig) -> Self {
        Self {
            steps_per_rot: AxisFloats::new(
                axes.rotary.steps_per_rotation,
                axes.linear.steps_per_rotation,
            ),
            units_per_rot: AxisFloats::new(
                axes.rotary.units_per_rotation,
                axes.linear.units_per_rotation,
            ),
            max_linear_mm: axes.linear.max_travel_mm,
            coupling_sign: axes.linear.coupling_sign,
        }
    }

    pub fn steps_per_unit(&self, axis: usize) -> f64 {
        self.steps_per_rot.val(axis) / self.units_per_rot.val(axis)
    }
}

/// Drawable bounding box reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotAttributes {
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    pub origin_z: f64,
}
