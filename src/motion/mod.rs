// src/motion/mod.rs
pub mod axes;
pub mod kinematics;

pub use axes::{
    AxesParams, AxisFloats, AxisInt32s, AxisPosition, RobotAttributes, AXIS_COUNT, LINEAR_AXIS,
    ROTARY_AXIS,
};
pub use kinematics::{
    create_kinematics, CoupledRotaryLinearKinematics, KinematicsError, KinematicsTransform,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("kinematics: {0}")]
    Kinematics(#[from] KinematicsError),
    #[error("motion pipeline is full")]
    PipelineFull,
}
