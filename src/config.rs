// src/config.rs - Host configuration loaded from TOML
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level host configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,

    /// Root directory for pattern, playlist and motion-code files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Optional command string submitted once at startup.
    #[serde(default)]
    pub cmds_at_start: String,

    #[serde(default)]
    pub robot: RobotConfig,

    /// Evaluator settings, handed to each evaluator as JSON.
    #[serde(default)]
    pub evaluators: serde_json::Value,
}

/// Active robot profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    /// Selects the kinematics transform.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_work_queue_size")]
    pub work_queue_size: usize,

    /// How many planned moves the controller buffers before reporting busy.
    #[serde(default = "default_motion_pipeline_depth")]
    pub motion_pipeline_depth: usize,

    #[serde(default)]
    pub axes: AxesConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AxesConfig {
    #[serde(default)]
    pub rotary: RotaryAxisConfig,
    #[serde(default)]
    pub linear: LinearAxisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RotaryAxisConfig {
    #[serde(default = "default_steps_per_rotation")]
    pub steps_per_rotation: f64,
    #[serde(default = "default_rotary_units_per_rotation")]
    pub units_per_rotation: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinearAxisConfig {
    #[serde(default = "default_steps_per_rotation")]
    pub steps_per_rotation: f64,
    #[serde(default = "default_linear_units_per_rotation")]
    pub units_per_rotation: f64,
    #[serde(default = "default_max_travel_mm")]
    pub max_travel_mm: f64,
    /// Direction of the gear-train coupling between the axes (+1 or -1).
    #[serde(default = "default_coupling_sign")]
    pub coupling_sign: f64,
}

fn default_name() -> String {
    "sandtable".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_model() -> String {
    "coupled-rotary".to_string()
}
fn default_work_queue_size() -> usize {
    50
}
fn default_motion_pipeline_depth() -> usize {
    4
}
fn default_steps_per_rotation() -> f64 {
    9600.0
}
fn default_rotary_units_per_rotation() -> f64 {
    360.0
}
fn default_linear_units_per_rotation() -> f64 {
    40.0
}
fn default_max_travel_mm() -> f64 {
    185.0
}
fn default_coupling_sign() -> f64 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            cmds_at_start: String::new(),
            robot: RobotConfig::default(),
            evaluators: serde_json::Value::Null,
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            work_queue_size: default_work_queue_size(),
            motion_pipeline_depth: default_motion_pipeline_depth(),
            axes: AxesConfig::default(),
        }
    }
}

impl Default for RotaryAxisConfig {
    fn default() -> Self {
        Self {
            steps_per_rotation: default_steps_per_rotation(),
            units_per_rotation: default_rotary_units_per_rotation(),
        }
    }
}

impl Default for LinearAxisConfig {
    fn default() -> Self {
        Self {
            steps_per_rotation: default_steps_per_rotation(),
            units_per_rotation: default_linear_units_per_rotation(),
            max_travel_mm: default_max_travel_mm(),
            coupling_sign: default_coupling_sign(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(config_path: &str) -> Result<Self, ConfigError> {
        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded configuration from {}", config_path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.robot.work_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "robot.work_queue_size must be at least 1".to_string(),
            ));
        }
        if self.robot.motion_pipeline_depth == 0 {
            return Err(ConfigError::Invalid(
                "robot.motion_pipeline_depth must be at least 1".to_string(),
            ));
        }
        if self.robot.axes.rotary.steps_per_rotation <= 0.0
            || self.robot.axes.linear.steps_per_rotation <= 0.0
        {
            return Err(ConfigError::Invalid(
                "steps_per_rotation must be positive".to_string(),
            ));
        }
        if self.robot.axes.linear.units_per_rotation <= 0.0 {
            return Err(ConfigError::Invalid(
                "linear units_per_rotation must be positive".to_string(),
            ));
        }
        if self.robot.axes.linear.max_travel_mm <= 0.0 {
            return Err(ConfigError::Invalid(
                "linear max_travel_mm must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
