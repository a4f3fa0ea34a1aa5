//! # Arm equipment interface
//!
//! Sensor messages received from a single limb of the robot and the joint
//! commands sent back to it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::pose::Pose;
use crate::tc::arm_ctrl::CtrlMode;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// State of the end effector as reported by the robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    pub pose: Pose,

    /// Wrench force at the end effector.
    ///
    /// Units: Newtons
    pub force: Vector3<f64>,
}

/// A single reading of the infrared range sensor in the gripper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeState {
    /// Units: meters
    pub range_m: f64,

    /// Units: meters
    pub min_range_m: f64,

    /// Units: meters
    pub max_range_m: f64,
}

/// Joint state of one limb.
///
/// The vectors are parallel, i.e. `position[i]` is the position of the joint
/// named `name[i]`. Messages may cover joints of other limbs too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub name: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
}

/// Output of the robot's collision avoidance layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionAvoidanceState {
    /// Names of the objects the arm is currently avoiding.
    pub collision_objects: Vec<String>,
}

/// Output of the robot's collision detection layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionDetectionState {
    pub collision_state: bool,
}

/// A joint command sent to one limb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointCommand {
    pub mode: CtrlMode,
    pub names: Vec<String>,

    /// Joint positions, used in position modes.
    ///
    /// Units: radians
    pub position: Vec<f64>,

    /// Joint velocities, used in velocity mode.
    ///
    /// Units: radians/second
    pub velocity: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One of the two limbs of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Limb {
    Left,
    Right,
}

/// Cuff button event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonState {
    Released,
    Pressed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown limb \"{0}\", expected \"left\" or \"right\"")]
pub struct LimbParseError(pub String);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Limb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Limb::Left => "left",
            Limb::Right => "right",
        }
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Limb {
    type Err = LimbParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Limb::Left),
            "right" => Ok(Limb::Right),
            _ => Err(LimbParseError(s.to_string())),
        }
    }
}

impl JointCommand {
    /// A velocity command with zero velocity on every named joint, used to
    /// hold the arm still.
    pub fn zero_velocity(names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            mode: CtrlMode::Velocity,
            names,
            position: Vec::new(),
            velocity: vec![0.0; n],
        }
    }
}
