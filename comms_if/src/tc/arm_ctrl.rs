//! # Arm control telecommands
//!
//! Two interfaces are exposed by each arm: the high level action request,
//! which blocks until the arm has finished the action, and the continuous
//! control command (`GoToPose`) which starts a cartesian control session.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Deserializer, Serialize};

use crate::pose::Pose;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Go to the home configuration and open the gripper.
pub const ACTION_HOME: &str = "home";
/// Open the gripper.
pub const ACTION_RELEASE: &str = "release";
/// Hold an object for the human (start and end in one action).
pub const ACTION_HOLD: &str = "hold";
/// First half of a hold: go to the hold pose and grasp on user feedback.
pub const ACTION_START_HOLD: &str = "start_hold";
/// Second half of a hold: release on user feedback and go home.
pub const ACTION_END_HOLD: &str = "end_hold";
/// Pick up an object from the table.
pub const ACTION_GET: &str = "get";
/// Pass the object currently held to the human.
pub const ACTION_PASS: &str = "pass";
/// `get` followed by `pass`.
pub const ACTION_GET_PASS: &str = "get_pass";
/// Pick up an object from the table and drop it in the pool.
pub const ACTION_CLEANUP: &str = "cleanup";
/// List the actions available in the action database.
pub const LIST_ACTIONS: &str = "list_actions";
/// List the objects available in the object database.
pub const LIST_OBJECTS: &str = "list_objects";

/// Response string: the action was interrupted by a kill.
pub const ACT_KILLED: &str = "Action killed";
/// Response string: the action failed.
pub const ACT_FAILED: &str = "Action failed";
/// Response string: the requested action is not in the action database.
pub const ACT_NOT_IN_DB: &str = "Action not in DB";
/// Response string: none of the requested objects are in the object database.
pub const OBJ_NOT_IN_DB: &str = "Object(s) not in DB";
/// Response string: no inverse kinematics solution could be found during the action.
pub const INV_KIN_FAILED: &str = "Inverse kinematics failed";
/// Response string: the arm is already working on another action.
pub const ARM_BUSY: &str = "Arm busy";
/// Response string: the request named no objects for an action that needs one.
pub const NO_OBJ_SELECTED: &str = "No objects selected";
/// Response string: a blocking request waited longer than the configured timeout.
pub const REQ_TIMED_OUT: &str = "Request timed out";
/// Response string: the action needed a previous action that did not happen.
pub const PREV_ACT_MISSING: &str = "Previous action missing";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A request for an arm to perform a high level action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Name of the action, used as the key into the arm's action database.
    pub action: String,

    /// Candidate object IDs the action should be performed on.
    ///
    /// Either a single integer or a list of integers is accepted when
    /// deserialising.
    #[serde(default, alias = "object", deserialize_with = "one_or_many")]
    pub objects: Vec<i32>,
}

/// Response of an arm to an `ActionRequest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,

    /// Human readable detail, e.g. the sub state the arm ended up in.
    pub response: String,
}

/// A continuous cartesian control command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoToPose {
    /// One of `pose`, `position`, `relative_x`, `relative_y`, `relative_z` or
    /// `stop`.
    #[serde(rename = "type")]
    pub cmd_type: String,

    /// Target position for the `pose` and `position` types.
    ///
    /// Units: meters
    #[serde(default = "Vector3::zeros")]
    pub position: Vector3<f64>,

    /// Target orientation for the `pose` type, `[x, y, z, w]`.
    #[serde(default = "identity_xyzw")]
    pub orientation: [f64; 4],

    /// Displacement along the axis for the `relative_*` types.
    ///
    /// Units: meters
    #[serde(default)]
    pub increment: f64,

    #[serde(default)]
    pub ctrl_mode: CtrlMode,

    /// `strict` or `loose`.
    #[serde(default = "default_check_mode")]
    pub check_mode: String,

    /// `on` or `off`.
    #[serde(default = "default_tracking_mode")]
    pub tracking_mode: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Mode in which joint commands are sent to the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtrlMode {
    /// Joint position control with the hardware's own smoothing.
    Position,

    /// Joint velocity control (experimental).
    Velocity,

    /// Joint position control without smoothing (experimental).
    RawPosition,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActionRequest {
    pub fn new(action: &str, objects: &[i32]) -> Self {
        Self {
            action: action.to_string(),
            objects: objects.to_vec(),
        }
    }
}

impl ActionResponse {
    pub fn new(success: bool, response: &str) -> Self {
        Self {
            success,
            response: response.to_string(),
        }
    }
}

impl GoToPose {
    /// Command a full pose target.
    pub fn pose(pose: &Pose) -> Self {
        Self {
            position: pose.position,
            orientation: pose.orientation_xyzw(),
            ..Self::of_type("pose")
        }
    }

    /// Command a position target, keeping the current orientation.
    pub fn position(position: Vector3<f64>) -> Self {
        Self {
            position,
            ..Self::of_type("position")
        }
    }

    /// Command a displacement along one axis (`'x'`, `'y'` or `'z'`).
    pub fn relative(axis: char, increment: f64) -> Self {
        Self {
            increment,
            ..Self::of_type(&format!("relative_{}", axis))
        }
    }

    /// Stop the current control session.
    pub fn stop() -> Self {
        Self::of_type("stop")
    }

    /// An empty command of the given type, with default modes.
    pub fn of_type(cmd_type: &str) -> Self {
        Self {
            cmd_type: cmd_type.to_string(),
            position: Vector3::zeros(),
            orientation: identity_xyzw(),
            increment: 0.0,
            ctrl_mode: CtrlMode::default(),
            check_mode: default_check_mode(),
            tracking_mode: default_tracking_mode(),
        }
    }

    /// Orientation of the command as a pose, renormalised.
    pub fn target_pose(&self) -> Pose {
        let [ox, oy, oz, ow] = self.orientation;
        Pose::from_parts_raw(
            self.position.x,
            self.position.y,
            self.position.z,
            ox,
            oy,
            oz,
            ow,
        )
    }
}

impl Default for CtrlMode {
    fn default() -> Self {
        CtrlMode::Position
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn identity_xyzw() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_check_mode() -> String {
    String::from("strict")
}

fn default_tracking_mode() -> String {
    String::from("off")
}

/// Accept either a single object ID or a list of them.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(i32),
        Many(Vec<i32>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
    })
}
