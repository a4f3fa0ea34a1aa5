//! Arm state enumeration

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// High level state of one arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmState {
    /// Idle, ready to accept an action or a control command.
    Start,

    /// An action is executing.
    Working,

    /// The last action succeeded.
    Done,

    /// The last action failed.
    Error,

    /// A human pressed a cuff button.
    Killed,

    /// The arm was stopped externally.
    Stopped,

    /// The last action succeeded and left an object in the gripper.
    PickUp,

    /// A cartesian control session is running.
    CtrlRunning,

    /// The last control session reached its target or was stopped.
    CtrlDone,

    /// The last control session failed.
    CtrlFail,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmState::Start => "START",
            ArmState::Working => "WORKING",
            ArmState::Done => "DONE",
            ArmState::Error => "ERROR",
            ArmState::Killed => "KILLED",
            ArmState::Stopped => "STOPPED",
            ArmState::PickUp => "PICK_UP",
            ArmState::CtrlRunning => "CTRL_RUNNING",
            ArmState::CtrlDone => "CTRL_DONE",
            ArmState::CtrlFail => "CTRL_FAIL",
        }
    }
}

impl Default for ArmState {
    fn default() -> Self {
        ArmState::Start
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
