//! # Telemetry module
//!
//! State telemetry published by each arm on every state change.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Published arm state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmStateTm {
    /// Name of the state, e.g. `WORKING`.
    pub state: String,

    /// Action the arm is working on, or the last action it worked on.
    pub action: String,

    /// Object the arm is working on, empty if none.
    pub object: String,
}
