//! # Arm library.
//!
//! This library allows other crates in the workspace (and the integration
//! tests) to access items defined inside the arm executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Trajectory particles - background generators of the point the arm should be at
pub mod particle;

/// Force filter - noise rejecting filter over the end effector wrench
pub mod force_filter;

/// Reachability predicates - is a pose/position/orientation/configuration reached
pub mod reach;

/// Robot interface - cartesian control loop, safety monitoring and the arm state
pub mod robot_interface;

/// Arm control - the action state machine sitting on top of the robot interface
pub mod arm_ctrl;

/// Gripper capability interface
pub mod gripper;

/// Simulated arm, used by the executable and the tests
pub mod sim;

/// Poison recovering lock helpers
mod sync;
