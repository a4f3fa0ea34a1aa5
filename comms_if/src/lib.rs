//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the arm software: the
//! requests an arm accepts, the sensor data it consumes, the commands it sends
//! to the hardware and the telemetry it publishes.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommands - action requests and continuous control commands
pub mod tc;

/// Command and sensor definitions for equipment (the arm hardware)
pub mod eqpt;

/// Telemetry published by the arms
pub mod tm;

/// Cartesian pose of the end effector
pub mod pose;

// ------------------------------------------------------------------------------------------------
// REEXPORTS
// ------------------------------------------------------------------------------------------------

pub use pose::Pose;
