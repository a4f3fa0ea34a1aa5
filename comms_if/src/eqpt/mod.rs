//! # Equipment module
//!
//! Provides command and sensor definitions for the equipment driven by the arm
//! software.

pub mod arm;
