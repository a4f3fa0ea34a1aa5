//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the arm software
/// tree (the directory containing `params/`).
pub const ARM_SW_ROOT_VAR: &str = "ARM_SW_ROOT";

/// Get the root directory of the arm software.
pub fn get_arm_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(ARM_SW_ROOT_VAR).map(PathBuf::from)
}
