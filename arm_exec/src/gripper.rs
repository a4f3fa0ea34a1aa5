//! # Gripper capability
//!
//! The arm controller owns its gripper through this trait, so the electric and
//! suction grippers (and the simulated one) can be swapped without touching
//! the action logic.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fmt, sync::Arc};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait Gripper: Send + Sync {
    /// Open the gripper (or release the suction), returns false on failure.
    fn open(&self) -> bool;

    /// Close the gripper (or start the suction), returns false on failure.
    fn close(&self) -> bool;

    /// True if an object is held.
    fn is_gripping(&self) -> bool;

    fn gripper_type(&self) -> GripperType;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperType {
    Electric,
    Suction,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GripperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GripperType::Electric => "electric",
            GripperType::Suction => "suction",
        }
    }
}

impl fmt::Display for GripperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T: Gripper + ?Sized> Gripper for Arc<T> {
    fn open(&self) -> bool {
        (**self).open()
    }

    fn close(&self) -> bool {
        (**self).close()
    }

    fn is_gripping(&self) -> bool {
        (**self).is_gripping()
    }

    fn gripper_type(&self) -> GripperType {
        (**self).gripper_type()
    }
}
