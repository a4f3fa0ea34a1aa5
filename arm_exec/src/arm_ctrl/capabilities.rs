//! # Arm variants
//!
//! The parts of the built-in actions which depend on how objects are found
//! and grasped. A variant only overrides the steps it does differently, the
//! default implementations work on the fixed table and pool poses from the
//! parameters.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;

use super::{params::HomeLocation, ArmCtx, Direction};
use crate::{reach::CheckMode, robot_interface::NUM_JOINTS};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

pub trait ArmVariant: Send + Sync {
    /// Choose which of several matching objects to act on.
    fn choose_object_id(&self, _ctx: &ArmCtx, ids: &[i32]) -> Option<i32> {
        ids.first().copied()
    }

    /// Locate the selected object before picking it up.
    fn select_object_for_pick_up(&self, ctx: &ArmCtx) -> bool {
        info!(
            "[{}] Selected object {:?}",
            ctx.limb(),
            ctx.sel_object_id()
        );
        true
    }

    /// Bring the open gripper around the selected object.
    fn pick_up_object(&self, ctx: &ArmCtx) -> bool {
        ctx.hover_above_table(ctx.params().z_low_m, CheckMode::Loose, false)
            && ctx.move_arm(
                Direction::Down,
                ctx.params().pick_depth_m,
                CheckMode::Loose,
                false,
            )
    }

    /// Move the held object to where it is handed over, returning who it is
    /// handed over to.
    fn move_object_to_pass_position(&self, ctx: &ArmCtx) -> Option<PassTarget> {
        let pose = ctx.limb_params().pass_pose();

        if ctx.go_to_pose(&pose, CheckMode::Loose, false) {
            Some(PassTarget::Human)
        } else {
            None
        }
    }

    fn move_object_to_pool_position(&self, ctx: &ArmCtx) -> bool {
        ctx.hover_above_pool()
    }

    fn home_configuration(&self, ctx: &ArmCtx, location: HomeLocation) -> [f64; NUM_JOINTS] {
        ctx.limb_params().home_conf(location)
    }

    /// Bring the arm back to a safe configuration after a failed action.
    fn recover_from_error(&self, ctx: &ArmCtx) -> bool {
        ctx.go_home()
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Arm variant using only the default behaviours.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultArm;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// The object is held out for the human to take.
    Human,

    /// The object is put down on the table.
    Table,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmVariant for DefaultArm {}
