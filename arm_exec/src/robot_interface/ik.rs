//! # Inverse kinematics path
//!
//! The solver itself is an external collaborator behind the `IkSolver` trait.
//! `compute_ik` wraps it with the retry policy: when a pose has no solution the
//! target is raised in small steps (which helps when placing objects on a
//! surface), until either a solution is found, the target has been raised by
//! the whole search window, or the time budget is exhausted.
//! A failure of the solver itself is not retried.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::{atomic::Ordering, Arc},
    time::Instant,
};

use comms_if::{eqpt::arm::JointState, Pose};
use log::{debug, warn};
use util::time::seconds_to_duration;

use super::Shared;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

pub trait IkSolver: Send + Sync {
    /// Solve for the joint angles placing the end effector at `pose`, starting
    /// from the `seed` configuration.
    ///
    /// `Err` means the solver itself failed, a pose with no solution is
    /// `Ok(IkSolution::NoSolution)`.
    fn solve(&self, pose: &Pose, seed: &JointState) -> Result<IkSolution, IkError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum IkSolution {
    /// Joint angles, in the order of the limb's joint names.
    ///
    /// Units: radians
    Joints(Vec<f64>),

    NoSolution,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IkError {
    #[error("No inverse kinematics solution found")]
    NoSolution,

    #[error("The inverse kinematics solver failed: {0}")]
    SolverError(String),

    #[error("Inverse kinematics interrupted")]
    Interrupted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: IkSolver + ?Sized> IkSolver for Arc<T> {
    fn solve(&self, pose: &Pose, seed: &JointState) -> Result<IkSolution, IkError> {
        (**self).solve(pose, seed)
    }
}

impl Shared {
    pub(super) fn compute_ik(&self, pose: &Pose) -> Result<Vec<f64>, IkError> {
        let start = Instant::now();
        let timeout = seconds_to_duration(self.params.ik_timeout_s);
        let slow = seconds_to_duration(self.params.ik_slow_warn_s);
        let thresh_z = pose.position.z + self.params.ik_z_window_m;

        let mut target = *pose;

        loop {
            if !self.ok() {
                return Err(IkError::Interrupted);
            }

            let seed = self.joint_states();
            let call_start = Instant::now();

            match self.ik.solve(&target, &seed) {
                Ok(sol) => {
                    let call_time = call_start.elapsed();
                    if call_time > slow && !self.ik_slow_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            "[{}] Time elapsed in computing IK: {:.4} s",
                            self.limb,
                            call_time.as_secs_f64()
                        );
                    }

                    match sol {
                        IkSolution::Joints(joints) => return Ok(joints),
                        IkSolution::NoSolution => {
                            debug!(
                                "[{}] IK solution not valid: {:.3} {:.3} {:.3}",
                                self.limb,
                                target.position.x,
                                target.position.y,
                                target.position.z
                            );
                            target.position.z += self.params.ik_z_step_m;
                        }
                    }
                }
                Err(e) => {
                    warn!("[{}] {}", self.limb, e);
                    return Err(e);
                }
            }

            if start.elapsed() > timeout || target.position.z > thresh_z {
                warn!(
                    "[{}] Did not find a suitable IK solution! Final position {:.3} {:.3} {:.3}",
                    self.limb, target.position.x, target.position.y, target.position.z
                );
                return Err(IkError::NoSolution);
            }
        }
    }
}
