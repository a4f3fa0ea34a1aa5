//! # Cartesian control loop
//!
//! A control session moves the end effector from the pose it was in when the
//! session started to a desired pose. The position follows a trajectory
//! particle running in its own thread, while the orientation is spherically
//! interpolated from the start to the desired orientation at the arm's
//! rotational speed. On every tick of the control thread the interpolated
//! pose is sent through the IK path to the arm.
//!
//! Sessions end when the target is reached (unless tracking), when a `stop`
//! command is received, when IK fails, or when the arm starts working on an
//! action or is killed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::{atomic::Ordering, Arc},
    time::Instant,
};

use comms_if::{
    tc::arm_ctrl::{CtrlMode, GoToPose},
    Pose,
};
use log::{error, info, warn};
use nalgebra::{UnitQuaternion, Vector3};
use util::{log_throttle, maths::clamp, time::LoopRate};

use super::{ArmState, CollSeverity, Shared, StateCell};
use crate::{
    particle::{LinearPointParticle, ParticleThread},
    reach::{self, CheckMode, CtrlType},
    sync::lock,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Squared norm under which a target quaternion cannot be normalised.
const MIN_QUAT_NORM_SQ: f64 = 1e-12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The current (or last) control session.
#[derive(Default)]
pub(super) struct CtrlSession {
    pub(super) running: bool,

    /// Incremented every time a session starts, so a control thread tick
    /// working on a superseded session cannot end the new one.
    pub(super) generation: u64,

    pub(super) ctrl_type: CtrlType,

    pub(super) config: Option<SessionConfig>,
    pub(super) start_pose: Pose,
    pub(super) start_time: Option<Instant>,
    pub(super) particle: Option<ParticleThread<LinearPointParticle>>,
}

/// What a control command asked for.
#[derive(Debug, Clone, Copy)]
pub(super) struct SessionConfig {
    des_pose: Pose,
    ctrl_mode: CtrlMode,
    check_mode: CheckMode,
    tracking: bool,
}

/// Copy of a running session taken by the control thread.
struct Snapshot {
    generation: u64,
    config: SessionConfig,
    ctrl_type: CtrlType,
    start_pose: Pose,
    start_time: Instant,
    particle_pt: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a control command is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CtrlCmdError {
    #[error("The controller is already in use through the high level interface")]
    ArmBusy,

    #[error("Requested command type {0} not allowed")]
    UnknownCmdType(String),

    #[error("Control mode {0:?} is experimental and experimental mode is disabled")]
    ModeNotAllowed(CtrlMode),

    #[error("The target pose is not finite or its orientation is not a rotation")]
    InvalidTarget,

    #[error("Initialisation of the control session failed")]
    InitFailed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Shared {
    pub(super) fn ctrl_msg_cb(&self, cmd: &GoToPose) -> Result<(), CtrlCmdError> {
        let mut cell = lock(&self.state);

        if cell.state == ArmState::Working || self.action_active.load(Ordering::SeqCst) {
            log_throttle!(
                self.busy_throttle,
                log::Level::Error,
                "[{}] Received new target control command, but the controller is already in \
                use through the high level interface!",
                self.limb
            );
            return Err(CtrlCmdError::ArmBusy);
        }

        if cmd.cmd_type == "stop" {
            let halted = self.halt_ctrl_locked();

            if halted.is_some() {
                info!("[{}] Stopping cartesian controller", self.limb);
                cell.state = ArmState::CtrlDone;
                info!("[{}] State set to {}", self.limb, cell.state);
                self.publish_locked(&cell);
            }

            drop(cell);
            drop(halted);
            return Ok(());
        }

        let curr = self.pose();
        let mut des_pose = Pose::new(curr.position, curr.orientation);

        match cmd.cmd_type.as_str() {
            "pose" => {
                if !is_valid_orientation(&cmd.orientation) {
                    error!(
                        "[{}] Invalid target orientation {:?}",
                        self.limb, cmd.orientation
                    );
                    return Err(CtrlCmdError::InvalidTarget);
                }
                des_pose = cmd.target_pose()
            }
            "position" => des_pose.position = cmd.position,
            "relative_x" => des_pose.position.x += cmd.increment,
            "relative_y" => des_pose.position.y += cmd.increment,
            "relative_z" => des_pose.position.z += cmd.increment,
            other => {
                error!(
                    "[{}] Requested command type {} not allowed!",
                    self.limb, other
                );
                return Err(CtrlCmdError::UnknownCmdType(other.to_string()));
            }
        }

        if !des_pose.position.iter().all(|v| v.is_finite()) {
            error!(
                "[{}] Invalid target position {:?}",
                self.limb, des_pose.position
            );
            return Err(CtrlCmdError::InvalidTarget);
        }

        if cmd.ctrl_mode != CtrlMode::Position {
            if !self.params.experimental {
                error!(
                    "[{}] The only tested control mode is Position. Set the experimental \
                    flag to use {:?}.",
                    self.limb, cmd.ctrl_mode
                );
                return Err(CtrlCmdError::ModeNotAllowed(cmd.ctrl_mode));
            }

            warn!("[{}] Experimental {:?} mode enabled", self.limb, cmd.ctrl_mode);
        }

        let check_mode = match cmd.check_mode.parse::<CheckMode>() {
            Ok(m) => m,
            Err(_) => {
                warn!(
                    "[{}] Requested check mode {} not allowed! Using strict by default",
                    self.limb, cmd.check_mode
                );
                CheckMode::Strict
            }
        };

        let config = SessionConfig {
            des_pose,
            ctrl_mode: cmd.ctrl_mode,
            check_mode,
            tracking: cmd.tracking_mode == "on",
        };

        let superseded = self.start_session_locked(&mut cell, config);

        drop(cell);
        drop(superseded.0);
        superseded.1
    }

    /// Start a new session, with the state lock held.
    ///
    /// Returns the particle of the superseded session, which must be dropped
    /// after the lock is released, and the outcome.
    fn start_session_locked(
        &self,
        cell: &mut StateCell,
        config: SessionConfig,
    ) -> (
        Option<ParticleThread<LinearPointParticle>>,
        Result<(), CtrlCmdError>,
    ) {
        let mut ctrl = lock(&self.ctrl);

        let was_running = ctrl.running;
        ctrl.running = false;
        let old = ctrl.particle.take();

        let start_pose = self.pose();
        let particle = ParticleThread::new(
            &format!("{}/{}", self.name, self.limb),
            self.params.particle_freq_hz,
            LinearPointParticle::with_setup(
                start_pose.position,
                config.des_pose.position,
                self.params.arm_speed_ms,
            ),
        );

        if let Err(e) = particle.start() {
            drop(ctrl);
            error!(
                "[{}] Initialisation of control parameters has failed: {}",
                self.limb, e
            );

            if was_running && cell.state == ArmState::CtrlRunning {
                cell.state = ArmState::CtrlFail;
                info!("[{}] State set to {}", self.limb, cell.state);
                self.publish_locked(cell);
            }

            return (old, Err(CtrlCmdError::InitFailed));
        }

        ctrl.generation += 1;
        ctrl.running = true;
        ctrl.config = Some(config);
        ctrl.start_pose = start_pose;
        ctrl.start_time = Some(Instant::now());
        ctrl.particle = Some(particle);
        drop(ctrl);

        info!(
            "[{}] Received new target pose: {} control mode: {:?}",
            self.limb, config.des_pose, config.ctrl_mode
        );
        info!(
            "[{}] Check mode: {} Tracking mode: {}",
            self.limb,
            config.check_mode,
            if config.tracking { "ON" } else { "OFF" }
        );

        cell.state = ArmState::CtrlRunning;
        info!("[{}] State set to {}", self.limb, cell.state);
        self.publish_locked(cell);

        (old, Ok(()))
    }

    pub(super) fn is_ctrl_running(&self) -> bool {
        lock(&self.ctrl).running
    }

    pub(super) fn set_ctrl_running(&self, flag: bool) -> bool {
        if !flag {
            self.halt_ctrl();
            return true;
        }

        let mut cell = lock(&self.state);

        if cell.state == ArmState::Working
            || self.action_active.load(Ordering::SeqCst)
            || !self.ok_locked(&cell)
        {
            return false;
        }

        let config = match lock(&self.ctrl).config {
            Some(c) => c,
            None => {
                warn!("[{}] No control session to restart", self.limb);
                return false;
            }
        };

        let (old, res) = self.start_session_locked(&mut cell, config);

        drop(cell);
        drop(old);
        res.is_ok()
    }

    /// Halt the running session, if any.
    pub(super) fn halt_ctrl(&self) {
        let halted = {
            let _cell = lock(&self.state);
            self.halt_ctrl_locked()
        };

        drop(halted);
    }

    /// Halt the running session with the state lock held, returning the
    /// particle of the halted session.
    pub(super) fn halt_ctrl_locked(&self) -> Option<ParticleThread<LinearPointParticle>> {
        let mut ctrl = lock(&self.ctrl);
        ctrl.running = false;
        ctrl.particle.take()
    }

    fn ok_locked(&self, cell: &StateCell) -> bool {
        !self.closing.load(Ordering::SeqCst)
            && !matches!(cell.state, ArmState::Killed | ArmState::Stopped)
    }

    fn snapshot(&self) -> Option<Snapshot> {
        let ctrl = lock(&self.ctrl);

        if !ctrl.running {
            return None;
        }

        Some(Snapshot {
            generation: ctrl.generation,
            config: ctrl.config?,
            ctrl_type: ctrl.ctrl_type,
            start_pose: ctrl.start_pose,
            start_time: ctrl.start_time?,
            particle_pt: ctrl.particle.as_ref()?.current_point(),
        })
    }

    /// End the session `generation` in `state`, unless it has already been
    /// superseded or halted.
    fn finish_session(&self, generation: u64, state: ArmState) {
        let halted = {
            let mut cell = lock(&self.state);
            let mut ctrl = lock(&self.ctrl);

            if ctrl.generation != generation || !ctrl.running {
                return;
            }

            ctrl.running = false;
            let halted = ctrl.particle.take();
            drop(ctrl);

            if cell.state == ArmState::CtrlRunning {
                cell.state = state;
                info!("[{}] State set to {}", self.limb, cell.state);
                self.publish_locked(&cell);
            }

            halted
        };

        drop(halted);
    }

    fn ctrl_tick(&self) {
        let snap = match self.snapshot() {
            Some(s) => s,
            None => return,
        };
        let cfg = snap.config;

        if !reach::is_pose_reached(&self.pose(), &cfg.des_pose, cfg.check_mode, snap.ctrl_type) {
            let target = Pose::new(
                snap.particle_pt,
                interpolate_orientation(
                    &snap.start_pose.orientation,
                    &cfg.des_pose.orientation,
                    snap.start_time.elapsed().as_secs_f64(),
                    self.params.arm_rot_speed_rads,
                ),
            );

            match self.compute_ik(&target) {
                Ok(joints) => self.send_joints(&joints, cfg.ctrl_mode),
                Err(e) => {
                    warn!(
                        "[{}] Desired configuration could not be reached: {}",
                        self.limb, e
                    );
                    self.finish_session(snap.generation, ArmState::CtrlFail);
                    return;
                }
            }

            if self.has_collided_ir(CheckMode::Strict) || self.coll_det_on.load(Ordering::SeqCst)
            {
                match self.params.coll_severity {
                    CollSeverity::Warn => log_throttle!(
                        self.coll_throttle,
                        log::Level::Info,
                        "[{}] is colliding!",
                        self.limb
                    ),
                    CollSeverity::Fail => {
                        error!("[{}] Collision during control, stopping", self.limb);
                        self.finish_session(snap.generation, ArmState::CtrlFail);
                    }
                }
            }
        } else if !cfg.tracking {
            info!("[{}] Pose reached!", self.limb);
            self.finish_session(snap.generation, ArmState::CtrlDone);

            if cfg.ctrl_mode == CtrlMode::Velocity {
                self.send_zero_velocity();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Control thread, runs until the interface closes.
pub(super) fn ctrl_thread(shared: Arc<Shared>) {
    let mut rate = LoopRate::new(shared.params.ctrl_freq_hz);

    while !shared.closing.load(Ordering::SeqCst) {
        shared.ctrl_tick();
        rate.sleep();
    }
}

/// True if `xyzw` is finite and far enough from zero to be normalised.
fn is_valid_orientation(xyzw: &[f64; 4]) -> bool {
    xyzw.iter().all(|v| v.is_finite())
        && xyzw.iter().map(|v| v * v).sum::<f64>() > MIN_QUAT_NORM_SQ
}

/// Orientation `elapsed_s` into a rotation from `start` to `des` at
/// `rot_speed` along the shortest path.
fn interpolate_orientation(
    start: &UnitQuaternion<f64>,
    des: &UnitQuaternion<f64>,
    elapsed_s: f64,
    rot_speed: f64,
) -> UnitQuaternion<f64> {
    let traj_time = start.angle_to(des) / rot_speed;

    if traj_time.is_nan() || elapsed_s >= traj_time {
        return *des;
    }

    let t = clamp(&(elapsed_s / traj_time), &0.0, &1.0);

    match start.try_slerp(des, t, 1e-9) {
        Some(q) => UnitQuaternion::new_normalize(q.into_inner()),
        None => *des,
    }
}
