//! # Robot interface
//!
//! Low level interface to one limb of the robot. The interface:
//!
//! - Owns the arm state, every state change is published through the
//!   `StatePublisher` while the state lock is held so observers never see
//!   interleaved updates.
//! - Runs the cartesian control loop thread, which tracks the trajectory
//!   particle of the current control session (see `ctrl_loop`).
//! - Caches the sensor data received through the callbacks and provides the
//!   safety checks built on them (see `safety`).
//! - Provides the motion primitives used by the high level actions.
//!
//! Locks are always taken in the order state, control session, then any of
//! the sensor caches. The control thread never waits on the state lock while
//! it holds the control session lock.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod ctrl_loop;
mod ik;
mod params;
mod publish;
mod safety;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use comms_if::{
    eqpt::arm::{
        ButtonState, CollisionAvoidanceState, CollisionDetectionState, EndpointState,
        JointCommand, JointState, Limb, RangeState,
    },
    tc::arm_ctrl::{CtrlMode, GoToPose},
    tm::ArmStateTm,
    Pose,
};
use log::{error, info, warn};
use nalgebra::{UnitQuaternion, Vector3};
use util::{
    logger::Throttle,
    time::{seconds_to_duration, LoopRate},
};

use crate::{
    force_filter::ForceFilter,
    particle::{LinearPointParticle, ParticleThread},
    reach::{self, CheckMode, CtrlType, ReachError},
    sync::lock,
};

pub use ctrl_loop::CtrlCmdError;
pub use ik::{IkError, IkSolution, IkSolver};
pub use params::{CollSeverity, LimbParams, Params};
pub use publish::{LatchedStatePublisher, StatePublisher};
pub use state::ArmState;

use ctrl_loop::CtrlSession;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of joints in one limb.
pub const NUM_JOINTS: usize = 7;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Command outputs of one limb.
pub trait ArmInterface: Send + Sync {
    fn publish_joint_cmd(&self, cmd: &JointCommand);

    /// Suppress the robot's collision avoidance for one control cycle.
    fn suppress_collision_av(&self);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct RobotInterface {
    shared: Arc<Shared>,
    ctrl_jh: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    name: String,
    limb: Limb,
    params: Params,
    joint_names: Vec<String>,

    arm: Box<dyn ArmInterface>,
    ik: Box<dyn IkSolver>,
    publisher: Box<dyn StatePublisher>,

    state: Mutex<StateCell>,
    ctrl: Mutex<CtrlSession>,

    endpoint: Mutex<EndpointState>,
    force_filter: Mutex<ForceFilter>,
    joints: Mutex<JointState>,
    range: Mutex<Option<RangeState>>,

    coll_av_on: AtomicBool,
    coll_det_on: AtomicBool,
    lower_cuff_pressed: AtomicBool,
    upper_cuff_pressed: AtomicBool,

    /// While set an upper cuff press is user feedback rather than a kill.
    upper_fb_armed: AtomicBool,
    upper_fb: AtomicBool,

    /// Set while an action thread is alive, recovery included. Control
    /// sessions are refused while it is set.
    action_active: AtomicBool,

    closing: AtomicBool,
    ik_slow_warned: AtomicBool,

    busy_throttle: Throttle,
    coll_throttle: Throttle,
}

/// The arm state and the context published alongside it.
#[derive(Debug, Default)]
struct StateCell {
    state: ArmState,
    action: String,
    object: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Failure of a motion primitive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotionError {
    #[error("{0}")]
    Ik(#[from] IkError),

    #[error("Collision avoidance triggered, motion stopped")]
    Collision,

    #[error("The motion was interrupted")]
    Interrupted,

    #[error("The motion timed out")]
    Timeout,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotInterface {
    /// Create the interface for one limb.
    ///
    /// The control loop thread is started if `params.use_cart_ctrl` is set.
    /// The arm starts in `START`, which is published immediately.
    pub fn new(
        name: &str,
        limb: Limb,
        params: Params,
        arm: Box<dyn ArmInterface>,
        ik: Box<dyn IkSolver>,
        publisher: Box<dyn StatePublisher>,
    ) -> Self {
        let force_filter = ForceFilter::new(params.force_filter(limb));
        let joint_names = (0..NUM_JOINTS)
            .map(|i| format!("{}_j{}", limb.as_str(), i))
            .collect();

        let shared = Arc::new(Shared {
            name: name.to_string(),
            limb,
            params,
            joint_names,
            arm,
            ik,
            publisher,
            state: Mutex::new(StateCell::default()),
            ctrl: Mutex::new(CtrlSession::default()),
            endpoint: Mutex::new(EndpointState::default()),
            force_filter: Mutex::new(force_filter),
            joints: Mutex::new(JointState::default()),
            range: Mutex::new(None),
            coll_av_on: AtomicBool::new(false),
            coll_det_on: AtomicBool::new(false),
            lower_cuff_pressed: AtomicBool::new(false),
            upper_cuff_pressed: AtomicBool::new(false),
            upper_fb_armed: AtomicBool::new(false),
            upper_fb: AtomicBool::new(false),
            action_active: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            ik_slow_warned: AtomicBool::new(false),
            busy_throttle: Throttle::new(1.0),
            coll_throttle: Throttle::new(2.0),
        });

        let ctrl_jh = if shared.params.use_cart_ctrl {
            let shared_clone = shared.clone();
            Some(thread::spawn(move || ctrl_loop::ctrl_thread(shared_clone)))
        } else {
            None
        };

        shared.set_state(ArmState::Start);

        info!(
            "[{}] Robot interface {} ready (cartesian controller {})",
            limb,
            name,
            if ctrl_jh.is_some() { "on" } else { "off" }
        );

        Self { shared, ctrl_jh }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn limb(&self) -> Limb {
        self.shared.limb
    }

    pub fn params(&self) -> &Params {
        &self.shared.params
    }

    /// Names of this limb's joints, `<limb>_j0` to `<limb>_j6`.
    pub fn joint_names(&self) -> &[String] {
        &self.shared.joint_names
    }

    // ---- STATE ----

    pub fn state(&self) -> ArmState {
        self.shared.state()
    }

    /// Set and publish the state.
    ///
    /// Entering `WORKING`, `KILLED` or `STOPPED` halts any running control
    /// session.
    pub fn set_state(&self, state: ArmState) {
        self.shared.set_state(state)
    }

    /// Set the state only if it currently is `expected`, returns true if the
    /// state was changed.
    pub fn set_state_if(&self, expected: ArmState, state: ArmState) -> bool {
        self.shared.set_state_if(expected, state)
    }

    /// Enter `WORKING` unless the arm already is working.
    ///
    /// Returns the previous state, or `None` if the arm was busy.
    pub fn try_set_working(&self) -> Option<ArmState> {
        self.shared.try_set_working()
    }

    /// Set the action and object published with the state from the next
    /// state change onwards.
    pub fn set_published_action(&self, action: &str, object: &str) {
        let mut cell = lock(&self.shared.state);
        cell.action = action.to_string();
        cell.object = object.to_string();
    }

    pub fn publish_state(&self) {
        let cell = lock(&self.shared.state);
        self.shared.publish_locked(&cell);
    }

    /// Mark whether a high level action owns the arm.
    pub fn set_action_active(&self, active: bool) {
        self.shared.action_active.store(active, Ordering::SeqCst);
    }

    pub fn is_action_active(&self) -> bool {
        self.shared.action_active.load(Ordering::SeqCst)
    }

    /// False once the arm was killed or stopped, or the interface is closing.
    pub fn ok(&self) -> bool {
        self.shared.ok()
    }

    /// Stop the arm from outside, any running action is interrupted.
    pub fn stop(&self) {
        info!("[{}] Stop requested", self.shared.limb);
        self.shared.set_state(ArmState::Stopped);
    }

    /// Start closing the interface, all blocking calls return as soon as
    /// possible.
    pub fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.halt_ctrl();
    }

    pub fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }

    // ---- CONTROL LOOP ----

    /// Handle a continuous control command.
    pub fn ctrl_msg_cb(&self, cmd: &GoToPose) -> Result<(), CtrlCmdError> {
        self.shared.ctrl_msg_cb(cmd)
    }

    pub fn is_ctrl_running(&self) -> bool {
        self.shared.is_ctrl_running()
    }

    /// Halt the control session, or restart the last one from the current
    /// pose. Returns false if the session could not be restarted.
    pub fn set_ctrl_running(&self, flag: bool) -> bool {
        self.shared.set_ctrl_running(flag)
    }

    /// Set which part of the pose the control loop checks, from `pose`,
    /// `position` or `orientation`.
    pub fn set_ctrl_type(&self, ctrl_type: &str) -> Result<(), ReachError> {
        let ctrl_type: CtrlType = ctrl_type.parse().map_err(|e| {
            error!("[{}] {}", self.shared.limb, e);
            e
        })?;
        lock(&self.shared.ctrl).ctrl_type = ctrl_type;
        Ok(())
    }

    pub fn ctrl_type(&self) -> CtrlType {
        lock(&self.shared.ctrl).ctrl_type
    }

    // ---- SENSOR CALLBACKS ----

    pub fn endpoint_cb(&self, msg: &EndpointState) {
        self.shared.endpoint_cb(msg)
    }

    pub fn ir_cb(&self, msg: &RangeState) {
        self.shared.ir_cb(msg)
    }

    pub fn cuff_lower_cb(&self, msg: ButtonState) {
        self.shared.cuff_lower_cb(msg)
    }

    pub fn cuff_upper_cb(&self, msg: ButtonState) {
        self.shared.cuff_upper_cb(msg)
    }

    pub fn joint_states_cb(&self, msg: &JointState) {
        self.shared.joint_states_cb(msg)
    }

    pub fn coll_av_cb(&self, msg: &CollisionAvoidanceState) {
        self.shared.coll_av_cb(msg)
    }

    pub fn coll_det_cb(&self, msg: &CollisionDetectionState) {
        self.shared.coll_det_cb(msg)
    }

    // ---- SENSOR DATA ----

    pub fn pose(&self) -> Pose {
        self.shared.pose()
    }

    pub fn position(&self) -> Vector3<f64> {
        self.shared.pose().position
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.shared.pose().orientation
    }

    /// The last joint state of this limb.
    pub fn joint_states(&self) -> JointState {
        self.shared.joint_states()
    }

    /// Units: Newtons
    pub fn force(&self) -> Vector3<f64> {
        lock(&self.shared.endpoint).force
    }

    /// Units: Newtons
    pub fn filtered_force(&self) -> Vector3<f64> {
        lock(&self.shared.force_filter).filtered()
    }

    // ---- FORCES ----

    /// Run the force filter on the latest endpoint force.
    pub fn filter_forces(&self) {
        self.shared.filter_forces()
    }

    pub fn detect_force_interaction(&self) -> bool {
        self.shared.detect_force_interaction()
    }

    /// Wait for a human to push or pull on the arm.
    pub fn wait_for_force_interaction(&self, timeout_s: f64, disable_coll_av: bool) -> bool {
        self.shared
            .wait_for_force_interaction(timeout_s, disable_coll_av)
    }

    /// Wait for the first joint state of this limb.
    pub fn wait_for_joint_angles(&self, timeout_s: f64) -> bool {
        self.shared.wait_for_joint_angles(timeout_s)
    }

    /// Wait for a press of the upper cuff button, which does not kill the
    /// arm while this wait is in progress.
    pub fn wait_for_upper_cuff(&self, timeout_s: f64) -> bool {
        self.shared.wait_for_upper_cuff(timeout_s)
    }

    // ---- SAFETY ----

    pub fn has_collided_ir(&self, mode: CheckMode) -> bool {
        self.shared.has_collided_ir(mode)
    }

    pub fn has_collided_cd(&self) -> bool {
        self.shared.coll_det_on.load(Ordering::SeqCst)
    }

    pub fn is_coll_av_on(&self) -> bool {
        self.shared.coll_av_on.load(Ordering::SeqCst)
    }

    pub fn suppress_collision_av(&self) {
        self.shared.arm.suppress_collision_av()
    }

    // ---- MOTION ----

    pub fn compute_ik(&self, pose: &Pose) -> Result<Vec<f64>, IkError> {
        self.shared.compute_ik(pose)
    }

    /// Send a single joint command towards `pose`, without waiting for it to
    /// be reached.
    pub fn go_to_pose_no_check(&self, pose: &Pose) -> Result<(), MotionError> {
        let joints = self.shared.compute_ik(pose)?;
        self.shared.send_joints(&joints, CtrlMode::Position);
        Ok(())
    }

    /// Send a single position joint command.
    pub fn go_to_joint_conf_no_check(&self, joints: &[f64]) {
        self.shared.send_joints(joints, CtrlMode::Position)
    }

    /// Move to `pose`, blocking until it is reached.
    ///
    /// The joint command is sent at the motion command rate. Unless
    /// `disable_coll_av` is set the motion fails as soon as the robot's
    /// collision avoidance triggers.
    pub fn go_to_pose(
        &self,
        pose: &Pose,
        mode: CheckMode,
        disable_coll_av: bool,
    ) -> Result<(), MotionError> {
        let joints = self.shared.compute_ik(pose)?;

        self.shared.blocking_motion(&joints, disable_coll_av, || {
            reach::is_pose_reached(&self.shared.pose(), pose, mode, CtrlType::Pose)
        })
    }

    /// Move to a joint configuration, blocking until it is reached.
    pub fn go_to_joint_conf(
        &self,
        joints: &[f64],
        mode: CheckMode,
        disable_coll_av: bool,
    ) -> Result<(), MotionError> {
        self.shared.blocking_motion(joints, disable_coll_av, || {
            self.is_configuration_reached(joints, mode)
        })
    }

    pub fn is_pose_reached(&self, des: &Pose, mode: CheckMode, ctrl_type: CtrlType) -> bool {
        reach::is_pose_reached(&self.shared.pose(), des, mode, ctrl_type)
    }

    pub fn is_position_reached(&self, des: &Vector3<f64>, mode: CheckMode) -> bool {
        reach::is_position_reached(&self.shared.pose().position, des, mode)
    }

    pub fn is_orientation_reached(&self, des: &UnitQuaternion<f64>, mode: CheckMode) -> bool {
        reach::is_orientation_reached(&self.shared.pose().orientation, des, mode)
    }

    /// True if the limb's joints are at `des`, given in joint name order.
    pub fn is_configuration_reached(&self, des: &[f64], mode: CheckMode) -> bool {
        des.len() >= NUM_JOINTS
            && reach::is_configuration_reached(
                &self.shared.joint_states(),
                &self.shared.joint_names,
                &des[..NUM_JOINTS],
                mode,
            )
    }
}

impl<T: ArmInterface + ?Sized> ArmInterface for Arc<T> {
    fn publish_joint_cmd(&self, cmd: &JointCommand) {
        (**self).publish_joint_cmd(cmd)
    }

    fn suppress_collision_av(&self) {
        (**self).suppress_collision_av()
    }
}

impl Drop for RobotInterface {
    fn drop(&mut self) {
        self.close();

        if let Some(jh) = self.ctrl_jh.take() {
            if jh.join().is_err() {
                error!("[{}] Control thread panicked", self.shared.limb);
            }
        }
    }
}

impl Shared {
    fn state(&self) -> ArmState {
        lock(&self.state).state
    }

    fn set_state(&self, state: ArmState) {
        let halted = {
            let mut cell = lock(&self.state);
            self.set_state_locked(&mut cell, state)
        };

        // Dropping the particle joins its thread
        drop(halted);
    }

    fn set_state_if(&self, expected: ArmState, state: ArmState) -> bool {
        let halted = {
            let mut cell = lock(&self.state);
            if cell.state != expected {
                return false;
            }
            self.set_state_locked(&mut cell, state)
        };

        drop(halted);
        true
    }

    fn try_set_working(&self) -> Option<ArmState> {
        let halted;
        let prev;
        {
            let mut cell = lock(&self.state);
            prev = cell.state;
            if prev == ArmState::Working {
                return None;
            }
            halted = self.set_state_locked(&mut cell, ArmState::Working);
        }

        drop(halted);
        Some(prev)
    }

    /// Change the state with the state lock held, returning the particle of
    /// a halted control session so the caller can stop it after unlocking.
    fn set_state_locked(
        &self,
        cell: &mut StateCell,
        state: ArmState,
    ) -> Option<ParticleThread<LinearPointParticle>> {
        cell.state = state;

        let halted = match state {
            ArmState::Working | ArmState::Killed | ArmState::Stopped => self.halt_ctrl_locked(),
            _ => None,
        };

        info!("[{}] State set to {}", self.limb, state);
        self.publish_locked(cell);

        halted
    }

    fn publish_locked(&self, cell: &StateCell) {
        self.publisher.publish(&ArmStateTm {
            state: cell.state.as_str().to_string(),
            action: cell.action.clone(),
            object: cell.object.clone(),
        });
    }

    fn ok(&self) -> bool {
        !self.closing.load(Ordering::SeqCst)
            && !matches!(self.state(), ArmState::Killed | ArmState::Stopped)
    }

    fn pose(&self) -> Pose {
        lock(&self.endpoint).pose
    }

    fn joint_states(&self) -> JointState {
        lock(&self.joints).clone()
    }

    /// Publish one joint command in the given mode.
    fn send_joints(&self, joints: &[f64], mode: CtrlMode) {
        let mut cmd = JointCommand {
            mode,
            names: self.joint_names.clone(),
            position: Vec::new(),
            velocity: Vec::new(),
        };

        match mode {
            CtrlMode::Velocity => cmd.velocity = joints.to_vec(),
            CtrlMode::Position | CtrlMode::RawPosition => cmd.position = joints.to_vec(),
        }

        self.arm.publish_joint_cmd(&cmd);
    }

    fn send_zero_velocity(&self) {
        self.arm
            .publish_joint_cmd(&JointCommand::zero_velocity(self.joint_names.clone()));
    }

    /// Resend a joint command until `reached` returns true.
    fn blocking_motion<F>(
        &self,
        joints: &[f64],
        disable_coll_av: bool,
        reached: F,
    ) -> Result<(), MotionError>
    where
        F: Fn() -> bool,
    {
        let mut rate = LoopRate::new(self.params.motion_cmd_rate_hz);
        let start = Instant::now();
        let timeout = seconds_to_duration(self.params.motion_timeout_s);

        loop {
            if !self.ok() {
                return Err(MotionError::Interrupted);
            }

            if disable_coll_av {
                self.arm.suppress_collision_av();
            } else if self.coll_av_on.load(Ordering::SeqCst) {
                error!("[{}] Collision occurred! Stopping.", self.limb);
                return Err(MotionError::Collision);
            }

            self.send_joints(joints, CtrlMode::Position);

            if reached() {
                return Ok(());
            }

            if start.elapsed() > timeout {
                warn!(
                    "[{}] Target not reached in {:.1} s",
                    self.limb, self.params.motion_timeout_s
                );
                return Err(MotionError::Timeout);
            }

            rate.sleep();
        }
    }
}
