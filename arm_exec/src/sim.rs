//! # Simulated arm
//!
//! A kinematic stand-in for one limb, used by the executable when no robot
//! is attached and by the integration tests. The simulation provides:
//!
//! - Joint commands, applied instantly. The "joints" of the simulated limb
//!   are the end effector pose itself, `[x, y, z, qx, qy, qz, qw]`.
//! - An IK solver, which fails outside a sphere around the base or when
//!   disabled.
//! - A gripper, which grips whenever it is closed and an object is present.
//! - Settable force, IR range and collision readings.
//!
//! `SensorPump` feeds the simulated readings into a `RobotInterface` on a
//! background thread.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use comms_if::{
    eqpt::arm::{
        CollisionAvoidanceState, CollisionDetectionState, EndpointState, JointCommand,
        JointState, Limb, RangeState,
    },
    tc::arm_ctrl::CtrlMode,
    Pose,
};
use log::debug;
use nalgebra::Vector3;
use util::time::LoopRate;

use crate::{
    gripper::{Gripper, GripperType},
    robot_interface::{ArmInterface, IkError, IkSolution, IkSolver, RobotInterface, NUM_JOINTS},
    sync::lock,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Radius of the sphere around the base inside which IK has a solution.
///
/// Units: meters
pub const REACH_RADIUS_M: f64 = 1.2;

/// Time step velocity commands are integrated over.
///
/// Units: seconds
const VELOCITY_STEP_S: f64 = 0.01;

/// Pose the simulated limb starts in, above the table with the gripper down.
const START_JOINTS: [f64; NUM_JOINTS] = [0.6, 0.0, 0.3, 0.0, 1.0, 0.0, 0.0];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SimArm {
    limb: Limb,
    gripper_type: GripperType,

    joints: Mutex<[f64; NUM_JOINTS]>,
    force: Mutex<Vector3<f64>>,
    range: Mutex<RangeState>,
    coll_objects: Mutex<Vec<String>>,
    coll_det: AtomicBool,

    ik_enabled: AtomicBool,
    gripper_closed: AtomicBool,
    object_present: AtomicBool,

    last_cmd: Mutex<Option<JointCommand>>,
    num_cmds: AtomicU64,
    num_suppressions: AtomicU64,
}

/// Background thread calling a closure at a fixed rate.
pub struct SensorPump {
    run: Arc<AtomicBool>,
    jh: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimArm {
    pub fn new(limb: Limb, gripper_type: GripperType) -> Self {
        Self {
            limb,
            gripper_type,
            joints: Mutex::new(START_JOINTS),
            force: Mutex::new(Vector3::zeros()),
            range: Mutex::new(RangeState {
                range_m: 0.3,
                min_range_m: 0.004,
                max_range_m: 0.4,
            }),
            coll_objects: Mutex::new(Vec::new()),
            coll_det: AtomicBool::new(false),
            ik_enabled: AtomicBool::new(true),
            gripper_closed: AtomicBool::new(false),
            object_present: AtomicBool::new(true),
            last_cmd: Mutex::new(None),
            num_cmds: AtomicU64::new(0),
            num_suppressions: AtomicU64::new(0),
        }
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    // ---- SIMULATION INPUTS ----

    pub fn set_force(&self, force: Vector3<f64>) {
        *lock(&self.force) = force;
    }

    pub fn set_range(&self, range_m: f64) {
        lock(&self.range).range_m = range_m;
    }

    pub fn set_coll_objects(&self, objects: Vec<String>) {
        *lock(&self.coll_objects) = objects;
    }

    pub fn set_coll_det(&self, collision: bool) {
        self.coll_det.store(collision, Ordering::SeqCst);
    }

    pub fn set_ik_enabled(&self, enabled: bool) {
        self.ik_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Set whether closing the gripper grips an object.
    pub fn set_object_present(&self, present: bool) {
        self.object_present.store(present, Ordering::SeqCst);
    }

    // ---- SIMULATION OUTPUTS ----

    pub fn joints(&self) -> [f64; NUM_JOINTS] {
        *lock(&self.joints)
    }

    pub fn pose(&self) -> Pose {
        let j = self.joints();
        Pose::from_parts_raw(j[0], j[1], j[2], j[3], j[4], j[5], j[6])
    }

    pub fn is_gripper_closed(&self) -> bool {
        self.gripper_closed.load(Ordering::SeqCst)
    }

    /// Number of joint commands received.
    pub fn num_cmds(&self) -> u64 {
        self.num_cmds.load(Ordering::SeqCst)
    }

    /// The last joint command received.
    pub fn last_cmd(&self) -> Option<JointCommand> {
        lock(&self.last_cmd).clone()
    }

    pub fn num_suppressions(&self) -> u64 {
        self.num_suppressions.load(Ordering::SeqCst)
    }

    pub fn endpoint_state(&self) -> EndpointState {
        EndpointState {
            pose: self.pose(),
            force: *lock(&self.force),
        }
    }

    pub fn joint_state(&self, names: &[String]) -> JointState {
        JointState {
            name: names.to_vec(),
            position: self.joints().to_vec(),
            velocity: vec![0.0; names.len()],
        }
    }

    pub fn range_state(&self) -> RangeState {
        *lock(&self.range)
    }

    pub fn coll_av_state(&self) -> CollisionAvoidanceState {
        CollisionAvoidanceState {
            collision_objects: lock(&self.coll_objects).clone(),
        }
    }

    pub fn coll_det_state(&self) -> CollisionDetectionState {
        CollisionDetectionState {
            collision_state: self.coll_det.load(Ordering::SeqCst),
        }
    }

    /// Push every simulated reading into the interface.
    pub fn feed(&self, ri: &RobotInterface) {
        ri.endpoint_cb(&self.endpoint_state());
        ri.joint_states_cb(&self.joint_state(ri.joint_names()));
        ri.ir_cb(&self.range_state());
        ri.coll_av_cb(&self.coll_av_state());
        ri.coll_det_cb(&self.coll_det_state());
    }
}

impl ArmInterface for SimArm {
    fn publish_joint_cmd(&self, cmd: &JointCommand) {
        self.num_cmds.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_cmd) = Some(cmd.clone());

        let mut joints = lock(&self.joints);

        match cmd.mode {
            CtrlMode::Position | CtrlMode::RawPosition => {
                for (j, p) in joints.iter_mut().zip(cmd.position.iter()) {
                    *j = *p;
                }
            }
            CtrlMode::Velocity => {
                for (j, v) in joints.iter_mut().zip(cmd.velocity.iter()) {
                    *j += v * VELOCITY_STEP_S;
                }
            }
        }
    }

    fn suppress_collision_av(&self) {
        self.num_suppressions.fetch_add(1, Ordering::SeqCst);
    }
}

impl IkSolver for SimArm {
    fn solve(&self, pose: &Pose, _seed: &JointState) -> Result<IkSolution, IkError> {
        if !self.ik_enabled.load(Ordering::SeqCst) || pose.position.norm() > REACH_RADIUS_M {
            return Ok(IkSolution::NoSolution);
        }

        let [qx, qy, qz, qw] = pose.orientation_xyzw();

        Ok(IkSolution::Joints(vec![
            pose.position.x,
            pose.position.y,
            pose.position.z,
            qx,
            qy,
            qz,
            qw,
        ]))
    }
}

impl Gripper for SimArm {
    fn open(&self) -> bool {
        debug!("[{}] Sim gripper open", self.limb);
        self.gripper_closed.store(false, Ordering::SeqCst);
        true
    }

    fn close(&self) -> bool {
        debug!("[{}] Sim gripper close", self.limb);
        self.gripper_closed.store(true, Ordering::SeqCst);
        true
    }

    fn is_gripping(&self) -> bool {
        self.is_gripper_closed() && self.object_present.load(Ordering::SeqCst)
    }

    fn gripper_type(&self) -> GripperType {
        self.gripper_type
    }
}

impl SensorPump {
    /// Start calling `f` at `rate_hz` until the pump is stopped or dropped.
    pub fn start<F>(rate_hz: f64, mut f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let run = Arc::new(AtomicBool::new(true));
        let run_clone = run.clone();

        let jh = thread::spawn(move || {
            let mut rate = LoopRate::new(rate_hz);

            while run_clone.load(Ordering::SeqCst) {
                f();
                rate.sleep();
            }
        });

        Self { run, jh: Some(jh) }
    }

    pub fn stop(&mut self) {
        self.run.store(false, Ordering::SeqCst);

        if let Some(jh) = self.jh.take() {
            jh.join().ok();
        }
    }
}

impl Drop for SensorPump {
    fn drop(&mut self) {
        self.stop();
    }
}
