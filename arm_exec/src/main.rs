//! Main arm executable entry point.
//!
//! # Architecture
//!
//! The executable runs one limb against the simulated arm:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the simulated arm, the robot interface and the arm controller
//!     - Feed the simulated sensors into the robot interface at a fixed rate
//!     - Execute the telecommand script, logging each action response
//!     - Save the responses into the session directory and shut down
//!
//! If no script is given the arm lists its actions and objects and goes home.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc, thread};
use structopt::StructOpt;

// Internal
use arm_lib::{
    arm_ctrl::{self, ArmCtrl, DefaultArm},
    gripper::GripperType,
    robot_interface::{self, LatchedStatePublisher, RobotInterface},
    sim::{SensorPump, SimArm},
};
use comms_if::{
    eqpt::arm::{ButtonState, Limb},
    tc::{
        arm_ctrl::{ActionRequest, ActionResponse, GoToPose},
        Tc, TcType,
    },
};
use util::{
    logger::{logger_init, LevelFilter},
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::{self, Session},
    time::LoopRate,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Rate at which the simulated sensors are fed to the robot interface.
///
/// Units: Hertz
const SENSOR_RATE_HZ: f64 = 200.0;

/// Rate at which the script is checked for pending telecommands.
///
/// Units: Hertz
const SCRIPT_RATE_HZ: f64 = 20.0;

/// Time to wait for the first joint angles from the arm.
///
/// Units: seconds
const JOINT_ANGLES_TIMEOUT_S: f64 = 2.0;

/// Script run when none is given on the command line.
const DEFAULT_SCRIPT: &str = r#"
0.0: {"type": "ACTION", "payload": {"action": "list_actions"}};
0.0: {"type": "ACTION", "payload": {"action": "list_objects"}};
0.1: {"type": "ACTION", "payload": {"action": "home"}};
"#;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "arm_exec", about = "Task execution for one arm of the robot")]
struct Opt {
    /// Limb to run, "left" or "right"
    #[structopt(short, long, default_value = "right")]
    limb: Limb,

    /// Simulate a suction gripper rather than an electric one
    #[structopt(long)]
    suction: bool,

    /// Path to the telecommand script to execute
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,
}

/// An action response recorded for the session.
#[derive(Debug, Serialize)]
struct ScriptResponse {
    time_s: f64,
    request: ActionRequest,
    response: ActionResponse,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Arm Executable\n");
    info!("Limb: {}", opt.limb);
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let ri_params: robot_interface::Params = util::params::load("robot_interface.toml")
        .wrap_err("Could not load robot interface params")?;
    let ctrl_params: arm_ctrl::Params =
        util::params::load("arm_ctrl.toml").wrap_err("Could not load arm control params")?;

    info!("Exec parameters loaded");

    // ---- LOAD SCRIPT ----

    let mut si = match opt.script {
        Some(ref path) => {
            info!("Loading script from {:?}", path);
            ScriptInterpreter::new(path).wrap_err("Failed to load script")?
        }
        None => {
            info!("No script provided, using the default script");
            ScriptInterpreter::from_script(DEFAULT_SCRIPT)
                .wrap_err("Failed to load the default script")?
        }
    };

    info!(
        "Loaded script lasts {:.02} s and contains {} TCs\n",
        si.get_duration(),
        si.get_num_tcs()
    );

    // ---- INITIALISE ARM ----

    let gripper_type = if opt.suction {
        GripperType::Suction
    } else {
        GripperType::Electric
    };
    let sim = Arc::new(SimArm::new(opt.limb, gripper_type));

    let publisher = Arc::new(LatchedStatePublisher::new());
    let tm_rx = publisher.subscribe();
    let tm_jh = thread::spawn(move || {
        for tm in tm_rx.iter() {
            info!("State TM: {} {} {}", tm.state, tm.action, tm.object);
        }
    });

    let ri = RobotInterface::new(
        "arm_exec",
        opt.limb,
        ri_params,
        Box::new(sim.clone()),
        Box::new(sim.clone()),
        Box::new(publisher.clone()),
    );

    let arm = Arc::new(ArmCtrl::new(
        "arm_exec",
        opt.limb,
        ctrl_params,
        ri,
        Box::new(sim.clone()),
        Box::new(DefaultArm),
    ));

    let pump = {
        let sim = sim.clone();
        let arm = arm.clone();
        SensorPump::start(SENSOR_RATE_HZ, move || sim.feed(arm.ri()))
    };

    if !arm.ri().wait_for_joint_angles(JOINT_ANGLES_TIMEOUT_S) {
        return Err(eyre!("No joint angles received from the arm"));
    }

    info!("Arm initialisation complete\n");

    // ---- MAIN LOOP ----

    let mut responses = Vec::new();
    let mut rate = LoopRate::new(SCRIPT_RATE_HZ);

    loop {
        match si.get_pending_tcs(session::get_elapsed_seconds()) {
            PendingTcs::None => (),
            PendingTcs::Some(tcs) => {
                for tc in tcs.iter() {
                    if let Some(r) = exec_tc(&arm, tc) {
                        responses.push(r);
                    }
                }
            }
            PendingTcs::EndOfScript => {
                info!("End of TC script reached, stopping");
                break;
            }
        }

        rate.sleep();
    }

    // ---- SHUTDOWN ----

    session.save("responses.json", responses);

    drop(pump);
    drop(arm);
    drop(publisher);

    if tm_jh.join().is_err() {
        warn!("State TM thread panicked");
    }

    info!("Shutdown complete");
    session.exit();

    Ok(())
}

/// Execute a single telecommand, returning the response if it was an action
/// request.
fn exec_tc(arm: &ArmCtrl, tc: &Tc) -> Option<ScriptResponse> {
    match tc.tc_type {
        TcType::Action => {
            let request: ActionRequest = match tc.parse_payload() {
                Ok(r) => r,
                Err(e) => {
                    warn!("Invalid action request: {}", e);
                    return None;
                }
            };

            let response = arm.service_cb(&request);
            info!(
                "Action {} -> success: {}, response: {:?}",
                request.action, response.success, response.response
            );

            Some(ScriptResponse {
                time_s: session::get_elapsed_seconds(),
                request,
                response,
            })
        }
        TcType::GoToPose => {
            match tc.parse_payload::<GoToPose>() {
                Ok(cmd) => {
                    if let Err(e) = arm.ri().ctrl_msg_cb(&cmd) {
                        warn!("Control command rejected: {}", e);
                    }
                }
                Err(e) => warn!("Invalid control command: {}", e),
            }
            None
        }
        TcType::Kill => {
            // Same as the human pressing the lower cuff button
            arm.ri().cuff_lower_cb(ButtonState::Pressed);
            arm.ri().cuff_lower_cb(ButtonState::Released);
            None
        }
        TcType::Stop => {
            arm.ri().stop();
            None
        }
        TcType::None | TcType::Heartbeat => None,
    }
}
