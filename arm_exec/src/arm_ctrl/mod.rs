//! # Arm controller
//!
//! High level action layer of one limb. Action requests are served by
//! `ArmCtrl::service_cb`, which validates the request, starts the action on a
//! worker thread and blocks until the arm reaches a terminal state.
//!
//! The actions themselves are handlers stored in the action database. They
//! receive the `ArmCtx`, which owns the robot interface, the gripper, the arm
//! variant and the bookkeeping of the current action. The built-in actions
//! are implemented in `actions`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod action_db;
mod actions;
mod capabilities;
mod object_db;
mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use comms_if::{eqpt::arm::Limb, tc::arm_ctrl::*};
use log::{error, info, warn};
use nalgebra::Vector3;
use util::time::{seconds_to_duration, LoopRate};

use crate::{
    gripper::Gripper,
    robot_interface::{ArmState, RobotInterface, NUM_JOINTS},
    sync::{lock, read, write},
};

pub use action_db::{ActionDb, ActionDbError, Handler};
pub use actions::Direction;
pub use capabilities::{ArmVariant, DefaultArm, PassTarget};
pub use object_db::{ObjectDb, ObjectDbError};
pub use params::{HomeLocation, LimbParams, Params};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Actions which do not act on an object, their object IDs are not checked
/// against the object database.
const OBJECTLESS_ACTIONS: [&str; 5] = [
    ACTION_HOME,
    ACTION_RELEASE,
    ACTION_HOLD,
    ACTION_START_HOLD,
    ACTION_END_HOLD,
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The arm controller of one limb.
pub struct ArmCtrl {
    ctx: Arc<ArmCtx>,

    action_jh: Mutex<Option<JoinHandle<()>>>,
}

/// Everything an action handler has access to.
pub struct ArmCtx {
    name: String,
    limb: Limb,
    params: Params,

    ri: RobotInterface,
    gripper: Box<dyn Gripper>,
    variant: Box<dyn ArmVariant>,

    actions: RwLock<ActionDb<ArmCtx>>,
    objects: RwLock<ObjectDb>,

    book: Mutex<Bookkeeping>,

    closing: AtomicBool,
}

/// Context of the current action.
#[derive(Debug, Default)]
struct Bookkeeping {
    /// Detail of the last result, returned in the action response.
    sub_state: String,

    action: String,
    prev_action: String,

    object_ids: Vec<i32>,
    sel_object_id: Option<i32>,

    /// Position the last object was picked up at.
    picked_up_pos: Option<Vector3<f64>>,

    home_conf: [f64; NUM_JOINTS],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArmCtrlError {
    #[error("Action database error: {0}")]
    ActionDb(#[from] ActionDbError),

    #[error("Object database error: {0}")]
    ObjectDb(#[from] ObjectDbError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmCtrl {
    /// Create the controller, with the built-in actions registered and the
    /// object database loaded from the limb's parameters.
    pub fn new(
        name: &str,
        limb: Limb,
        params: Params,
        ri: RobotInterface,
        gripper: Box<dyn Gripper>,
        variant: Box<dyn ArmVariant>,
    ) -> Self {
        let objects = ObjectDb::from_table(&params.limb(limb).objects);

        let ctx = Arc::new(ArmCtx {
            name: name.to_string(),
            limb,
            book: Mutex::new(Bookkeeping::default()),
            params,
            ri,
            gripper,
            variant,
            actions: RwLock::new(builtin_actions()),
            objects: RwLock::new(objects),
            closing: AtomicBool::new(false),
        });

        ctx.set_home_configuration(ctx.params.home_location);

        info!(
            "[{}] Arm controller {} ready, {} gripper, actions: {}, objects: {}",
            limb,
            name,
            ctx.gripper.gripper_type(),
            read(&ctx.actions),
            read(&ctx.objects)
        );

        Self {
            ctx,
            action_jh: Mutex::new(None),
        }
    }

    pub fn ctx(&self) -> &ArmCtx {
        &self.ctx
    }

    pub fn ri(&self) -> &RobotInterface {
        &self.ctx.ri
    }

    /// Serve an action request, blocking until the action has ended.
    pub fn service_cb(&self, req: &ActionRequest) -> ActionResponse {
        let ctx = &self.ctx;
        info!(
            "[{}] Service request received. Action: {} objects: {:?}",
            ctx.limb, req.action, req.objects
        );

        match req.action.as_str() {
            LIST_ACTIONS => {
                let list = read(&ctx.actions).to_string();
                info!("[{}] Available actions: {}", ctx.limb, list);
                return ActionResponse::new(true, &list);
            }
            LIST_OBJECTS => {
                let list = read(&ctx.objects).to_string();
                info!("[{}] Available objects: {}", ctx.limb, list);
                return ActionResponse::new(true, &list);
            }
            _ => (),
        }

        if !read(&ctx.actions).contains(&req.action) {
            error!("[{}] Action {} not in the database", ctx.limb, req.action);
            return ActionResponse::new(false, ACT_NOT_IN_DB);
        }

        // Resolve the objects to act on
        let (object_ids, sel_object_id) = if OBJECTLESS_ACTIONS.contains(&req.action.as_str()) {
            (Vec::new(), None)
        } else {
            if req.objects.is_empty() {
                error!("[{}] No objects selected for {}", ctx.limb, req.action);
                return ActionResponse::new(false, NO_OBJ_SELECTED);
            }

            let ids = read(&ctx.objects).filter(&req.objects);

            let sel = match ids.len() {
                0 => {
                    error!(
                        "[{}] Requested objects {:?} not in the database",
                        ctx.limb, req.objects
                    );
                    return ActionResponse::new(false, OBJ_NOT_IN_DB);
                }
                1 => Some(ids[0]),
                _ => ctx.variant.choose_object_id(ctx, &ids),
            };

            (ids, sel)
        };

        if let Err(resp) = self.start_action(&req.action, object_ids, sel_object_id) {
            return resp;
        }

        self.wait_for_action(&req.action)
    }

    /// Insert a custom action.
    pub fn insert_action<F>(&self, name: &str, handler: F) -> Result<(), ArmCtrlError>
    where
        F: Fn(&ArmCtx) -> bool + Send + Sync + 'static,
    {
        write(&self.ctx.actions).insert(name, handler)?;
        Ok(())
    }

    pub fn remove_action(&self, name: &str) -> Result<(), ArmCtrlError> {
        write(&self.ctx.actions).remove(name)?;
        Ok(())
    }

    pub fn insert_object(&self, id: i32, name: &str) -> Result<(), ArmCtrlError> {
        write(&self.ctx.objects).insert(id, name)?;
        Ok(())
    }

    pub fn remove_object(&self, id: i32) -> Result<String, ArmCtrlError> {
        Ok(write(&self.ctx.objects).remove(id)?)
    }

    /// Start the action thread, the arm is set to `WORKING` before this
    /// returns.
    fn start_action(
        &self,
        action: &str,
        object_ids: Vec<i32>,
        sel_object_id: Option<i32>,
    ) -> Result<(), ActionResponse> {
        let ctx = &self.ctx;
        let mut action_jh = lock(&self.action_jh);

        if ctx.ri.state() == ArmState::Working {
            warn!("[{}] Arm busy, refusing {}", ctx.limb, action);
            return Err(ActionResponse::new(false, ARM_BUSY));
        }

        // The last action thread may still be recovering from an error, it
        // must not see this action's WORKING state.
        if let Some(jh) = action_jh.take() {
            if jh.join().is_err() {
                error!("[{}] Action thread panicked", ctx.limb);
            }
        }

        {
            let mut book = lock(&ctx.book);
            book.sub_state.clear();
            book.object_ids = object_ids;
            book.sel_object_id = sel_object_id;
        }
        ctx.set_action(action);

        // Held until the action thread, recovery included, has ended
        ctx.ri.set_action_active(true);

        let prev_state = match ctx.ri.try_set_working() {
            Some(s) => s,
            None => {
                ctx.ri.set_action_active(false);
                warn!("[{}] Arm busy, refusing {}", ctx.limb, action);
                return Err(ActionResponse::new(false, ARM_BUSY));
            }
        };

        let ctx_clone = ctx.clone();
        let action = action.to_string();
        *action_jh = Some(thread::spawn(move || {
            action_thread(ctx_clone, action, prev_state)
        }));

        Ok(())
    }

    /// Poll the arm state until the action has ended, then build the
    /// response.
    fn wait_for_action(&self, action: &str) -> ActionResponse {
        let ctx = &self.ctx;
        let start = Instant::now();
        let timeout = ctx.params.request_timeout_s.map(seconds_to_duration);
        let mut rate = LoopRate::new(ctx.params.request_poll_hz);

        let state = loop {
            let state = ctx.ri.state();
            if state != ArmState::Working {
                break state;
            }

            if let Some(t) = timeout {
                if start.elapsed() > t {
                    warn!("[{}] Request for {} timed out", ctx.limb, action);
                    return ActionResponse::new(false, REQ_TIMED_OUT);
                }
            }

            rate.sleep();
        };

        let sub_state = ctx.sub_state();

        let resp = match state {
            ArmState::Start | ArmState::Done | ArmState::PickUp => {
                ActionResponse::new(true, &sub_state)
            }
            ArmState::Error => ActionResponse::new(false, &sub_state),
            ArmState::Killed | ArmState::Stopped => ActionResponse::new(false, ACT_KILLED),
            // A control session started after the action ended
            _ => ActionResponse::new(sub_state == action, &sub_state),
        };

        info!(
            "[{}] Service reply: success {} response {:?}",
            ctx.limb, resp.success, resp.response
        );

        resp
    }
}

impl Drop for ArmCtrl {
    fn drop(&mut self) {
        self.ctx.closing.store(true, Ordering::SeqCst);
        self.ctx.ri.close();

        if let Some(jh) = lock(&self.action_jh).take() {
            if jh.join().is_err() {
                error!("[{}] Action thread panicked", self.ctx.limb);
            }
        }
    }
}

impl ArmCtx {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn limb_params(&self) -> &LimbParams {
        self.params.limb(self.limb)
    }

    pub fn ri(&self) -> &RobotInterface {
        &self.ri
    }

    pub fn gripper(&self) -> &dyn Gripper {
        self.gripper.as_ref()
    }

    /// True while the arm may keep moving.
    pub fn ok(&self) -> bool {
        self.ri.ok() && !self.closing.load(Ordering::SeqCst)
    }

    // ---- BOOKKEEPING ----

    pub fn sub_state(&self) -> String {
        lock(&self.book).sub_state.clone()
    }

    pub fn set_sub_state(&self, sub_state: &str) {
        lock(&self.book).sub_state = sub_state.to_string();
    }

    pub fn action(&self) -> String {
        lock(&self.book).action.clone()
    }

    pub fn prev_action(&self) -> String {
        lock(&self.book).prev_action.clone()
    }

    pub fn set_prev_action(&self, action: &str) {
        lock(&self.book).prev_action = action.to_string();
    }

    pub fn object_ids(&self) -> Vec<i32> {
        lock(&self.book).object_ids.clone()
    }

    pub fn sel_object_id(&self) -> Option<i32> {
        lock(&self.book).sel_object_id
    }

    pub fn picked_up_pos(&self) -> Option<Vector3<f64>> {
        lock(&self.book).picked_up_pos
    }

    pub fn object_name(&self, id: i32) -> Option<String> {
        read(&self.objects).name(id).map(String::from)
    }

    pub fn object_id(&self, name: &str) -> Option<i32> {
        read(&self.objects).id(name)
    }

    pub fn home_conf(&self) -> [f64; NUM_JOINTS] {
        lock(&self.book).home_conf
    }

    /// Set the current action, the old one becomes the previous action.
    fn set_action(&self, action: &str) {
        let sel = {
            let mut book = lock(&self.book);
            book.prev_action = std::mem::replace(&mut book.action, action.to_string());
            book.sel_object_id
        };

        let object = sel.and_then(|id| self.object_name(id)).unwrap_or_default();
        self.ri.set_published_action(action, &object);
        self.ri.publish_state();
    }

    // ---- STATE ----

    /// Set the arm state, updating the sub state to match.
    pub fn set_state(&self, state: ArmState) {
        let mut book = lock(&self.book);
        Self::update_sub_state(&mut book, state);
        self.ri.set_state(state);
    }

    /// Set the arm state if it is currently `expected`, updating the sub
    /// state to match. Returns true if the state changed.
    pub fn set_state_if(&self, expected: ArmState, state: ArmState) -> bool {
        let mut book = lock(&self.book);
        let prev_sub_state = book.sub_state.clone();

        Self::update_sub_state(&mut book, state);

        if self.ri.set_state_if(expected, state) {
            true
        } else {
            book.sub_state = prev_sub_state;
            false
        }
    }

    fn update_sub_state(book: &mut Bookkeeping, state: ArmState) {
        match state {
            ArmState::Start | ArmState::Done => book.sub_state = book.action.clone(),
            ArmState::Killed => book.sub_state = ACT_KILLED.to_string(),
            ArmState::Error if book.sub_state.is_empty() => {
                book.sub_state = ACT_FAILED.to_string()
            }
            _ => (),
        }
    }

    /// Run the handler registered for `action`.
    fn do_action(&self, action: &str) -> bool {
        let handler = read(&self.actions).get(action);

        match handler {
            Some(h) => h(self),
            None => {
                error!("[{}] Action {} not in the database", self.limb, action);
                self.set_sub_state(ACT_NOT_IN_DB);
                false
            }
        }
    }

    /// Attempt to recover from a failed action, if enabled.
    pub fn recover_from_error(&self) -> bool {
        if !self.params.internal_recovery {
            return false;
        }

        info!("[{}] Recovering from error", self.limb);
        self.variant.recover_from_error(self)
    }

    pub fn set_home_configuration(&self, location: HomeLocation) {
        let conf = self.variant.home_configuration(self, location);
        lock(&self.book).home_conf = conf;
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn builtin_actions() -> ActionDb<ArmCtx> {
    let mut db = ActionDb::new();

    let builtins: [(&str, fn(&ArmCtx) -> bool); 9] = [
        (ACTION_HOME, ArmCtx::go_home),
        (ACTION_RELEASE, |c: &ArmCtx| c.gripper.open()),
        (ACTION_HOLD, ArmCtx::hold_object),
        (ACTION_START_HOLD, ArmCtx::start_hold),
        (ACTION_END_HOLD, ArmCtx::end_hold),
        (ACTION_GET, ArmCtx::get_object),
        (ACTION_PASS, ArmCtx::pass_object),
        (ACTION_GET_PASS, ArmCtx::get_pass_object),
        (ACTION_CLEANUP, ArmCtx::clean_up_object),
    ];

    for (name, handler) in builtins.iter().copied() {
        if let Err(e) = db.insert(name, handler) {
            error!("Could not register built-in action: {}", e);
        }
    }

    db
}

/// Body of the action thread.
fn action_thread(ctx: Arc<ArmCtx>, action: String, prev_state: ArmState) {
    if action == ACTION_HOME || action == ACTION_RELEASE {
        if ctx.do_action(&action) {
            ctx.ri.set_action_active(false);
            ctx.set_state_if(ArmState::Working, ArmState::Start);
        }
    } else if prev_state != ArmState::Stopped {
        if ctx.do_action(&action) {
            ctx.ri.set_action_active(false);
            ctx.set_state_if(ArmState::Working, ArmState::Done);
        } else {
            info!("[{}] Action {} failed", ctx.limb, action);

            if ctx.set_state_if(ArmState::Working, ArmState::Error) {
                ctx.recover_from_error();
            }
        }
    } else {
        error!(
            "[{}] Cannot start {} while the arm is {}",
            ctx.limb, action, prev_state
        );
    }

    // The action ended without reaching a terminal state
    ctx.set_state_if(ArmState::Working, ArmState::Error);
    ctx.ri.set_action_active(false);

    if ctx.ri.state() == ArmState::Error {
        error!(
            "[{}] Action {} not successful: {}",
            ctx.limb,
            action,
            ctx.sub_state()
        );
    }
}
