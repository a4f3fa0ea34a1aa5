//! # Trajectory particles
//!
//! A particle is a point moving from a start position to a desired position
//! according to some motion law. The particle is advanced by its own
//! background thread at a fixed rate, and its current point is read by the
//! cartesian controller on every tick.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod linear;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use log::{debug, warn};
use nalgebra::Vector3;
use util::time::LoopRate;

use crate::sync::lock;

pub use linear::LinearPointParticle;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A motion law drives a particle from its initial point to its desired point.
///
/// Implementations must produce a continuous sequence of points which ends
/// exactly on the desired point.
pub trait MotionLaw: Send + 'static {
    /// True once the law has been given a valid start, target and speed.
    fn is_set(&self) -> bool;

    fn initial_point(&self) -> Vector3<f64>;

    fn desired_point(&self) -> Vector3<f64>;

    /// Compute the point the particle should be at `elapsed_s` seconds after
    /// it was started.
    fn next_point(&mut self, elapsed_s: f64) -> Vector3<f64>;

    /// True if `point` is close enough to the desired point for the
    /// trajectory to be over.
    fn is_reached(&self, point: &Vector3<f64>) -> bool;
}

/// Receives the particle's current and desired points for visualisation.
pub trait MarkerSink: Send {
    fn publish(&mut self, name: &str, current: &Vector3<f64>, desired: &Vector3<f64>);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A particle advanced by a background thread.
///
/// Dropping the particle stops and joins its thread.
pub struct ParticleThread<M: MotionLaw> {
    name: String,
    rate_hz: f64,
    shared: Arc<Shared<M>>,
    jh: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<M> {
    law: Mutex<M>,
    curr_pt: Mutex<Vector3<f64>>,
    marker_sink: Mutex<Option<Box<dyn MarkerSink>>>,
    is_running: AtomicBool,
    is_closing: AtomicBool,
    is_reached: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParticleError {
    #[error("The particle's motion law has not been set up")]
    NotSet,

    #[error("The particle thread is already running")]
    AlreadyRunning,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<M: MotionLaw> ParticleThread<M> {
    /// Create a new particle, the thread is not started until `start` is called.
    pub fn new(name: &str, rate_hz: f64, law: M) -> Self {
        let initial = law.initial_point();

        Self {
            name: name.to_string(),
            rate_hz,
            shared: Arc::new(Shared {
                law: Mutex::new(law),
                curr_pt: Mutex::new(initial),
                marker_sink: Mutex::new(None),
                is_running: AtomicBool::new(false),
                is_closing: AtomicBool::new(false),
                is_reached: AtomicBool::new(false),
            }),
            jh: Mutex::new(None),
        }
    }

    /// Publish the current and desired points to the given sink on every tick.
    pub fn with_marker_sink(self, sink: Box<dyn MarkerSink>) -> Self {
        *lock(&self.shared.marker_sink) = Some(sink);
        self
    }

    /// Start the particle thread.
    pub fn start(&self) -> Result<(), ParticleError> {
        let mut jh = lock(&self.jh);

        if !lock(&self.shared.law).is_set() {
            return Err(ParticleError::NotSet);
        }

        if self.shared.is_running.load(Ordering::SeqCst) {
            return Err(ParticleError::AlreadyRunning);
        }

        // A thread which finished by itself still needs joining
        if let Some(old) = jh.take() {
            join(&self.name, old);
        }

        *lock(&self.shared.curr_pt) = lock(&self.shared.law).initial_point();
        self.shared.is_reached.store(false, Ordering::SeqCst);
        self.shared.is_closing.store(false, Ordering::SeqCst);
        self.shared.is_running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let name = self.name.clone();
        let rate_hz = self.rate_hz;
        *jh = Some(thread::spawn(move || particle_thread(shared, name, rate_hz)));

        debug!("Particle {} started", self.name);

        Ok(())
    }

    /// Stop the particle thread and wait for it to exit.
    ///
    /// Calling this on a stopped particle does nothing.
    pub fn stop(&self) {
        self.shared.is_closing.store(true, Ordering::SeqCst);

        if let Some(jh) = lock(&self.jh).take() {
            join(&self.name, jh);
        }

        self.shared.is_running.store(false, Ordering::SeqCst);
    }

    /// The latest point computed by the particle thread.
    pub fn current_point(&self) -> Vector3<f64> {
        *lock(&self.shared.curr_pt)
    }

    pub fn desired_point(&self) -> Vector3<f64> {
        lock(&self.shared.law).desired_point()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::SeqCst)
    }

    /// True once the particle has arrived at its desired point.
    pub fn is_reached(&self) -> bool {
        self.shared.is_reached.load(Ordering::SeqCst)
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<M: MotionLaw> Drop for ParticleThread<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn particle_thread<M: MotionLaw>(shared: Arc<Shared<M>>, name: String, rate_hz: f64) {
    let mut rate = LoopRate::new(rate_hz);
    let start = Instant::now();

    while !shared.is_closing.load(Ordering::SeqCst) {
        let (pt, des, reached) = {
            let mut law = lock(&shared.law);
            let pt = law.next_point(start.elapsed().as_secs_f64());
            (pt, law.desired_point(), law.is_reached(&pt))
        };

        *lock(&shared.curr_pt) = pt;

        if let Some(sink) = lock(&shared.marker_sink).as_mut() {
            sink.publish(&name, &pt, &des);
        }

        if reached {
            shared.is_reached.store(true, Ordering::SeqCst);
            break;
        }

        rate.sleep();
    }

    shared.is_running.store(false, Ordering::SeqCst);
}

fn join(name: &str, jh: JoinHandle<()>) {
    if jh.join().is_err() {
        warn!("Particle {} thread panicked", name);
    }
}
