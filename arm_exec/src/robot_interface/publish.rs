//! # State publishing
//!
//! Every state change of an arm is published through a `StatePublisher`. The
//! in-process `LatchedStatePublisher` keeps the last snapshot so subscribers
//! joining late still see the current state straight away.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc, Mutex,
};

use comms_if::tm::ArmStateTm;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

pub trait StatePublisher: Send + Sync {
    fn publish(&self, tm: &ArmStateTm);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Latched publisher delivering snapshots over `mpsc` channels.
#[derive(Default)]
pub struct LatchedStatePublisher {
    inner: Mutex<Latched>,
}

#[derive(Default)]
struct Latched {
    latest: Option<ArmStateTm>,
    subscribers: Vec<Sender<ArmStateTm>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LatchedStatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the state, the latest snapshot (if any) is already
    /// waiting in the returned receiver.
    pub fn subscribe(&self) -> Receiver<ArmStateTm> {
        let (tx, rx) = channel();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(ref tm) = inner.latest {
            tx.send(tm.clone()).ok();
        }
        inner.subscribers.push(tx);

        rx
    }

    /// The last published snapshot.
    pub fn latest(&self) -> Option<ArmStateTm> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .latest
            .clone()
    }
}

impl StatePublisher for LatchedStatePublisher {
    fn publish(&self, tm: &ArmStateTm) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        inner.latest = Some(tm.clone());

        // Subscribers which hung up are dropped
        inner.subscribers.retain(|s| s.send(tm.clone()).is_ok());
    }
}

impl<T: StatePublisher + ?Sized> StatePublisher for Arc<T> {
    fn publish(&self, tm: &ArmStateTm) {
        (**self).publish(tm)
    }
}
