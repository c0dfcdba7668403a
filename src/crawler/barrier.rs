//! Level barrier for breadth-first traversal
//!
//! The set of tasks belonging to one level is not known up front: a download
//! task that succeeds spawns an extraction task which must also finish before
//! the level is over. The barrier counts outstanding registrations and releases
//! the orchestrator when the count drops to zero.
//!
//! The protocol relies on two rules:
//! - a task is registered before it is handed to a worker pool, and a child
//!   task is registered before its parent arrives, so the count can never hit
//!   zero while work for the level is still pending;
//! - the orchestrator holds one permanent party while it submits a level, so
//!   tasks that finish early cannot release the barrier before the whole level
//!   has been submitted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A reusable, dynamically-registered barrier
#[derive(Debug)]
pub struct LevelBarrier {
    /// Registered parties that have not yet arrived in the current phase
    outstanding: AtomicUsize,

    /// Number of completed phases
    phase: AtomicUsize,

    /// Signalled whenever the outstanding count drops to zero
    advanced: Notify,
}

/// A registration on a [`LevelBarrier`]
///
/// Arrives when dropped, so a task that returns early, panics, or is cancelled
/// by a pool shutdown still deregisters.
#[derive(Debug)]
#[must_use = "dropping an Arrival immediately arrives at the barrier"]
pub struct Arrival {
    barrier: Arc<LevelBarrier>,
}

impl LevelBarrier {
    /// Creates a barrier with no registered parties
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outstanding: AtomicUsize::new(0),
            phase: AtomicUsize::new(0),
            advanced: Notify::new(),
        })
    }

    /// Creates a barrier held open by the orchestrator's permanent party
    ///
    /// The holder advances phases with [`await_advance`](Self::await_advance)
    /// and gives up its stake with [`release_hold`](Self::release_hold).
    pub fn held_open() -> Arc<Self> {
        let barrier = Self::new();
        barrier.outstanding.store(1, Ordering::SeqCst);
        barrier
    }

    /// Registers one task with the current phase
    ///
    /// Must be called before the task is submitted for execution.
    pub fn register(self: &Arc<Self>) -> Arrival {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Arrival {
            barrier: Arc::clone(self),
        }
    }

    /// Arrives for the holder's party and waits for every other party
    ///
    /// Once the outstanding count reaches zero the holder's party is
    /// re-registered for the next phase and the new phase number is returned.
    /// Returns immediately if no task was registered in this phase.
    pub async fn await_advance(&self) -> usize {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) != 1 {
            loop {
                let notified = self.advanced.notified();
                if self.outstanding.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.phase.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Drops the holder's permanent party at teardown
    pub fn release_hold(&self) {
        self.arrive();
    }

    /// Returns the number of parties that have not yet arrived
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Returns the number of completed phases
    #[cfg(test)]
    fn phase(&self) -> usize {
        self.phase.load(Ordering::SeqCst)
    }

    fn arrive(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            // notify_one stores a permit, so a holder that has not started
            // waiting yet still sees the wakeup
            self.advanced.notify_one();
        }
    }
}

impl Arrival {
    /// Returns the barrier this registration belongs to
    pub fn barrier(&self) -> &Arc<LevelBarrier> {
        &self.barrier
    }

    /// Arrives explicitly (equivalent to dropping the registration)
    pub fn arrive(self) {
        drop(self);
    }
}

impl Drop for Arrival {
    fn drop(&mut self) {
        self.barrier.arrive();
    }
}
