use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// What the owner of a `BuildGate` is currently allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Building,
    Paused,
}

#[derive(Debug)]
struct GateState {
    phase: GatePhase,
    pending_pauses: usize,
}

/// A tri-state gate between a single build consumer and the snapshot readers.
///
/// The consumer holds the gate while it absorbs one batch, a reader holds it while it
/// captures the model. Both sides leave the gate `Idle` when they're done. A waiting
/// reader keeps the consumer from starting its next step.
#[derive(Debug)]
pub struct BuildGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl Default for BuildGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                phase: GatePhase::Idle,
                pending_pauses: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.state.lock().phase
    }

    /// Blocks until the gate is idle and takes it for a build step.
    ///
    /// # Returns
    /// A permit that releases the gate when dropped.
    pub fn enter(&self) -> BuildPermit<'_> {
        let mut state = self.state.lock();
        while state.phase != GatePhase::Idle || state.pending_pauses > 0 {
            self.released.wait(&mut state);
        }

        state.phase = GatePhase::Building;
        BuildPermit(self)
    }

    /// Tries to take the gate for a snapshot.
    ///
    /// # Arguments
    /// * `retries` - How many times to wait for the gate to become idle.
    /// * `wait` - How long each wait lasts.
    ///
    /// # Returns
    /// A guard that releases the gate when dropped, or `None` if the gate never went idle.
    pub fn pause(&self, retries: usize, wait: Duration) -> Option<PauseGuard<'_>> {
        let mut state = self.state.lock();
        state.pending_pauses += 1;

        let mut attempts = 0;
        while state.phase != GatePhase::Idle {
            if attempts >= retries {
                state.pending_pauses -= 1;
                drop(state);
                self.released.notify_all();
                return None;
            }

            attempts += 1;
            self.released.wait_for(&mut state, wait);
        }

        state.pending_pauses -= 1;
        state.phase = GatePhase::Paused;
        Some(PauseGuard(self))
    }

    fn release(&self) {
        self.state.lock().phase = GatePhase::Idle;
        self.released.notify_all();
    }
}

/// Held by the build consumer while it absorbs a batch.
#[must_use]
#[derive(Debug)]
pub struct BuildPermit<'a>(&'a BuildGate);

impl Drop for BuildPermit<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Held by a reader while it captures the model.
#[must_use]
#[derive(Debug)]
pub struct PauseGuard<'a>(&'a BuildGate);

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
