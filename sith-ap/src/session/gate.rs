//! Session availability gate
//!
//! A condition-guarded readiness flag. API handlers call [`AvailabilityGate::await_ready`]
//! before touching the backend session; the dispatcher flips it with
//! [`resume`](AvailabilityGate::resume) / [`suspend`](AvailabilityGate::suspend)
//! as login state changes.
//!
//! There is no timeout or per-call cancellation at this layer. A caller that
//! needs a bounded wait has to wrap the call itself. At shutdown the owner
//! [`close`](AvailabilityGate::close)s the gate, which lets every waiter through
//! for good without reporting the session as ready.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct GateState {
    ready: bool,
    closed: bool,
}

struct GateInner {
    state: Mutex<GateState>,
    cond: Condvar,
}

/// Blocking readiness gate, cheap to clone
#[derive(Clone)]
pub struct AvailabilityGate {
    inner: Arc<GateInner>,
}

impl AvailabilityGate {
    /// Create a gate in the not-ready state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    // The guarded value is two plain bools, so a poisoned lock still holds a valid state.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block the calling thread until the session is usable or the gate is closed
    ///
    /// Returns immediately when already ready.
    pub fn await_ready(&self) {
        let mut state = self.lock();
        while !state.ready && !state.closed {
            state = self
                .inner
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Async wrapper around [`await_ready`](Self::await_ready)
    ///
    /// The wait runs on tokio's blocking pool so async handlers don't stall a
    /// runtime worker thread.
    pub async fn await_ready_async(&self) {
        {
            let state = self.lock();
            if state.ready || state.closed {
                return;
            }
        }
        let gate = self.clone();
        // The closure cannot panic, so a JoinError only means runtime shutdown.
        let _ = tokio::task::spawn_blocking(move || gate.await_ready()).await;
    }

    /// Non-blocking check
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark the session unusable (idempotent)
    pub fn suspend(&self) {
        debug!("Suspending session gate");
        self.lock().ready = false;
    }

    /// Mark the session usable and release every waiter
    pub fn resume(&self) {
        debug!("Resuming session gate");
        self.lock().ready = true;
        self.inner.cond.notify_all();
    }

    /// Release every current and future waiter; readiness is left as is
    ///
    /// Callers let through by a closed gate must check for shutdown themselves.
    pub fn close(&self) {
        debug!("Closing session gate");
        self.lock().closed = true;
        self.inner.cond.notify_all();
    }
}

impl Default for AvailabilityGate {
    fn default() -> Self {
        Self::new()
    }
}
