//! Single-shot readiness signal shared between a background read and the
//! pipeline scheduler.
//!
//! A background job calls [`ReadinessSignal::signal`] when its result is in
//! place. The scheduler polls the signal through a [`ReadinessHandle`]
//! without consuming it; the source consumes it with
//! [`ReadinessSignal::wait`] when it collects the result, which re-arms the
//! signal for the next cycle.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use futures::task::AtomicWaker;

/// A pollable, single-shot, cross-thread wake primitive.
pub trait ReadinessSignal: Send + Sync + fmt::Debug {
    /// Mark the signal as fired and wake any waiter or registered task.
    fn signal(&self);

    /// Block until the signal fires, then reset it.
    fn wait(&self);

    /// Non-consuming check.
    fn is_signalled(&self) -> bool;

    /// Register a task to be woken by the next `signal`.
    fn register_waker(&self, waker: &Waker);
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Default [`ReadinessSignal`]: a flag guarded by a mutex and condvar for
/// blocking waiters, plus an [`AtomicWaker`] for async schedulers.
#[derive(Default)]
pub struct Event {
    fired: Mutex<bool>,
    cond: Condvar,
    waker: AtomicWaker,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("fired", &self.is_signalled())
            .finish()
    }
}

impl ReadinessSignal for Event {
    fn signal(&self) {
        {
            let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
            *fired = true;
            self.cond.notify_all();
        }
        self.waker.wake();
    }

    fn wait(&self) {
        let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
        while !*fired {
            fired = self
                .cond
                .wait(fired)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *fired = false;
    }

    fn is_signalled(&self) -> bool {
        *self.fired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }
}

// ---------------------------------------------------------------------------
// ReadinessHandle
// ---------------------------------------------------------------------------

/// What the scheduler gets back from `schedule()`: a view of the signal that
/// can be polled but never consumes it.
#[derive(Debug, Clone)]
pub struct ReadinessHandle {
    signal: Arc<dyn ReadinessSignal>,
}

impl ReadinessHandle {
    pub fn new(signal: Arc<dyn ReadinessSignal>) -> Self {
        Self { signal }
    }

    pub fn is_ready(&self) -> bool {
        self.signal.is_signalled()
    }

    /// Future that resolves once the signal has fired.
    pub fn ready(&self) -> Ready<'_> {
        Ready { handle: self }
    }

    /// Block the calling thread until the signal has fired.
    pub fn wait_ready(&self) {
        futures::executor::block_on(self.ready());
    }

    /// Whether two handles observe the same signal.
    pub fn same_signal(&self, other: &ReadinessHandle) -> bool {
        Arc::ptr_eq(&self.signal, &other.signal)
    }
}

/// Future returned by [`ReadinessHandle::ready`].
#[derive(Debug)]
pub struct Ready<'a> {
    handle: &'a ReadinessHandle,
}

impl Future for Ready<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let signal = &self.handle.signal;
        if signal.is_signalled() {
            return Poll::Ready(());
        }
        signal.register_waker(cx.waker());
        // The signal may have fired between the check and the registration.
        if signal.is_signalled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
