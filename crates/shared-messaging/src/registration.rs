//! # Registration Handles
//!
//! A registration represents something installed (an interceptor, a handler,
//! a subscription). Cancelling it uninstalls the thing exactly once.

use parking_lot::Mutex;
use std::fmt;

/// Cancellable handle for an installed component.
///
/// `cancel` is idempotent: the first call that actually uninstalls returns
/// `true`, every later call is a no-op returning `false`.
pub trait Registration: Send + Sync {
    fn cancel(&self) -> bool;
}

type CancelAction = Box<dyn FnOnce() -> bool + Send>;

/// Registration running a closure on the first `cancel`.
pub struct FnRegistration {
    action: Mutex<Option<CancelAction>>,
}

impl FnRegistration {
    pub fn new(action: impl FnOnce() -> bool + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Whether `cancel` has already run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl Registration for FnRegistration {
    fn cancel(&self) -> bool {
        // take under the lock, run outside it
        let action = self.action.lock().take();
        action.is_some_and(|action| action())
    }
}

impl fmt::Debug for FnRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRegistration")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
