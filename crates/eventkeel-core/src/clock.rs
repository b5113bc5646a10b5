//! Time source used to stamp raised changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Abstraction over system time so that raised changes can be stamped
/// deterministically in tests and replays.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock handle shared between an aggregate root and its clones.
pub type SharedClock = Arc<dyn Clock>;

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Returns the system clock as a shared handle.
pub(crate) fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
