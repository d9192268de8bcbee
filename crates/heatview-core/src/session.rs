//! Process-wide session context
//!
//! The host creates one [`SessionContext`] per process and hands an `Arc` of it
//! to every tracker. The session id (`ckid`) is created lazily from the clock on
//! first use and never changes afterwards.

use crate::clock::{Clock, SystemClock};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Shared context holding the session id
pub struct SessionContext {
    id: OnceLock<String>,
    clock: Arc<dyn Clock>,
}

impl SessionContext {
    /// Create a context whose id is derived from the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a context whose id is derived from `clock` on first use
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            id: OnceLock::new(),
            clock,
        }
    }

    /// Create a context with a fixed id
    pub fn with_id(id: impl Into<String>) -> Self {
        let ctx = Self::new();
        let _ = ctx.id.set(id.into());
        ctx
    }

    /// The session id, created from the current time in milliseconds if absent
    pub fn id(&self) -> &str {
        self.id.get_or_init(|| {
            let id = self.clock.now().timestamp_millis().to_string();
            debug!(ckid = %id, "Session id created");
            id
        })
    }

    /// Returns true once the id has been materialized
    pub fn is_started(&self) -> bool {
        self.id.get().is_some()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id.get())
            .finish()
    }
}
