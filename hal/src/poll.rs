//! # Bounded Polling
//!
//! Hardware status bits ("module ready", "domain idle", "transition
//! complete") are observed by spinning on a predicate. Every wait carries
//! a fixed iteration budget; exceeding it is reported as [`PollTimeout`]
//! and the caller decides what to do with the stale state.

use core::fmt;

/// A bounded poll exhausted its iteration budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    /// Number of iterations that were attempted
    pub budget: u32,
}

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition not met after {} tries", self.budget)
    }
}

/// Spin until `ready` returns `true` or `budget` iterations have elapsed.
///
/// Returns the number of iterations it took; `Ok(0)` means the condition
/// already held on the first check.
pub fn wait_until<F>(budget: u32, mut ready: F) -> Result<u32, PollTimeout>
where
    F: FnMut() -> bool,
{
    let mut tries = 0;
    while tries < budget {
        if ready() {
            return Ok(tries);
        }
        tries += 1;
        core::hint::spin_loop();
    }

    if ready() {
        return Ok(tries);
    }

    Err(PollTimeout { budget })
}

// =============================================================================
// TESTS
// =============================================================================
