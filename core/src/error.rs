//! # Error Types
//!
//! Nothing in the PRCM core ends the process. The worst outcome of any
//! operation is a stale cached state plus an error handed back to the
//! power-management policy that called it.
//!
//! | Kind | Raised by | State touched |
//! |------|-----------|---------------|
//! | `InvalidArgument` | foreign id, illegal power state, bad bank | none |
//! | `AlreadyExists` | duplicate name, second adapter, second install | none |
//! | `NotFound` | name lookup, undeclared dependency edge | none |
//! | `Unsupported` | capability flag or adapter method missing | none |
//! | `Timeout` | bounded hardware poll exhausted | cached state left stale |
//! | `Underflow` | disable / del with usecount already 0 | none (warned) |
//! | `Busy` | re-parenting a clock that is in use | none |
//! | `NoAdapter` | registering domains before the adapter | none |
//! | `LimitExceeded` | bounded reverse list full | none |

use alloc::vec::Vec;
use core::fmt;

use prcm_hal::PollTimeout;

// =============================================================================
// PRCM ERROR
// =============================================================================

/// PRCM operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrcmError {
    /// Absent or foreign reference, or a value outside the legal set
    InvalidArgument,
    /// Name already registered, or a one-shot resource already installed
    AlreadyExists,
    /// Lookup failed, or a dependency edge was never declared
    NotFound,
    /// The object's capability flags or the adapter do not permit this
    Unsupported,
    /// A bounded hardware poll ran out of iterations
    Timeout,
    /// Release without a matching acquire
    Underflow,
    /// The object is in use and cannot be reconfigured
    Busy,
    /// The architecture adapter has not been registered
    NoAdapter,
    /// A bounded table is full
    LimitExceeded,
}

impl PrcmError {
    /// Short name, as used in log lines
    pub const fn as_str(self) -> &'static str {
        match self {
            PrcmError::InvalidArgument => "invalid argument",
            PrcmError::AlreadyExists => "already exists",
            PrcmError::NotFound => "not found",
            PrcmError::Unsupported => "unsupported",
            PrcmError::Timeout => "timed out",
            PrcmError::Underflow => "usecount underflow",
            PrcmError::Busy => "busy",
            PrcmError::NoAdapter => "no adapter registered",
            PrcmError::LimitExceeded => "limit exceeded",
        }
    }

    /// Whether a caller may reasonably retry the same request later
    pub const fn is_recoverable(self) -> bool {
        matches!(self, PrcmError::Timeout | PrcmError::Busy)
    }

    /// Whether the error indicates a bug in the caller rather than a
    /// hardware or configuration condition
    pub const fn is_programming_error(self) -> bool {
        matches!(self, PrcmError::Underflow | PrcmError::InvalidArgument)
    }
}

impl fmt::Display for PrcmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PollTimeout> for PrcmError {
    fn from(_: PollTimeout) -> Self {
        PrcmError::Timeout
    }
}

/// Result type for PRCM operations
pub type PrcmResult<T> = Result<T, PrcmError>;

// =============================================================================
// RESOLVE ERRORS
// =============================================================================

/// Which kind of by-name reference failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Powerdomain → voltagedomain
    Voltagedomain,
    /// Clockdomain → powerdomain
    Powerdomain,
    /// Clockdomain wake dependency edge
    WakeDep,
    /// Clockdomain sleep dependency edge
    SleepDep,
    /// Autodep table entry
    Autodep,
    /// Clock → parent clock
    ClockParent,
    /// Clock → clockdomain
    ClockClkdm,
    /// Architecture adapter
    Adapter,
}

impl RefKind {
    const fn describe(self) -> &'static str {
        match self {
            RefKind::Voltagedomain => "voltagedomain",
            RefKind::Powerdomain => "powerdomain",
            RefKind::WakeDep => "wake dependency",
            RefKind::SleepDep => "sleep dependency",
            RefKind::Autodep => "autodep",
            RefKind::ClockParent => "parent clock",
            RefKind::ClockClkdm => "clockdomain",
            RefKind::Adapter => "adapter",
        }
    }
}

/// One failed reference found during [`crate::Registrar::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveError {
    /// Error classification
    pub kind: PrcmError,
    /// What kind of reference failed
    pub what: RefKind,
    /// Object holding the reference
    pub owner: &'static str,
    /// Name that could not be resolved
    pub target: &'static str,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {}: {}",
            self.owner,
            self.what.describe(),
            self.target,
            self.kind
        )
    }
}

/// Every failure of one resolve pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveErrors(Vec<ResolveError>);

impl ResolveErrors {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, err: ResolveError) {
        log::error!("prcm: {}", err);
        self.0.push(err);
    }

    /// Number of failures
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pass was clean
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the failures in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &ResolveError> {
        self.0.iter()
    }

    /// Failures held by `owner`
    pub fn for_owner<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a ResolveError> {
        self.0.iter().filter(move |e| e.owner == owner)
    }
}

impl fmt::Display for ResolveErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unresolved reference(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  {}", err)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
