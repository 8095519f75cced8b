//! # PRCM Core
//!
//! Clock tree, clockdomain dependency graph and powerdomain state machine
//! of a system-on-chip power, reset and clock manager.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              PRCM CORE                                   │
//! │                                                                          │
//! │   CLOCK TREE               CLOCKDOMAINS                POWERDOMAINS      │
//! │                                                                          │
//! │   osc_sys_ck               ┌────────────┐  wkdep       ┌─────────────┐   │
//! │       │                    │ core_l4    │─────────┐    │ core_pwrdm  │   │
//! │       ▼                    │  usecount  │         │    │  state      │   │
//! │    sys_ck                  └─────┬──────┘         ▼    │  counters   │   │
//! │       │                          │          ┌────────┐ └──────▲──────┘   │
//! │       ▼         clkdm            │          │  wkup  │        │          │
//! │    l4_ick ───────────────────────┘          └────────┘        │          │
//! │       │                          └──────── pwrdm ─────────────┘          │
//! │       ▼                                                                  │
//! │    uart1_fck     enable: parent first, then clockdomain, then hardware   │
//! │                                                                          │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  ClockOps (per clock)   │   ClkdmOps (per arch)   │   PwrdmOps (per arch) │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Register**: static descriptors go into a [`Registrar`] together with
//!    the architecture adapters. Duplicate names are rejected.
//! 2. **Resolve**: [`Registrar::resolve`] turns every name into a typed id
//!    and returns a fully linked [`Prcm`]. Every unresolvable reference is
//!    reported, not just the first.
//! 3. **Complete**: [`Prcm::complete_init`] programs initial hardware
//!    state (next power state ON, autodeps, init-enabled clocks).
//!
//! After resolve the shape of the graph never changes; only usecounts,
//! rates, parents and cached power states do.
//!
//! ## Locking
//!
//! Each clock, clockdomain and powerdomain owns a `spin::Mutex` around its
//! mutable state. Locks are always taken in the order
//!
//! ```text
//! clock (child) ──▶ clock (parent) ──▶ clockdomain ──▶ powerdomain
//! ```
//!
//! and never the other way round. Adapters are invoked with the owning
//! object's lock held and must not call back into the state accessors of
//! the object they were handed.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Clock tree and enable/disable engine
pub mod clock;

/// Clockdomains and their dependency graph
pub mod clockdomain;

/// Error types
pub mod error;

/// Process-wide install point
pub mod global;

/// Architecture adapter traits
pub mod ops;

/// Powerdomain state machine
pub mod powerdomain;

/// The resolved resource graph
pub mod prcm;

/// Two-phase registration and resolution
pub mod registrar;

/// Voltagedomains
pub mod voltagedomain;

#[cfg(test)]
mod mock;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use clock::{Clock, ClockDesc, ClockFlags, RateSource};
pub use clockdomain::{ClkdmFlags, ClkdmHw, Clockdomain, ClockdomainDesc, DepKind};
pub use error::{PrcmError, PrcmResult, RefKind, ResolveError, ResolveErrors};
pub use ops::{ClkdmOps, ClockOps, Idlest, PwrdmOps, RegBit};
pub use powerdomain::{
    PowerState, PowerStates, Powerdomain, PowerdomainDesc, PwrdmCounters, PwrdmFlags, PwrdmHw,
    StateSwitch,
};
pub use prcm::Prcm;
pub use registrar::Registrar;
pub use voltagedomain::{Voltagedomain, VoltagedomainDesc};

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u16);

        impl $name {
            /// Position in the owning arena
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub(crate) const fn from_index(index: usize) -> Self {
                Self(index as u16)
            }
        }
    };
}

define_id!(
    /// Stable handle of a registered clock
    ClockId
);
define_id!(
    /// Stable handle of a registered clockdomain
    ClkdmId
);
define_id!(
    /// Stable handle of a registered powerdomain
    PwrdmId
);
define_id!(
    /// Stable handle of a registered voltagedomain
    VoltdmId
);

/// Maximum number of objects of one kind a registrar accepts
pub const MAX_OBJECTS: usize = u16::MAX as usize;
