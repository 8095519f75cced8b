//! # PRCM Hardware Abstraction Layer
//!
//! The register-level collaborators of the PRCM framework. Nothing in the
//! clock / clockdomain / powerdomain core touches a register directly; the
//! per-architecture adapters do, through the [`RegisterAccess`] trait
//! defined here.
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         prcm-core                                │
//! │   clock engine ── clockdomain graph ── powerdomain state machine │
//! └──────────────┬────────────────────┬──────────────────────────────┘
//!                │ ClockOps           │ ClkdmOps / PwrdmOps
//!                ▼                    ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  architecture adapters (profiles)                │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ RegisterAccess + poll::wait_until
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │          prcm-hal:  Mmio (volatile)  │  RegisterFile (memory)    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Suspension points
//!
//! The only place the framework ever waits is [`poll::wait_until`]: a
//! bounded spin on a hardware status predicate with a fixed iteration
//! budget. There is no unbounded blocking and no yielding.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod poll;
pub mod regs;

pub use poll::{wait_until, PollTimeout};
pub use regs::{Mmio, RegisterAccess, RegisterFile};
