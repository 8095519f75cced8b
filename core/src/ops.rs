//! # Architecture Adapters
//!
//! The core never programs hardware itself. Every register-level action
//! goes through one of three trait objects:
//!
//! - [`ClockOps`]: per clock node (gates, dividers, muxes)
//! - [`ClkdmOps`]: one per architecture generation, installed once
//! - [`PwrdmOps`]: one per architecture generation, installed once
//!
//! Every method has a default body returning [`PrcmError::Unsupported`]
//! (or a harmless no-op where the core treats absence as "always on"),
//! so an architecture implements only the capabilities it has.

use crate::clock::Clock;
use crate::clockdomain::Clockdomain;
use crate::error::{PrcmError, PrcmResult};
use crate::powerdomain::{PowerState, Powerdomain};

/// A single bit in a register, opaque to the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegBit {
    /// Register address (adapter-defined address space)
    pub reg: u32,
    /// Bit position
    pub bit: u8,
}

impl RegBit {
    /// Create a register bit reference
    pub const fn new(reg: u32, bit: u8) -> Self {
        Self { reg, bit }
    }

    /// Mask for this bit
    #[inline]
    pub const fn mask(self) -> u32 {
        1 << self.bit
    }
}

/// Where a module reports readiness after its clock is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idlest {
    /// The status bit
    pub bit: RegBit,
    /// Value of the bit that means "module ready"
    pub ready_val: bool,
}

// =============================================================================
// CLOCK OPS
// =============================================================================

/// Hardware operations of one clock node.
///
/// A clock registered without ops, or whose ops keep the default
/// `enable`/`disable`, is treated as always running: enabling it only
/// propagates to its parent and clockdomain.
pub trait ClockOps: Send + Sync {
    /// Ungate the clock
    fn enable(&self, _clk: &Clock) -> PrcmResult<()> {
        Ok(())
    }

    /// Gate the clock
    fn disable(&self, _clk: &Clock) {}

    /// Whether the clock is currently ungated in hardware
    fn is_enabled(&self, _clk: &Clock) -> PrcmResult<bool> {
        Err(PrcmError::Unsupported)
    }

    /// The companion gate (interface clock of a functional clock or the
    /// reverse) that must also be on before the module can report ready
    fn find_companion(&self, _clk: &Clock) -> Option<RegBit> {
        None
    }

    /// Whether the companion gate is currently on
    fn companion_enabled(&self, _companion: RegBit) -> bool {
        true
    }

    /// The module status bit to poll after enabling, if the module has one
    fn find_idlest(&self, _clk: &Clock) -> Option<Idlest> {
        None
    }

    /// Sample the module status bit once
    fn module_ready(&self, _idlest: &Idlest) -> bool {
        true
    }

    /// Let the hardware autoidle the clock
    fn allow_idle(&self, _clk: &Clock) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Keep the clock running regardless of activity
    fn deny_idle(&self, _clk: &Clock) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Compute the clock's rate from its parent's
    fn recalc(&self, _clk: &Clock, _parent_rate: u64) -> PrcmResult<u64> {
        Err(PrcmError::Unsupported)
    }

    /// The rate the hardware would actually produce for `rate`
    fn round_rate(&self, _clk: &Clock, _parent_rate: u64, _rate: u64) -> PrcmResult<u64> {
        Err(PrcmError::Unsupported)
    }

    /// Program `rate`; returns the rate actually set
    fn set_rate(&self, _clk: &Clock, _parent_rate: u64, _rate: u64) -> PrcmResult<u64> {
        Err(PrcmError::Unsupported)
    }

    /// Switch the clock's input to `parent`
    fn set_parent(&self, _clk: &Clock, _parent: &Clock) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }
}

// =============================================================================
// CLOCKDOMAIN OPS
// =============================================================================

/// Clockdomain hardware control for one architecture generation.
///
/// Dependency methods take the domain owning the edge first: for
/// `add_wkdep(clkdm1, clkdm2)` the hardware must wake `clkdm1` whenever
/// `clkdm2` wakes.
pub trait ClkdmOps: Send + Sync {
    /// Program a wake dependency
    fn add_wkdep(&self, _clkdm1: &Clockdomain, _clkdm2: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Remove a wake dependency
    fn del_wkdep(&self, _clkdm1: &Clockdomain, _clkdm2: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Whether a wake dependency is programmed
    fn read_wkdep(&self, _clkdm1: &Clockdomain, _clkdm2: &Clockdomain) -> PrcmResult<bool> {
        Err(PrcmError::Unsupported)
    }

    /// Remove every wake dependency of `clkdm` on `targets`
    fn clear_all_wkdeps(&self, _clkdm: &Clockdomain, _targets: &[&Clockdomain]) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Program a sleep dependency
    fn add_sleepdep(&self, _clkdm1: &Clockdomain, _clkdm2: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Remove a sleep dependency
    fn del_sleepdep(&self, _clkdm1: &Clockdomain, _clkdm2: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Whether a sleep dependency is programmed
    fn read_sleepdep(&self, _clkdm1: &Clockdomain, _clkdm2: &Clockdomain) -> PrcmResult<bool> {
        Err(PrcmError::Unsupported)
    }

    /// Remove every sleep dependency of `clkdm` on `targets`
    fn clear_all_sleepdeps(
        &self,
        _clkdm: &Clockdomain,
        _targets: &[&Clockdomain],
    ) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Force the domain to sleep
    fn clkdm_sleep(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Force the domain awake
    fn clkdm_wakeup(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Enable hardware-supervised idle
    fn clkdm_allow_idle(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Disable hardware-supervised idle
    fn clkdm_deny_idle(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// First clock or module of the domain became active
    fn clkdm_clk_enable(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Last clock or module of the domain went inactive
    fn clkdm_clk_disable(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }
}

// =============================================================================
// POWERDOMAIN OPS
// =============================================================================

/// Powerdomain hardware control for one architecture generation.
///
/// The `read_prev_*` methods report the state the domain actually entered
/// during the last low-power transition since `clear_all_prev_pwrst`.
/// Context-loss accounting compares those against the legal retention
/// masks, so an adapter must latch them exactly that way.
pub trait PwrdmOps: Send + Sync {
    /// Program the state the domain enters on its next idle
    fn set_next_pwrst(&self, _pwrdm: &Powerdomain, _pwrst: PowerState) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Read the programmed next state
    fn read_next_pwrst(&self, _pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Read the current state
    fn read_pwrst(&self, _pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Read the last state entered
    fn read_prev_pwrst(&self, _pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Program the logic state used while the domain is in retention
    fn set_logic_retst(&self, _pwrdm: &Powerdomain, _pwrst: PowerState) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Read the current logic state
    fn read_logic_pwrst(&self, _pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Read the logic state entered during the last transition
    fn read_prev_logic_pwrst(&self, _pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Read the programmed logic retention state
    fn read_logic_retst(&self, _pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Program a memory bank's state while the domain is ON
    fn set_mem_onst(&self, _pwrdm: &Powerdomain, _bank: u8, _pwrst: PowerState) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Program a memory bank's state while the domain is in retention
    fn set_mem_retst(
        &self,
        _pwrdm: &Powerdomain,
        _bank: u8,
        _pwrst: PowerState,
    ) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Read a memory bank's current state
    fn read_mem_pwrst(&self, _pwrdm: &Powerdomain, _bank: u8) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Read the state a memory bank entered during the last transition
    fn read_prev_mem_pwrst(&self, _pwrdm: &Powerdomain, _bank: u8) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Read a memory bank's programmed retention state
    fn read_mem_retst(&self, _pwrdm: &Powerdomain, _bank: u8) -> PrcmResult<PowerState> {
        Err(PrcmError::Unsupported)
    }

    /// Reset every "previous state" latch of the domain
    fn clear_all_prev_pwrst(&self, _pwrdm: &Powerdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Enable hardware save-and-restore
    fn enable_hdwr_sar(&self, _pwrdm: &Powerdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Disable hardware save-and-restore
    fn disable_hdwr_sar(&self, _pwrdm: &Powerdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Trigger a low-power state change without a domain wakeup
    fn set_lowpwrstchange(&self, _pwrdm: &Powerdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }

    /// Bounded wait until the domain is not mid-transition
    fn wait_transition(&self, _pwrdm: &Powerdomain) -> PrcmResult<()> {
        Err(PrcmError::Unsupported)
    }
}
