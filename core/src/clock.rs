//! # Clock Tree
//!
//! Each clock node has at most one parent, an optional clockdomain and an
//! optional [`ClockOps`] adapter. Hardware is touched only on the 0→1 and
//! 1→0 edges of the usecount.
//!
//! ## Enable Order
//!
//! ```text
//! clk_enable(uart1_fck)                     clk_disable(uart1_fck)
//!   1. clk_enable(parent)                     1. ops.disable
//!   2. clkdm_clk_enable(clkdm)                2. clkdm_clk_disable(clkdm)
//!   3. ops.enable                             3. clk_disable(parent)
//!   4. poll module idlest (bounded)
//! ```
//!
//! A failure at step N unwinds steps N-1..1 before the error is returned,
//! so a failed enable leaves no partial state behind.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::Ordering;

use bitflags::bitflags;
use prcm_hal::wait_until;
use spin::Mutex;

use crate::error::{PrcmError, PrcmResult};
use crate::ops::{ClockOps, RegBit};
use crate::prcm::Prcm;
use crate::{ClkdmId, ClockId};

/// Poll budget for a module to report ready after its clock is enabled
pub const MAX_MODULE_ENABLE_WAIT: u32 = 100_000;

// =============================================================================
// FLAGS
// =============================================================================

bitflags! {
    /// Static clock properties
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClockFlags: u32 {
        /// Writing 1 to the enable bit gates the clock instead of ungating it
        const INVERT_ENABLE = 1 << 0;
        /// Enable the clock during [`Prcm::complete_init`]
        const ENABLE_ON_INIT = 1 << 1;
        /// The clock has a hardware autoidle control
        const CLOCK_IDLE_CONTROL = 1 << 2;
    }
}

/// How a clock derives its rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Fixed rate in Hz (oscillators)
    Fixed(u64),
    /// Same rate as the parent
    FollowParent,
    /// Parent rate divided by a fixed, non-zero divisor
    FixedDivisor(u32),
    /// Computed by [`ClockOps::recalc`]; the parent rate when the adapter
    /// cannot tell
    Adapter,
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Static description of a clock, with references by name
#[derive(Clone)]
pub struct ClockDesc {
    /// Unique name
    pub name: &'static str,
    /// Parent clock name; `None` for root oscillators
    pub parent: Option<&'static str>,
    /// Owning clockdomain name
    pub clkdm: Option<&'static str>,
    /// Static flags
    pub flags: ClockFlags,
    /// Enable register bit, interpreted by the adapter only
    pub enable_reg: Option<RegBit>,
    /// Rate derivation
    pub rate: RateSource,
    /// Hardware adapter; `None` makes the clock always-on
    pub ops: Option<Arc<dyn ClockOps>>,
}

impl ClockDesc {
    /// A parentless, always-on clock that follows its (absent) parent
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            clkdm: None,
            flags: ClockFlags::empty(),
            enable_reg: None,
            rate: RateSource::FollowParent,
            ops: None,
        }
    }

    /// Set the parent clock
    pub fn parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the owning clockdomain
    pub fn clkdm(mut self, clkdm: &'static str) -> Self {
        self.clkdm = Some(clkdm);
        self
    }

    /// Set the static flags
    pub fn flags(mut self, flags: ClockFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the enable register bit
    pub fn enable_reg(mut self, reg: u32, bit: u8) -> Self {
        self.enable_reg = Some(RegBit::new(reg, bit));
        self
    }

    /// Set the rate derivation
    pub fn rate(mut self, rate: RateSource) -> Self {
        self.rate = rate;
        self
    }

    /// Attach a hardware adapter
    pub fn ops(mut self, ops: Arc<dyn ClockOps>) -> Self {
        self.ops = Some(ops);
        self
    }
}

impl fmt::Debug for ClockDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockDesc")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("clkdm", &self.clkdm)
            .field("flags", &self.flags)
            .field("rate", &self.rate)
            .field("has_ops", &self.ops.is_some())
            .finish()
    }
}

// =============================================================================
// CLOCK
// =============================================================================

#[derive(Debug)]
pub(crate) struct ClockState {
    pub(crate) usecount: u32,
    pub(crate) rate: u64,
    pub(crate) parent: Option<ClockId>,
}

/// A registered clock node
pub struct Clock {
    id: ClockId,
    name: &'static str,
    flags: ClockFlags,
    enable_reg: Option<RegBit>,
    clkdm: Option<ClkdmId>,
    rate_source: RateSource,
    ops: Option<Arc<dyn ClockOps>>,
    pub(crate) state: Mutex<ClockState>,
}

impl Clock {
    pub(crate) fn new(
        id: ClockId,
        desc: ClockDesc,
        parent: Option<ClockId>,
        clkdm: Option<ClkdmId>,
    ) -> Self {
        Self {
            id,
            name: desc.name,
            flags: desc.flags,
            enable_reg: desc.enable_reg,
            clkdm,
            rate_source: desc.rate,
            ops: desc.ops,
            state: Mutex::new(ClockState {
                usecount: 0,
                rate: 0,
                parent,
            }),
        }
    }

    /// Stable handle
    pub fn id(&self) -> ClockId {
        self.id
    }

    /// Clock name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Static flags
    pub fn flags(&self) -> ClockFlags {
        self.flags
    }

    /// Enable register bit, if any
    pub fn enable_reg(&self) -> Option<RegBit> {
        self.enable_reg
    }

    /// Owning clockdomain, if any
    pub fn clkdm(&self) -> Option<ClkdmId> {
        self.clkdm
    }

    /// Rate derivation
    pub fn rate_source(&self) -> RateSource {
        self.rate_source
    }

    /// Whether a hardware adapter is attached
    pub fn has_ops(&self) -> bool {
        self.ops.is_some()
    }

    /// Compute this clock's rate for a given parent rate
    fn recalc(&self, parent_rate: u64) -> u64 {
        match self.rate_source {
            RateSource::Fixed(hz) => hz,
            RateSource::FollowParent => parent_rate,
            RateSource::FixedDivisor(div) => parent_rate / u64::from(div.max(1)),
            RateSource::Adapter => match &self.ops {
                Some(ops) => ops.recalc(self, parent_rate).unwrap_or(parent_rate),
                None => parent_rate,
            },
        }
    }

    /// Ungate in hardware and wait for the module to report ready
    fn hw_enable(&self) -> PrcmResult<()> {
        let ops = match &self.ops {
            Some(ops) => ops,
            None => return Ok(()),
        };

        ops.enable(self)?;

        let idlest = match ops.find_idlest(self) {
            Some(idlest) => idlest,
            None => return Ok(()),
        };

        // Without the companion gate the module can never report ready
        if let Some(companion) = ops.find_companion(self) {
            if !ops.companion_enabled(companion) {
                log::debug!(
                    "clock: {}: companion clock off, not waiting for module",
                    self.name
                );
                return Ok(());
            }
        }

        match wait_until(MAX_MODULE_ENABLE_WAIT, || ops.module_ready(&idlest)) {
            Ok(tries) => {
                log::debug!("clock: {}: module ready after {} tries", self.name, tries);
                Ok(())
            },
            Err(timeout) => {
                log::error!("clock: {}: module failed to enable: {}", self.name, timeout);
                ops.disable(self);
                Err(timeout.into())
            },
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("clkdm", &self.clkdm)
            .field("rate_source", &self.rate_source)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ENGINE
// =============================================================================

impl Prcm {
    pub(crate) fn clk(&self, id: ClockId) -> PrcmResult<&Clock> {
        self.clocks.get(id.index()).ok_or(PrcmError::InvalidArgument)
    }

    /// Enable a clock.
    ///
    /// On the 0→1 edge the parent is enabled first, then the clockdomain
    /// (if clockdomain control is on), then the hardware gate. Any failure
    /// unwinds what was done and leaves the usecount untouched.
    pub fn clk_enable(&self, id: ClockId) -> PrcmResult<()> {
        let clk = self.clk(id)?;
        let mut state = clk.state.lock();

        if state.usecount > 0 {
            state.usecount += 1;
            return Ok(());
        }

        if let Some(parent) = state.parent {
            if let Err(err) = self.clk_enable(parent) {
                log::error!("clock: {}: could not enable parent: {}", clk.name, err);
                return Err(err);
            }
        }

        let clkdm = clk.clkdm.filter(|_| self.clkdm_control());
        if let Some(clkdm) = clkdm {
            if let Err(err) = self.clkdm_clk_enable(clkdm) {
                log::warn!("clock: {}: could not enable clockdomain: {}", clk.name, err);
                self.unwind_parent(clk, state.parent);
                return Err(err);
            }
        }

        if let Err(err) = clk.hw_enable() {
            log::error!("clock: {}: could not enable: {}", clk.name, err);
            if let Some(clkdm) = clkdm {
                if let Err(err) = self.clkdm_clk_disable(clkdm) {
                    log::warn!("clock: {}: clockdomain unwind failed: {}", clk.name, err);
                }
            }
            self.unwind_parent(clk, state.parent);
            return Err(err);
        }

        state.usecount = 1;
        log::debug!("clock: {}: enabled", clk.name);
        Ok(())
    }

    fn unwind_parent(&self, clk: &Clock, parent: Option<ClockId>) {
        if let Some(parent) = parent {
            if let Err(err) = self.clk_disable(parent) {
                log::warn!("clock: {}: parent unwind failed: {}", clk.name, err);
            }
        }
    }

    /// Disable a clock.
    ///
    /// Disabling a clock whose usecount is already 0 changes nothing and
    /// returns [`PrcmError::Underflow`].
    pub fn clk_disable(&self, id: ClockId) -> PrcmResult<()> {
        let clk = self.clk(id)?;
        let mut state = clk.state.lock();

        if state.usecount == 0 {
            log::warn!("clock: {}: disable requested with usecount 0", clk.name);
            return Err(PrcmError::Underflow);
        }

        state.usecount -= 1;
        if state.usecount > 0 {
            return Ok(());
        }

        if let Some(ops) = &clk.ops {
            ops.disable(clk);
        }
        log::debug!("clock: {}: disabled", clk.name);

        if let Some(clkdm) = clk.clkdm.filter(|_| self.clkdm_control()) {
            if let Err(err) = self.clkdm_clk_disable(clkdm) {
                log::warn!("clock: {}: could not disable clockdomain: {}", clk.name, err);
            }
        }

        if let Some(parent) = state.parent {
            self.clk_disable(parent)?;
        }

        Ok(())
    }

    /// Current usecount
    pub fn clk_usecount(&self, id: ClockId) -> PrcmResult<u32> {
        Ok(self.clk(id)?.state.lock().usecount)
    }

    /// Cached rate in Hz
    pub fn clk_get_rate(&self, id: ClockId) -> PrcmResult<u64> {
        Ok(self.clk(id)?.state.lock().rate)
    }

    /// Current parent
    pub fn clk_get_parent(&self, id: ClockId) -> PrcmResult<Option<ClockId>> {
        Ok(self.clk(id)?.state.lock().parent)
    }

    fn parent_rate(&self, parent: Option<ClockId>) -> PrcmResult<u64> {
        match parent {
            Some(parent) => self.clk_get_rate(parent),
            None => Ok(0),
        }
    }

    /// The rate the hardware would produce if asked for `rate`
    pub fn clk_round_rate(&self, id: ClockId, rate: u64) -> PrcmResult<u64> {
        let clk = self.clk(id)?;
        let ops = clk.ops.as_ref().ok_or(PrcmError::Unsupported)?;
        let parent_rate = self.parent_rate(self.clk_get_parent(id)?)?;
        ops.round_rate(clk, parent_rate, rate)
    }

    /// Program a new rate and propagate it to every descendant.
    ///
    /// Returns the rate actually set.
    pub fn clk_set_rate(&self, id: ClockId, rate: u64) -> PrcmResult<u64> {
        let clk = self.clk(id)?;
        let ops = clk.ops.as_ref().ok_or(PrcmError::Unsupported)?;
        let parent_rate = self.parent_rate(self.clk_get_parent(id)?)?;

        let new_rate = {
            let mut state = clk.state.lock();
            let new_rate = ops.set_rate(clk, parent_rate, rate)?;
            state.rate = new_rate;
            new_rate
        };

        log::debug!("clock: {}: rate set to {} Hz", clk.name, new_rate);
        self.propagate_rate(id)?;
        Ok(new_rate)
    }

    /// Switch a clock's input.
    ///
    /// The clock must be unused ([`PrcmError::Busy`] otherwise) and
    /// `parent` must not be one of its descendants.
    pub fn clk_set_parent(&self, id: ClockId, parent: ClockId) -> PrcmResult<()> {
        let clk = self.clk(id)?;
        let new_parent = self.clk(parent)?;
        let ops = clk.ops.as_ref().ok_or(PrcmError::Unsupported)?;

        // the cycle check must see the tree the new edge lands in
        let _reparent = self.reparent.lock();
        if self.is_ancestor_or_self(id, parent)? {
            log::warn!(
                "clock: {}: {} is a descendant, refusing to re-parent",
                clk.name,
                new_parent.name
            );
            return Err(PrcmError::InvalidArgument);
        }

        {
            let mut state = clk.state.lock();
            if state.usecount > 0 {
                return Err(PrcmError::Busy);
            }
            ops.set_parent(clk, new_parent)?;
            state.parent = Some(parent);
            let parent_rate = new_parent.state.lock().rate;
            state.rate = clk.recalc(parent_rate);
        }

        log::debug!("clock: {}: parent set to {}", clk.name, new_parent.name);
        self.propagate_rate(id)
    }

    /// Whether walking up the parent chain from `start` reaches `target`
    fn is_ancestor_or_self(&self, target: ClockId, start: ClockId) -> PrcmResult<bool> {
        let mut cursor = Some(start);
        let mut steps = 0;
        while let Some(id) = cursor {
            if id == target {
                return Ok(true);
            }
            steps += 1;
            if steps > self.clocks.len() {
                return Err(PrcmError::InvalidArgument);
            }
            cursor = self.clk_get_parent(id)?;
        }
        Ok(false)
    }

    /// Recompute the rate of every descendant of `id`
    pub(crate) fn propagate_rate(&self, id: ClockId) -> PrcmResult<()> {
        let rate = self.clk_get_rate(id)?;
        let children: Vec<ClockId> = self
            .clocks
            .iter()
            .filter(|c| c.state.lock().parent == Some(id))
            .map(|c| c.id)
            .collect();

        for child in children {
            let clk = self.clk(child)?;
            {
                let mut state = clk.state.lock();
                state.rate = clk.recalc(rate);
            }
            #[cfg(feature = "debug")]
            log::trace!("clock: {}: rate now {} Hz", clk.name, self.clk_get_rate(child)?);
            self.propagate_rate(child)?;
        }
        Ok(())
    }

    /// Compute every rate from the roots down
    pub(crate) fn recalc_all_rates(&self) -> PrcmResult<()> {
        for clk in &self.clocks {
            let mut state = clk.state.lock();
            if state.parent.is_none() {
                state.rate = clk.recalc(0);
                drop(state);
                self.propagate_rate(clk.id)?;
            }
        }
        Ok(())
    }

    /// Whether clock enable/disable also drives clockdomains
    pub fn clkdm_control(&self) -> bool {
        self.clkdm_control.load(Ordering::Acquire)
    }

    /// Turn clockdomain activation from the clock engine on or off
    pub fn set_clkdm_control(&self, enable: bool) {
        self.clkdm_control.store(enable, Ordering::Release);
        log::debug!(
            "clock: clockdomain control {}",
            if enable { "enabled" } else { "disabled" }
        );
    }

    /// Enable every clock flagged [`ClockFlags::ENABLE_ON_INIT`].
    ///
    /// Every clock is attempted; the first error is returned.
    pub fn enable_init_clocks(&self) -> PrcmResult<()> {
        let mut first = None;
        for clk in self
            .clocks
            .iter()
            .filter(|c| c.flags.contains(ClockFlags::ENABLE_ON_INIT))
        {
            if let Err(err) = self.clk_enable(clk.id) {
                log::error!("clock: {}: init enable failed: {}", clk.name, err);
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Gate every clock that is on in hardware but has no users.
    ///
    /// Returns the number of clocks gated.
    pub fn disable_unused_clocks(&self) -> usize {
        let mut count = 0;
        for clk in &self.clocks {
            let ops = match &clk.ops {
                Some(ops) => ops,
                None => continue,
            };
            let state = clk.state.lock();
            if state.usecount > 0 {
                continue;
            }
            if let Ok(true) = ops.is_enabled(clk) {
                log::debug!("clock: {}: disabling unused clock", clk.name);
                ops.disable(clk);
                count += 1;
            }
        }
        count
    }

    /// Allow or deny hardware autoidle on every clock that has an
    /// autoidle control
    pub fn clk_autoidle_all(&self, allow: bool) -> PrcmResult<()> {
        let mut first = None;
        for clk in self
            .clocks
            .iter()
            .filter(|c| c.flags.contains(ClockFlags::CLOCK_IDLE_CONTROL))
        {
            let ops = match &clk.ops {
                Some(ops) => ops,
                None => continue,
            };
            let res = if allow {
                ops.allow_idle(clk)
            } else {
                ops.deny_idle(clk)
            };
            match res {
                Ok(()) | Err(PrcmError::Unsupported) => {},
                Err(err) => {
                    log::warn!("clock: {}: autoidle change failed: {}", clk.name, err);
                    first.get_or_insert(err);
                },
            }
        }
        first.map_or(Ok(()), Err)
    }
}

// =============================================================================
// TESTS
// =============================================================================
