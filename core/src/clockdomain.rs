//! # Clockdomains
//!
//! A clockdomain groups clocks and modules sharing one idle/wake control
//! point. Each domain carries a closed set of directed dependency edges,
//! declared statically and resolved at init:
//!
//! ```text
//!   core_l4 ──wkdep──▶ core_l3        "wake core_l4 when core_l3 wakes"
//!   per     ──sleepdep─▶ core_l3      "per may not idle while core_l3 is active"
//! ```
//!
//! Every edge has its own usecount. Only the 0→1 and 1→0 transitions of
//! that count are programmed into hardware, so any number of balanced
//! add/del requests coalesce into at most one adapter call each way.

use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;
use spin::Mutex;

use crate::error::{PrcmError, PrcmResult};
use crate::ops::ClkdmOps;
use crate::prcm::Prcm;
use crate::{ClkdmId, PwrdmId};

// =============================================================================
// FLAGS
// =============================================================================

bitflags! {
    /// Clockdomain capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClkdmFlags: u32 {
        /// Software may force the domain to sleep
        const CAN_FORCE_SLEEP = 1 << 0;
        /// Software may force the domain awake
        const CAN_FORCE_WAKEUP = 1 << 1;
        /// Hardware-supervised idle may be enabled
        const CAN_ENABLE_AUTO = 1 << 2;
        /// Hardware-supervised idle may be disabled
        const CAN_DISABLE_AUTO = 1 << 3;
        /// Never receives autodep edges
        const NO_AUTODEPS = 1 << 4;
        /// The domain does not report idle reliably; idle control is skipped
        const MISSING_IDLE_REPORTING = 1 << 5;

        /// Force sleep and force wakeup
        const CAN_SWSUP = Self::CAN_FORCE_SLEEP.bits() | Self::CAN_FORCE_WAKEUP.bits();
        /// Enable and disable hardware-supervised idle
        const CAN_HWSUP = Self::CAN_ENABLE_AUTO.bits() | Self::CAN_DISABLE_AUTO.bits();
        /// Every idle control
        const CAN_HWSUP_SWSUP = Self::CAN_SWSUP.bits() | Self::CAN_HWSUP.bits();
    }
}

/// Which dependency list an edge lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    /// Wake dependency
    Wake,
    /// Sleep dependency
    Sleep,
}

impl DepKind {
    const fn as_str(self) -> &'static str {
        match self {
            DepKind::Wake => "wkdep",
            DepKind::Sleep => "sleepdep",
        }
    }
}

/// Register coordinates of a clockdomain, interpreted by the adapter only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClkdmHw {
    /// PRCM partition
    pub prcm_partition: u8,
    /// CM instance offset
    pub cm_inst: u16,
    /// Offset of the domain's register block inside the instance
    pub clkdm_offs: u16,
    /// CLKTRCTRL field mask
    pub clktrctrl_mask: u32,
    /// Bit of this domain in other domains' dependency registers
    pub dep_bit: u8,
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Static description of a clockdomain
#[derive(Debug, Clone, Copy)]
pub struct ClockdomainDesc {
    /// Unique name
    pub name: &'static str,
    /// Owning powerdomain name
    pub pwrdm: &'static str,
    /// Capabilities
    pub flags: ClkdmFlags,
    /// Domains that wake this one
    pub wkdep_srcs: &'static [&'static str],
    /// Domains that keep this one from idling
    pub sleepdep_srcs: &'static [&'static str],
    /// Register coordinates
    pub hw: ClkdmHw,
}

impl ClockdomainDesc {
    /// Empty descriptor, for struct-update syntax
    pub const DEFAULT: Self = Self {
        name: "",
        pwrdm: "",
        flags: ClkdmFlags::empty(),
        wkdep_srcs: &[],
        sleepdep_srcs: &[],
        hw: ClkdmHw {
            prcm_partition: 0,
            cm_inst: 0,
            clkdm_offs: 0,
            clktrctrl_mask: 0,
            dep_bit: 0,
        },
    };
}

// =============================================================================
// CLOCKDOMAIN
// =============================================================================

#[derive(Debug)]
pub(crate) struct ClkdmState {
    usecount: u32,
    hwsup: bool,
    wkdep_usecount: Vec<u32>,
    sleepdep_usecount: Vec<u32>,
}

impl ClkdmState {
    fn deps_mut(&mut self, kind: DepKind) -> &mut [u32] {
        match kind {
            DepKind::Wake => &mut self.wkdep_usecount,
            DepKind::Sleep => &mut self.sleepdep_usecount,
        }
    }

    fn deps(&self, kind: DepKind) -> &[u32] {
        match kind {
            DepKind::Wake => &self.wkdep_usecount,
            DepKind::Sleep => &self.sleepdep_usecount,
        }
    }
}

/// A registered clockdomain
pub struct Clockdomain {
    id: ClkdmId,
    name: &'static str,
    flags: ClkdmFlags,
    pwrdm: PwrdmId,
    hw: ClkdmHw,
    wkdep_srcs: Vec<ClkdmId>,
    sleepdep_srcs: Vec<ClkdmId>,
    state: Mutex<ClkdmState>,
}

impl Clockdomain {
    pub(crate) fn new(
        id: ClkdmId,
        desc: &ClockdomainDesc,
        pwrdm: PwrdmId,
        wkdep_srcs: Vec<ClkdmId>,
        sleepdep_srcs: Vec<ClkdmId>,
    ) -> Self {
        let state = ClkdmState {
            usecount: 0,
            hwsup: false,
            wkdep_usecount: alloc::vec![0; wkdep_srcs.len()],
            sleepdep_usecount: alloc::vec![0; sleepdep_srcs.len()],
        };
        Self {
            id,
            name: desc.name,
            flags: desc.flags,
            pwrdm,
            hw: desc.hw,
            wkdep_srcs,
            sleepdep_srcs,
            state: Mutex::new(state),
        }
    }

    /// Stable handle
    pub fn id(&self) -> ClkdmId {
        self.id
    }

    /// Domain name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Capabilities
    pub fn flags(&self) -> ClkdmFlags {
        self.flags
    }

    /// Owning powerdomain
    pub fn pwrdm(&self) -> PwrdmId {
        self.pwrdm
    }

    /// Register coordinates
    pub fn hw(&self) -> &ClkdmHw {
        &self.hw
    }

    /// Declared wake-dependency sources, autodeps included
    pub fn wkdep_srcs(&self) -> &[ClkdmId] {
        &self.wkdep_srcs
    }

    /// Declared sleep-dependency sources, autodeps included
    pub fn sleepdep_srcs(&self) -> &[ClkdmId] {
        &self.sleepdep_srcs
    }

    /// Edges of one kind
    pub fn deps(&self, kind: DepKind) -> &[ClkdmId] {
        match kind {
            DepKind::Wake => &self.wkdep_srcs,
            DepKind::Sleep => &self.sleepdep_srcs,
        }
    }

    /// Whether idle control is skipped for this domain
    pub fn missing_idle_reporting(&self) -> bool {
        self.flags.contains(ClkdmFlags::MISSING_IDLE_REPORTING)
    }

    fn edge(&self, kind: DepKind, target: ClkdmId) -> Option<usize> {
        self.deps(kind).iter().position(|&t| t == target)
    }
}

impl fmt::Debug for Clockdomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clockdomain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("pwrdm", &self.pwrdm)
            .field("wkdep_srcs", &self.wkdep_srcs)
            .field("sleepdep_srcs", &self.sleepdep_srcs)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DEPENDENCY GRAPH
// =============================================================================

impl Prcm {
    pub(crate) fn cd(&self, id: ClkdmId) -> PrcmResult<&Clockdomain> {
        self.clkdms.get(id.index()).ok_or(PrcmError::InvalidArgument)
    }

    pub(crate) fn clkdm_ops(&self) -> PrcmResult<&dyn ClkdmOps> {
        self.clkdm_ops.as_deref().ok_or(PrcmError::NoAdapter)
    }

    fn clkdm_add_dep(&self, kind: DepKind, id1: ClkdmId, id2: ClkdmId) -> PrcmResult<()> {
        let clkdm1 = self.cd(id1)?;
        let clkdm2 = self.cd(id2)?;
        let edge = clkdm1.edge(kind, id2).ok_or_else(|| {
            log::debug!(
                "clockdomain: {}: no {} on {} declared",
                clkdm1.name,
                kind.as_str(),
                clkdm2.name
            );
            PrcmError::NotFound
        })?;
        let ops = self.clkdm_ops()?;

        let mut state = clkdm1.state.lock();
        if state.deps(kind)[edge] == 0 {
            match kind {
                DepKind::Wake => {
                    log::debug!(
                        "clockdomain: hardware will wake up {} when {} wakes up",
                        clkdm1.name,
                        clkdm2.name
                    );
                    ops.add_wkdep(clkdm1, clkdm2)?;
                },
                DepKind::Sleep => {
                    log::debug!(
                        "clockdomain: will prevent {} from sleeping if {} is active",
                        clkdm1.name,
                        clkdm2.name
                    );
                    ops.add_sleepdep(clkdm1, clkdm2)?;
                },
            }
        }
        state.deps_mut(kind)[edge] += 1;
        Ok(())
    }

    fn clkdm_del_dep(&self, kind: DepKind, id1: ClkdmId, id2: ClkdmId) -> PrcmResult<()> {
        let clkdm1 = self.cd(id1)?;
        let clkdm2 = self.cd(id2)?;
        let edge = clkdm1.edge(kind, id2).ok_or(PrcmError::NotFound)?;
        let ops = self.clkdm_ops()?;

        let mut state = clkdm1.state.lock();
        match state.deps(kind)[edge] {
            0 => {
                log::warn!(
                    "clockdomain: {}: {} on {} released more often than taken",
                    clkdm1.name,
                    kind.as_str(),
                    clkdm2.name
                );
                return Err(PrcmError::Underflow);
            },
            1 => match kind {
                DepKind::Wake => {
                    log::debug!(
                        "clockdomain: hardware will no longer wake up {} after {} wakes up",
                        clkdm1.name,
                        clkdm2.name
                    );
                    ops.del_wkdep(clkdm1, clkdm2)?;
                },
                DepKind::Sleep => {
                    log::debug!(
                        "clockdomain: will no longer prevent {} from sleeping if {} is active",
                        clkdm1.name,
                        clkdm2.name
                    );
                    ops.del_sleepdep(clkdm1, clkdm2)?;
                },
            },
            _ => {},
        }
        state.deps_mut(kind)[edge] -= 1;
        Ok(())
    }

    fn clkdm_read_dep(&self, kind: DepKind, id1: ClkdmId, id2: ClkdmId) -> PrcmResult<bool> {
        let clkdm1 = self.cd(id1)?;
        let clkdm2 = self.cd(id2)?;
        clkdm1.edge(kind, id2).ok_or(PrcmError::NotFound)?;
        let ops = self.clkdm_ops()?;
        match kind {
            DepKind::Wake => ops.read_wkdep(clkdm1, clkdm2),
            DepKind::Sleep => ops.read_sleepdep(clkdm1, clkdm2),
        }
    }

    fn clkdm_clear_all_deps(&self, kind: DepKind, id: ClkdmId) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;
        let ops = self.clkdm_ops()?;
        let targets: Vec<&Clockdomain> = clkdm
            .deps(kind)
            .iter()
            .filter_map(|t| self.clkdms.get(t.index()))
            .collect();

        let mut state = clkdm.state.lock();
        match kind {
            DepKind::Wake => ops.clear_all_wkdeps(clkdm, &targets)?,
            DepKind::Sleep => ops.clear_all_sleepdeps(clkdm, &targets)?,
        }
        state.deps_mut(kind).iter_mut().for_each(|count| *count = 0);
        Ok(())
    }

    /// Make `clkdm1` wake whenever `clkdm2` wakes
    pub fn clkdm_add_wkdep(&self, clkdm1: ClkdmId, clkdm2: ClkdmId) -> PrcmResult<()> {
        self.clkdm_add_dep(DepKind::Wake, clkdm1, clkdm2)
    }

    /// Release one wake-dependency request
    pub fn clkdm_del_wkdep(&self, clkdm1: ClkdmId, clkdm2: ClkdmId) -> PrcmResult<()> {
        self.clkdm_del_dep(DepKind::Wake, clkdm1, clkdm2)
    }

    /// Whether the wake dependency is programmed in hardware
    pub fn clkdm_read_wkdep(&self, clkdm1: ClkdmId, clkdm2: ClkdmId) -> PrcmResult<bool> {
        self.clkdm_read_dep(DepKind::Wake, clkdm1, clkdm2)
    }

    /// Remove every wake dependency of `clkdm` and reset their usecounts
    pub fn clkdm_clear_all_wkdeps(&self, clkdm: ClkdmId) -> PrcmResult<()> {
        self.clkdm_clear_all_deps(DepKind::Wake, clkdm)
    }

    /// Keep `clkdm1` from idling while `clkdm2` is active
    pub fn clkdm_add_sleepdep(&self, clkdm1: ClkdmId, clkdm2: ClkdmId) -> PrcmResult<()> {
        self.clkdm_add_dep(DepKind::Sleep, clkdm1, clkdm2)
    }

    /// Release one sleep-dependency request
    pub fn clkdm_del_sleepdep(&self, clkdm1: ClkdmId, clkdm2: ClkdmId) -> PrcmResult<()> {
        self.clkdm_del_dep(DepKind::Sleep, clkdm1, clkdm2)
    }

    /// Whether the sleep dependency is programmed in hardware
    pub fn clkdm_read_sleepdep(&self, clkdm1: ClkdmId, clkdm2: ClkdmId) -> PrcmResult<bool> {
        self.clkdm_read_dep(DepKind::Sleep, clkdm1, clkdm2)
    }

    /// Remove every sleep dependency of `clkdm` and reset their usecounts
    pub fn clkdm_clear_all_sleepdeps(&self, clkdm: ClkdmId) -> PrcmResult<()> {
        self.clkdm_clear_all_deps(DepKind::Sleep, clkdm)
    }

    /// Usecount of one edge
    pub fn clkdm_dep_usecount(
        &self,
        kind: DepKind,
        clkdm1: ClkdmId,
        clkdm2: ClkdmId,
    ) -> PrcmResult<u32> {
        let clkdm = self.cd(clkdm1)?;
        let edge = clkdm.edge(kind, clkdm2).ok_or(PrcmError::NotFound)?;
        Ok(clkdm.state.lock().deps(kind)[edge])
    }

    // =========================================================================
    // Autodeps
    // =========================================================================

    /// Take a wake and a sleep request on every autodep target.
    ///
    /// Does nothing for [`ClkdmFlags::NO_AUTODEPS`] domains. Edge kinds the
    /// adapter cannot program are skipped.
    pub fn clkdm_add_autodeps(&self, id: ClkdmId) -> PrcmResult<()> {
        self.for_each_autodep(id, |kind, target| self.clkdm_add_dep(kind, id, target))
    }

    /// Release what [`Prcm::clkdm_add_autodeps`] took
    pub fn clkdm_del_autodeps(&self, id: ClkdmId) -> PrcmResult<()> {
        self.for_each_autodep(id, |kind, target| self.clkdm_del_dep(kind, id, target))
    }

    fn for_each_autodep<F>(&self, id: ClkdmId, mut f: F) -> PrcmResult<()>
    where
        F: FnMut(DepKind, ClkdmId) -> PrcmResult<()>,
    {
        let clkdm = self.cd(id)?;
        if clkdm.flags.contains(ClkdmFlags::NO_AUTODEPS) {
            return Ok(());
        }

        let mut first = None;
        for &target in self.autodeps.iter().filter(|&&t| t != id) {
            for kind in [DepKind::Wake, DepKind::Sleep] {
                match f(kind, target) {
                    Ok(()) | Err(PrcmError::Unsupported) => {},
                    Err(err) => {
                        log::warn!("clockdomain: {}: autodep {}: {}", clkdm.name, kind.as_str(), err);
                        first.get_or_insert(err);
                    },
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    // =========================================================================
    // Idle control
    // =========================================================================

    /// Force the domain to sleep
    pub fn clkdm_sleep(&self, id: ClkdmId) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;
        if !clkdm.flags.contains(ClkdmFlags::CAN_FORCE_SLEEP) {
            log::debug!("clockdomain: {}: cannot force sleep", clkdm.name);
            return Err(PrcmError::Unsupported);
        }
        let ops = self.clkdm_ops()?;

        let mut state = clkdm.state.lock();
        log::debug!("clockdomain: forcing {} to sleep", clkdm.name);
        ops.clkdm_sleep(clkdm)?;
        state.hwsup = false;
        self.pwrdm_reevaluate(clkdm.pwrdm);
        Ok(())
    }

    /// Force the domain awake
    pub fn clkdm_wakeup(&self, id: ClkdmId) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;
        if !clkdm.flags.contains(ClkdmFlags::CAN_FORCE_WAKEUP) {
            log::debug!("clockdomain: {}: cannot force wakeup", clkdm.name);
            return Err(PrcmError::Unsupported);
        }
        let ops = self.clkdm_ops()?;

        let mut state = clkdm.state.lock();
        log::debug!("clockdomain: forcing {} to wake up", clkdm.name);
        ops.clkdm_wakeup(clkdm)?;
        state.hwsup = false;
        self.pwrdm_reevaluate(clkdm.pwrdm);
        Ok(())
    }

    /// Hand the domain's idle control to hardware
    pub fn clkdm_allow_idle(&self, id: ClkdmId) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;
        if !clkdm.flags.contains(ClkdmFlags::CAN_ENABLE_AUTO) {
            log::debug!("clockdomain: {}: automatic idle transitions not supported", clkdm.name);
            return Err(PrcmError::Unsupported);
        }
        if clkdm.missing_idle_reporting() {
            return Ok(());
        }
        let ops = self.clkdm_ops()?;

        let mut state = clkdm.state.lock();
        log::debug!("clockdomain: enabling automatic idle transitions for {}", clkdm.name);
        ops.clkdm_allow_idle(clkdm)?;
        state.hwsup = true;
        self.pwrdm_reevaluate(clkdm.pwrdm);
        Ok(())
    }

    /// Take the domain's idle control back from hardware
    pub fn clkdm_deny_idle(&self, id: ClkdmId) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;
        if !clkdm.flags.contains(ClkdmFlags::CAN_DISABLE_AUTO) {
            log::debug!("clockdomain: {}: automatic idle transitions cannot be disabled", clkdm.name);
            return Err(PrcmError::Unsupported);
        }
        if clkdm.missing_idle_reporting() {
            return Ok(());
        }
        let ops = self.clkdm_ops()?;

        let mut state = clkdm.state.lock();
        log::debug!("clockdomain: disabling automatic idle transitions for {}", clkdm.name);
        ops.clkdm_deny_idle(clkdm)?;
        state.hwsup = false;
        self.pwrdm_reevaluate(clkdm.pwrdm);
        Ok(())
    }

    /// Whether hardware-supervised idle is enabled
    pub fn clkdm_in_hwsup(&self, id: ClkdmId) -> PrcmResult<bool> {
        Ok(self.cd(id)?.state.lock().hwsup)
    }

    /// Whether idle control is skipped for the domain
    pub fn clkdm_missing_idle_reporting(&self, id: ClkdmId) -> PrcmResult<bool> {
        Ok(self.cd(id)?.missing_idle_reporting())
    }

    /// Owning powerdomain
    pub fn clkdm_get_pwrdm(&self, id: ClkdmId) -> PrcmResult<PwrdmId> {
        Ok(self.cd(id)?.pwrdm)
    }

    /// Number of active clocks and modules in the domain
    pub fn clkdm_usecount(&self, id: ClkdmId) -> PrcmResult<u32> {
        Ok(self.cd(id)?.state.lock().usecount)
    }

    // =========================================================================
    // Activity
    // =========================================================================

    /// A clock in the domain became active
    pub fn clkdm_clk_enable(&self, id: ClkdmId) -> PrcmResult<()> {
        self.clkdm_activate(id, "clock")
    }

    /// A clock in the domain went inactive
    pub fn clkdm_clk_disable(&self, id: ClkdmId) -> PrcmResult<()> {
        self.clkdm_deactivate(id, "clock")
    }

    /// A module in the domain became active
    pub fn clkdm_hwmod_enable(&self, id: ClkdmId) -> PrcmResult<()> {
        self.clkdm_activate(id, "hwmod")
    }

    /// A module in the domain went inactive
    pub fn clkdm_hwmod_disable(&self, id: ClkdmId) -> PrcmResult<()> {
        self.clkdm_deactivate(id, "hwmod")
    }

    fn clkdm_activate(&self, id: ClkdmId, by: &str) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;
        let ops = self.clkdm_ops()?;

        let mut state = clkdm.state.lock();
        if state.usecount > 0 {
            state.usecount += 1;
            return Ok(());
        }

        ops.clkdm_clk_enable(clkdm)?;
        state.usecount = 1;
        log::debug!("clockdomain: {}: {} enabled the domain", clkdm.name, by);

        self.pwrdm_clkdm_state_switch(clkdm.pwrdm);
        Ok(())
    }

    fn clkdm_deactivate(&self, id: ClkdmId, by: &str) -> PrcmResult<()> {
        let clkdm = self.cd(id)?;

        let mut state = clkdm.state.lock();
        match state.usecount {
            0 => {
                log::warn!("clockdomain: {}: {} disable with usecount 0", clkdm.name, by);
                return Err(PrcmError::Underflow);
            },
            1 => {},
            _ => {
                state.usecount -= 1;
                return Ok(());
            },
        }

        let ops = self.clkdm_ops()?;
        // the count follows the request even when the hardware refuses
        state.usecount = 0;
        let res = ops.clkdm_clk_disable(clkdm);
        match res {
            Ok(()) => log::debug!("clockdomain: {}: {} disabled the domain", clkdm.name, by),
            Err(err) => log::warn!("clockdomain: {}: {} disable failed: {}", clkdm.name, by, err),
        }

        self.pwrdm_reevaluate(clkdm.pwrdm);
        res
    }
}

// =============================================================================
// TESTS
// =============================================================================
