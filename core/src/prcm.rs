//! # Resolved Resource Graph
//!
//! [`Prcm`] owns every clock, clockdomain, powerdomain and voltagedomain
//! in arenas indexed by typed ids. It is produced by
//! [`crate::Registrar::resolve`] and never changes shape afterwards;
//! only the per-object state behind each object's lock does.
//!
//! The engine operations live next to the objects they drive:
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`crate::clock`] | `clk_*`, init-time clock sweeps |
//! | [`crate::clockdomain`] | `clkdm_*` |
//! | [`crate::powerdomain`] | `pwrdm_*`, `set_pwrdm_state` |
//! | [`crate::voltagedomain`] | `voltdm_*` |

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::clock::Clock;
use crate::clockdomain::{ClkdmFlags, Clockdomain};
use crate::error::{PrcmError, PrcmResult};
use crate::ops::{ClkdmOps, PwrdmOps};
use crate::powerdomain::{PowerState, Powerdomain};
use crate::voltagedomain::Voltagedomain;
use crate::{ClkdmId, ClockId, PwrdmId, VoltdmId};

/// The linked clock / clockdomain / powerdomain graph
pub struct Prcm {
    pub(crate) clocks: Vec<Clock>,
    pub(crate) clkdms: Vec<Clockdomain>,
    pub(crate) pwrdms: Vec<Powerdomain>,
    pub(crate) voltdms: Vec<Voltagedomain>,

    pub(crate) clock_names: BTreeMap<&'static str, ClockId>,
    pub(crate) clkdm_names: BTreeMap<&'static str, ClkdmId>,
    pub(crate) pwrdm_names: BTreeMap<&'static str, PwrdmId>,
    pub(crate) voltdm_names: BTreeMap<&'static str, VoltdmId>,

    pub(crate) autodeps: Vec<ClkdmId>,

    pub(crate) clkdm_ops: Option<Arc<dyn ClkdmOps>>,
    pub(crate) pwrdm_ops: Option<Arc<dyn PwrdmOps>>,

    pub(crate) clkdm_control: AtomicBool,
    pub(crate) initialized: AtomicBool,
    /// Serializes re-parenting; taken before any clock lock
    pub(crate) reparent: Mutex<()>,
}

impl Prcm {
    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find a clock by name
    pub fn lookup_clock(&self, name: &str) -> Option<&Clock> {
        self.clock_names.get(name).and_then(|id| self.clock(*id))
    }

    /// Find a clockdomain by name
    pub fn lookup_clockdomain(&self, name: &str) -> Option<&Clockdomain> {
        self.clkdm_names.get(name).and_then(|id| self.clockdomain(*id))
    }

    /// Find a powerdomain by name
    pub fn lookup_powerdomain(&self, name: &str) -> Option<&Powerdomain> {
        self.pwrdm_names.get(name).and_then(|id| self.powerdomain(*id))
    }

    /// Find a voltagedomain by name
    pub fn lookup_voltagedomain(&self, name: &str) -> Option<&Voltagedomain> {
        self.voltdm_names.get(name).and_then(|id| self.voltagedomain(*id))
    }

    /// Clock behind `id`
    pub fn clock(&self, id: ClockId) -> Option<&Clock> {
        self.clocks.get(id.index())
    }

    /// Clockdomain behind `id`
    pub fn clockdomain(&self, id: ClkdmId) -> Option<&Clockdomain> {
        self.clkdms.get(id.index())
    }

    /// Powerdomain behind `id`
    pub fn powerdomain(&self, id: PwrdmId) -> Option<&Powerdomain> {
        self.pwrdms.get(id.index())
    }

    /// Voltagedomain behind `id`
    pub fn voltagedomain(&self, id: VoltdmId) -> Option<&Voltagedomain> {
        self.voltdms.get(id.index())
    }

    /// Registered autodep targets
    pub fn autodeps(&self) -> &[ClkdmId] {
        &self.autodeps
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Call `f` on every clock; the first error stops the walk
    pub fn for_each_clock<F>(&self, f: F) -> PrcmResult<()>
    where
        F: FnMut(&Clock) -> PrcmResult<()>,
    {
        self.clocks.iter().try_for_each(f)
    }

    /// Call `f` on every clockdomain; the first error stops the walk
    pub fn for_each_clockdomain<F>(&self, f: F) -> PrcmResult<()>
    where
        F: FnMut(&Clockdomain) -> PrcmResult<()>,
    {
        self.clkdms.iter().try_for_each(f)
    }

    /// Call `f` on every powerdomain; the first error stops the walk
    pub fn for_each_powerdomain<F>(&self, f: F) -> PrcmResult<()>
    where
        F: FnMut(&Powerdomain) -> PrcmResult<()>,
    {
        self.pwrdms.iter().try_for_each(f)
    }

    /// Call `f` on every voltagedomain; the first error stops the walk
    pub fn for_each_voltagedomain<F>(&self, f: F) -> PrcmResult<()>
    where
        F: FnMut(&Voltagedomain) -> PrcmResult<()>,
    {
        self.voltdms.iter().try_for_each(f)
    }

    /// Call `f` on every clockdomain of `pwrdm`; the first error stops the
    /// walk
    pub fn pwrdm_for_each_clkdm<F>(&self, pwrdm: PwrdmId, mut f: F) -> PrcmResult<()>
    where
        F: FnMut(&Clockdomain) -> PrcmResult<()>,
    {
        for &id in self.pd(pwrdm)?.clkdms() {
            f(self.cd(id)?)?;
        }
        Ok(())
    }

    /// Number of registered clocks
    pub fn clock_count(&self) -> usize {
        self.clocks.len()
    }

    /// Number of registered clockdomains
    pub fn clockdomain_count(&self) -> usize {
        self.clkdms.len()
    }

    /// Number of registered powerdomains
    pub fn powerdomain_count(&self) -> usize {
        self.pwrdms.len()
    }

    // =========================================================================
    // Init
    // =========================================================================

    /// Whether [`Prcm::complete_init`] has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Program the initial hardware state. Runs once.
    ///
    /// 1. every powerdomain's next state is set to ON
    /// 2. every clockdomain is forced awake, or denied hardware idle when
    ///    it cannot be forced
    /// 3. hardware dependencies are cleared and the autodeps taken
    /// 4. clocks flagged `ENABLE_ON_INIT` are enabled
    ///
    /// Every step runs for every object; the first error is returned.
    /// Capabilities the adapter lacks are skipped silently.
    pub fn complete_init(&self) -> PrcmResult<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PrcmError::AlreadyExists);
        }

        let mut first = None;
        let mut note = |res: PrcmResult<()>| match res {
            Ok(()) | Err(PrcmError::Unsupported) => {},
            Err(err) => {
                first.get_or_insert(err);
            },
        };

        for pwrdm in &self.pwrdms {
            let res = self.pwrdm_set_next_pwrst(pwrdm.id(), PowerState::On);
            if let Err(err) = res {
                log::error!("powerdomain: {}: cannot program ON: {}", pwrdm.name(), err);
            }
            note(res);
        }

        for clkdm in &self.clkdms {
            let id = clkdm.id();
            let flags = clkdm.flags();
            if flags.contains(ClkdmFlags::CAN_FORCE_WAKEUP) {
                note(self.clkdm_wakeup(id));
            } else if flags.contains(ClkdmFlags::CAN_DISABLE_AUTO) {
                note(self.clkdm_deny_idle(id));
            }

            note(self.clkdm_clear_all_wkdeps(id));
            note(self.clkdm_clear_all_sleepdeps(id));
            note(self.clkdm_add_autodeps(id));
        }

        note(self.enable_init_clocks());

        log::info!(
            "prcm: initialized {} clocks, {} clockdomains, {} powerdomains",
            self.clocks.len(),
            self.clkdms.len(),
            self.pwrdms.len()
        );
        first.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Prcm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prcm")
            .field("clocks", &self.clocks.len())
            .field("clkdms", &self.clkdms.len())
            .field("pwrdms", &self.pwrdms.len())
            .field("voltdms", &self.voltdms.len())
            .field("autodeps", &self.autodeps)
            .field("clkdm_control", &self.clkdm_control())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
