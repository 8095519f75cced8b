//! # Registration and Resolution
//!
//! Boot-time construction of the resource graph in two phases:
//!
//! ```text
//!   Registrar::new()
//!     .register_clkdm_ops / register_pwrdm_ops      adapters, once each
//!     .register_voltagedomains                      descriptors, by name
//!     .register_powerdomains                        (needs pwrdm ops)
//!     .register_clockdomains                        (needs clkdm ops)
//!     .register_autodeps
//!     .register_clocks
//!   .resolve() ──▶ Prcm                             names → typed ids
//! ```
//!
//! Registration only checks names. Every cross-reference is resolved in
//! [`Registrar::resolve`], which reports all failures of the pass together.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::AtomicBool;

use spin::Mutex;

use crate::clock::{Clock, ClockDesc, RateSource};
use crate::clockdomain::{ClkdmFlags, Clockdomain, ClockdomainDesc};
use crate::error::{PrcmError, PrcmResult, RefKind, ResolveError, ResolveErrors};
use crate::ops::{ClkdmOps, PwrdmOps};
use crate::powerdomain::{Powerdomain, PowerdomainDesc, PWRDM_MAX_MEM_BANKS};
use crate::prcm::Prcm;
use crate::voltagedomain::{Voltagedomain, VoltagedomainDesc};
use crate::{ClkdmId, ClockId, PwrdmId, VoltdmId, MAX_OBJECTS};

/// Collects descriptors and adapters before the graph is linked
#[derive(Default)]
pub struct Registrar {
    clkdm_ops: Option<Arc<dyn ClkdmOps>>,
    pwrdm_ops: Option<Arc<dyn PwrdmOps>>,

    voltdms: Vec<VoltagedomainDesc>,
    pwrdms: Vec<PowerdomainDesc>,
    clkdms: Vec<ClockdomainDesc>,
    autodeps: Vec<&'static str>,
    clocks: Vec<ClockDesc>,

    voltdm_names: BTreeMap<&'static str, VoltdmId>,
    pwrdm_names: BTreeMap<&'static str, PwrdmId>,
    clkdm_names: BTreeMap<&'static str, ClkdmId>,
    clock_names: BTreeMap<&'static str, ClockId>,
}

/// Insert `name` into an index, rejecting duplicates and empty names
fn claim<Id: Copy>(
    names: &mut BTreeMap<&'static str, Id>,
    name: &'static str,
    kind: &str,
    make: impl FnOnce(usize) -> Id,
) -> PrcmResult<Id> {
    if name.is_empty() {
        log::warn!("prcm: {} registered without a name", kind);
        return Err(PrcmError::InvalidArgument);
    }
    if names.contains_key(name) {
        log::warn!("prcm: {} {} already registered", kind, name);
        return Err(PrcmError::AlreadyExists);
    }
    if names.len() >= MAX_OBJECTS {
        return Err(PrcmError::LimitExceeded);
    }
    let id = make(names.len());
    names.insert(name, id);
    Ok(id)
}

/// Register every item, returning the first error after trying them all
fn register_all<T>(
    items: impl IntoIterator<Item = T>,
    mut f: impl FnMut(T) -> PrcmResult<()>,
) -> PrcmResult<()> {
    let mut first = None;
    for item in items {
        if let Err(err) = f(item) {
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

impl Registrar {
    /// Empty registrar
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Adapters
    // =========================================================================

    /// Install the clockdomain adapter. Only one may ever be installed.
    pub fn register_clkdm_ops(&mut self, ops: Arc<dyn ClkdmOps>) -> PrcmResult<()> {
        if self.clkdm_ops.is_some() {
            log::warn!("prcm: clockdomain ops already registered");
            return Err(PrcmError::AlreadyExists);
        }
        self.clkdm_ops = Some(ops);
        Ok(())
    }

    /// Install the powerdomain adapter. Only one may ever be installed.
    pub fn register_pwrdm_ops(&mut self, ops: Arc<dyn PwrdmOps>) -> PrcmResult<()> {
        if self.pwrdm_ops.is_some() {
            log::warn!("prcm: powerdomain ops already registered");
            return Err(PrcmError::AlreadyExists);
        }
        self.pwrdm_ops = Some(ops);
        Ok(())
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    /// Register voltagedomains
    pub fn register_voltagedomains(&mut self, descs: &[VoltagedomainDesc]) -> PrcmResult<()> {
        register_all(descs.iter().copied(), |desc| {
            claim(&mut self.voltdm_names, desc.name, "voltagedomain", VoltdmId::from_index)?;
            log::debug!("voltagedomain: registered {}", desc.name);
            self.voltdms.push(desc);
            Ok(())
        })
    }

    /// Register powerdomains. Fails closed without a powerdomain adapter.
    pub fn register_powerdomains(&mut self, descs: &[PowerdomainDesc]) -> PrcmResult<()> {
        if self.pwrdm_ops.is_none() {
            log::error!("powerdomain: no adapter registered");
            return Err(PrcmError::NoAdapter);
        }
        register_all(descs.iter().copied(), |desc| {
            if desc.banks as usize > PWRDM_MAX_MEM_BANKS {
                log::warn!("powerdomain: {}: {} memory banks", desc.name, desc.banks);
                return Err(PrcmError::InvalidArgument);
            }
            claim(&mut self.pwrdm_names, desc.name, "powerdomain", PwrdmId::from_index)?;
            log::debug!("powerdomain: registered {}", desc.name);
            self.pwrdms.push(desc);
            Ok(())
        })
    }

    /// Register clockdomains. Fails closed without a clockdomain adapter.
    pub fn register_clockdomains(&mut self, descs: &[ClockdomainDesc]) -> PrcmResult<()> {
        if self.clkdm_ops.is_none() {
            log::error!("clockdomain: no adapter registered");
            return Err(PrcmError::NoAdapter);
        }
        register_all(descs.iter().copied(), |desc| {
            claim(&mut self.clkdm_names, desc.name, "clockdomain", ClkdmId::from_index)?;
            log::debug!("clockdomain: registered {}", desc.name);
            self.clkdms.push(desc);
            Ok(())
        })
    }

    /// Register the clockdomains every other domain depends on
    pub fn register_autodeps(&mut self, names: &[&'static str]) -> PrcmResult<()> {
        register_all(names.iter().copied(), |name| {
            if self.autodeps.contains(&name) {
                return Err(PrcmError::AlreadyExists);
            }
            self.autodeps.push(name);
            Ok(())
        })
    }

    /// Register one clock
    pub fn register_clock(&mut self, desc: ClockDesc) -> PrcmResult<()> {
        if desc.rate == RateSource::FixedDivisor(0) {
            log::warn!("clock: {}: divisor of zero", desc.name);
            return Err(PrcmError::InvalidArgument);
        }
        claim(&mut self.clock_names, desc.name, "clock", ClockId::from_index)?;
        self.clocks.push(desc);
        Ok(())
    }

    /// Register clocks
    pub fn register_clocks(&mut self, descs: impl IntoIterator<Item = ClockDesc>) -> PrcmResult<()> {
        register_all(descs, |desc| self.register_clock(desc))
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Link every name, then build the graph.
    ///
    /// Also fills the reverse lists, rejects clock parent cycles, primes
    /// every powerdomain's cached state from hardware and computes clock
    /// rates. All unresolved references are returned together.
    pub fn resolve(self) -> Result<Prcm, ResolveErrors> {
        let mut errors = ResolveErrors::new();

        let mut voltdms: Vec<Voltagedomain> = self
            .voltdms
            .iter()
            .enumerate()
            .map(|(i, desc)| Voltagedomain::new(VoltdmId::from_index(i), desc))
            .collect();

        // Powerdomains
        let mut pwrdms = Vec::with_capacity(self.pwrdms.len());
        for (i, desc) in self.pwrdms.iter().enumerate() {
            let id = PwrdmId::from_index(i);
            let voltdm = match self.voltdm_names.get(desc.voltdm) {
                Some(&voltdm) => {
                    voltdms[voltdm.index()].add_pwrdm(id);
                    voltdm
                },
                None => {
                    errors.push(ResolveError {
                        kind: PrcmError::NotFound,
                        what: RefKind::Voltagedomain,
                        owner: desc.name,
                        target: desc.voltdm,
                    });
                    // placeholder; the graph is discarded on error
                    VoltdmId::from_index(0)
                },
            };
            pwrdms.push(Powerdomain::new(id, desc, voltdm));
        }

        // Autodep targets
        let mut autodeps = Vec::with_capacity(self.autodeps.len());
        for &name in &self.autodeps {
            match self.clkdm_names.get(name) {
                Some(&id) => autodeps.push(id),
                None => errors.push(ResolveError {
                    kind: PrcmError::NotFound,
                    what: RefKind::Autodep,
                    owner: "autodeps",
                    target: name,
                }),
            }
        }

        // Clockdomains
        let mut clkdms = Vec::with_capacity(self.clkdms.len());
        for (i, desc) in self.clkdms.iter().enumerate() {
            let id = ClkdmId::from_index(i);

            let pwrdm = match self.pwrdm_names.get(desc.pwrdm) {
                Some(&pwrdm) => {
                    if pwrdms[pwrdm.index()].add_clkdm(id).is_err() {
                        errors.push(ResolveError {
                            kind: PrcmError::LimitExceeded,
                            what: RefKind::Powerdomain,
                            owner: desc.name,
                            target: desc.pwrdm,
                        });
                    }
                    pwrdm
                },
                None => {
                    errors.push(ResolveError {
                        kind: PrcmError::NotFound,
                        what: RefKind::Powerdomain,
                        owner: desc.name,
                        target: desc.pwrdm,
                    });
                    PwrdmId::from_index(0)
                },
            };

            let mut wkdeps = self.resolve_deps(desc, desc.wkdep_srcs, RefKind::WakeDep, &mut errors);
            let mut sleepdeps =
                self.resolve_deps(desc, desc.sleepdep_srcs, RefKind::SleepDep, &mut errors);

            if !desc.flags.contains(ClkdmFlags::NO_AUTODEPS) {
                for &target in autodeps.iter().filter(|&&t| t != id) {
                    if !wkdeps.contains(&target) {
                        wkdeps.push(target);
                    }
                    if !sleepdeps.contains(&target) {
                        sleepdeps.push(target);
                    }
                }
            }

            clkdms.push(Clockdomain::new(id, desc, pwrdm, wkdeps, sleepdeps));
        }

        // Clocks
        let mut parents: Vec<Option<ClockId>> = Vec::with_capacity(self.clocks.len());
        let mut clock_clkdms: Vec<Option<ClkdmId>> = Vec::with_capacity(self.clocks.len());
        for desc in &self.clocks {
            parents.push(desc.parent.and_then(|name| {
                let found = self.clock_names.get(name).copied();
                if found.is_none() {
                    errors.push(ResolveError {
                        kind: PrcmError::NotFound,
                        what: RefKind::ClockParent,
                        owner: desc.name,
                        target: name,
                    });
                }
                found
            }));
            clock_clkdms.push(desc.clkdm.and_then(|name| {
                let found = self.clkdm_names.get(name).copied();
                if found.is_none() {
                    errors.push(ResolveError {
                        kind: PrcmError::NotFound,
                        what: RefKind::ClockClkdm,
                        owner: desc.name,
                        target: name,
                    });
                }
                found
            }));
        }
        detect_parent_cycles(&self.clocks, &parents, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        let clocks = self
            .clocks
            .into_iter()
            .enumerate()
            .map(|(i, desc)| Clock::new(ClockId::from_index(i), desc, parents[i], clock_clkdms[i]))
            .collect();

        let prcm = Prcm {
            clocks,
            clkdms,
            pwrdms,
            voltdms,
            clock_names: self.clock_names,
            clkdm_names: self.clkdm_names,
            pwrdm_names: self.pwrdm_names,
            voltdm_names: self.voltdm_names,
            autodeps,
            clkdm_ops: self.clkdm_ops,
            pwrdm_ops: self.pwrdm_ops,
            clkdm_control: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            reparent: Mutex::new(()),
        };

        for pwrdm in &prcm.pwrdms {
            if let Err(err) = prcm.pwrdm_prime(pwrdm.id()) {
                log::warn!("powerdomain: {}: could not read state: {}", pwrdm.name(), err);
            }
        }
        if let Err(err) = prcm.recalc_all_rates() {
            log::warn!("clock: rate computation failed: {}", err);
        }

        log::debug!("prcm: resolved {:?}", prcm);
        Ok(prcm)
    }

    fn resolve_deps(
        &self,
        desc: &ClockdomainDesc,
        names: &[&'static str],
        what: RefKind,
        errors: &mut ResolveErrors,
    ) -> Vec<ClkdmId> {
        let mut deps = Vec::with_capacity(names.len());
        for &name in names {
            match self.clkdm_names.get(name) {
                Some(id) if deps.contains(id) => {},
                Some(&id) => deps.push(id),
                None => errors.push(ResolveError {
                    kind: PrcmError::NotFound,
                    what,
                    owner: desc.name,
                    target: name,
                }),
            }
        }
        deps
    }
}

/// Report every clock whose parent chain loops back on itself
fn detect_parent_cycles(
    descs: &[ClockDesc],
    parents: &[Option<ClockId>],
    errors: &mut ResolveErrors,
) {
    for (i, desc) in descs.iter().enumerate() {
        let mut cursor = parents[i];
        let mut steps = 0;
        while let Some(parent) = cursor {
            if parent.index() == i || steps > parents.len() {
                errors.push(ResolveError {
                    kind: PrcmError::InvalidArgument,
                    what: RefKind::ClockParent,
                    owner: desc.name,
                    target: desc.parent.unwrap_or(""),
                });
                break;
            }
            steps += 1;
            cursor = parents[parent.index()];
        }
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("has_clkdm_ops", &self.clkdm_ops.is_some())
            .field("has_pwrdm_ops", &self.pwrdm_ops.is_some())
            .field("voltdms", &self.voltdms.len())
            .field("pwrdms", &self.pwrdms.len())
            .field("clkdms", &self.clkdms.len())
            .field("autodeps", &self.autodeps)
            .field("clocks", &self.clocks.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{registrar_with_mocks, MockClkdmOps, MockPwrdmOps};
    use crate::powerdomain::{PowerState, PowerStates};

    const VOLTDMS: &[VoltagedomainDesc] = &[VoltagedomainDesc { name: "core" }];

    const PWRDMS: &[PowerdomainDesc] = &[PowerdomainDesc {
        name: "core_pwrdm",
        voltdm: "core",
        pwrsts: PowerStates::OFF_RET_ON,
        ..PowerdomainDesc::DEFAULT
    }];

    #[test]
    fn test_adapters_register_once() {
        let mut reg = Registrar::new();
        reg.register_clkdm_ops(Arc::new(MockClkdmOps::new())).unwrap();
        assert_eq!(
            reg.register_clkdm_ops(Arc::new(MockClkdmOps::new())),
            Err(PrcmError::AlreadyExists)
        );
        reg.register_pwrdm_ops(Arc::new(MockPwrdmOps::new())).unwrap();
        assert_eq!(
            reg.register_pwrdm_ops(Arc::new(MockPwrdmOps::new())),
            Err(PrcmError::AlreadyExists)
        );
    }

    #[test]
    fn test_domains_need_adapter() {
        let mut reg = Registrar::new();
        reg.register_voltagedomains(VOLTDMS).unwrap();
        assert_eq!(reg.register_powerdomains(PWRDMS), Err(PrcmError::NoAdapter));
        assert_eq!(
            reg.register_clockdomains(&[ClockdomainDesc {
                name: "x",
                pwrdm: "core_pwrdm",
                ..ClockdomainDesc::DEFAULT
            }]),
            Err(PrcmError::NoAdapter)
        );
    }

    #[test]
    fn test_duplicates_rejected() {
        let (mut reg, _, _) = registrar_with_mocks();
        reg.register_voltagedomains(VOLTDMS).unwrap();
        reg.register_powerdomains(PWRDMS).unwrap();

        // the bulk call keeps going past the duplicate
        let res = reg.register_powerdomains(&[
            PWRDMS[0],
            PowerdomainDesc {
                name: "per_pwrdm",
                voltdm: "core",
                ..PowerdomainDesc::DEFAULT
            },
        ]);
        assert_eq!(res, Err(PrcmError::AlreadyExists));

        reg.register_clock(ClockDesc::new("osc")).unwrap();
        assert_eq!(
            reg.register_clock(ClockDesc::new("osc")),
            Err(PrcmError::AlreadyExists)
        );

        let prcm = reg.resolve().unwrap();
        assert!(prcm.lookup_powerdomain("per_pwrdm").is_some());
        assert_eq!(prcm.powerdomain_count(), 2);
    }

    #[test]
    fn test_bad_descriptors_rejected() {
        let (mut reg, _, _) = registrar_with_mocks();
        assert_eq!(reg.register_autodeps(&["a", "a"]), Err(PrcmError::AlreadyExists));
        assert_eq!(
            reg.register_clock(ClockDesc::new("x").rate(RateSource::FixedDivisor(0))),
            Err(PrcmError::InvalidArgument)
        );
        assert_eq!(
            reg.register_clock(ClockDesc::new("")),
            Err(PrcmError::InvalidArgument)
        );
        assert_eq!(
            reg.register_powerdomains(&[PowerdomainDesc {
                name: "big",
                banks: 6,
                ..PowerdomainDesc::DEFAULT
            }]),
            Err(PrcmError::InvalidArgument)
        );
    }

    #[test]
    fn test_resolve_reports_every_error() {
        let (mut reg, _, _) = registrar_with_mocks();
        reg.register_voltagedomains(VOLTDMS).unwrap();
        reg.register_powerdomains(&[
            PWRDMS[0],
            PowerdomainDesc {
                name: "lost_pwrdm",
                voltdm: "nowhere",
                ..PowerdomainDesc::DEFAULT
            },
        ])
        .unwrap();
        reg.register_clockdomains(&[
            ClockdomainDesc {
                name: "a_clkdm",
                pwrdm: "core_pwrdm",
                wkdep_srcs: &["ghost_clkdm", "b_clkdm"],
                sleepdep_srcs: &["phantom_clkdm"],
                ..ClockdomainDesc::DEFAULT
            },
            ClockdomainDesc {
                name: "b_clkdm",
                pwrdm: "missing_pwrdm",
                ..ClockdomainDesc::DEFAULT
            },
        ])
        .unwrap();
        reg.register_autodeps(&["wkup_clkdm"]).unwrap();
        reg.register_clocks([
            ClockDesc::new("osc"),
            ClockDesc::new("ck").parent("nope").clkdm("void_clkdm"),
        ])
        .unwrap();

        let errors = reg.resolve().unwrap_err();
        assert_eq!(errors.len(), 7);
        assert_eq!(errors.for_owner("a_clkdm").count(), 2);
        assert_eq!(errors.for_owner("ck").count(), 2);
        assert!(errors
            .iter()
            .any(|e| e.what == RefKind::Voltagedomain && e.target == "nowhere"));
        assert!(errors
            .iter()
            .any(|e| e.what == RefKind::Autodep && e.target == "wkup_clkdm"));
        assert!(errors
            .iter()
            .all(|e| e.kind == PrcmError::NotFound));
    }

    #[test]
    fn test_parent_cycle_detected() {
        let mut reg = Registrar::new();
        reg.register_clocks([
            ClockDesc::new("a").parent("c"),
            ClockDesc::new("b").parent("a"),
            ClockDesc::new("c").parent("b"),
            ClockDesc::new("root"),
        ])
        .unwrap();

        let errors = reg.resolve().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.kind == PrcmError::InvalidArgument));
    }

    #[test]
    fn test_reverse_list_limit() {
        const NAMES: [&str; 21] = [
            "c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9", "c10", "c11", "c12",
            "c13", "c14", "c15", "c16", "c17", "c18", "c19", "c20",
        ];
        let (mut reg, _, _) = registrar_with_mocks();
        reg.register_voltagedomains(VOLTDMS).unwrap();
        reg.register_powerdomains(PWRDMS).unwrap();
        let descs: Vec<ClockdomainDesc> = NAMES
            .iter()
            .map(|&name| ClockdomainDesc {
                name,
                pwrdm: "core_pwrdm",
                ..ClockdomainDesc::DEFAULT
            })
            .collect();
        reg.register_clockdomains(&descs).unwrap();

        let errors = reg.resolve().unwrap_err();
        assert_eq!(errors.len(), 1);
        let err = errors.iter().next().unwrap();
        assert_eq!(err.kind, PrcmError::LimitExceeded);
        assert_eq!(err.owner, "c20");
    }

    #[test]
    fn test_resolve_primes_powerdomain_state() {
        let (mut reg, _, pwrdm_ops) = registrar_with_mocks();
        pwrdm_ops.update("core_pwrdm", |hw| hw.cur = PowerState::Retention);
        reg.register_voltagedomains(VOLTDMS).unwrap();
        reg.register_powerdomains(PWRDMS).unwrap();

        let prcm = reg.resolve().unwrap();
        let core = prcm.lookup_powerdomain("core_pwrdm").unwrap().id();
        let counters = prcm.pwrdm_counters(core).unwrap();
        assert_eq!(counters.state, PowerState::Retention);
        assert_eq!(counters.state_counter, [0, 1, 0, 0]);
        assert_eq!(pwrdm_ops.calls("wait_transition"), 1);
    }

    #[test]
    fn test_empty_registrar_resolves() {
        let prcm = Registrar::new().resolve().unwrap();
        assert_eq!(prcm.clock_count(), 0);
        assert!(!prcm.is_initialized());
    }
}
