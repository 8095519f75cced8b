//! # Reference PRCM Profile
//!
//! Register-backed adapters and the descriptor tables of a small
//! reference SoC, wired together by [`boot`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ boot(regs)                                                  │
//! │   Registrar ◀── CmClkdmOps<R>  PrmPwrdmOps<R>               │
//! │       │     ◀── soc::{VOLTDMS, PWRDMS, CLKDMS, AUTODEPS}    │
//! │       │     ◀── soc::clocks(regs)   (GateClockOps<R>)       │
//! │       ▼                                                     │
//! │   resolve() ──▶ Prcm ──▶ complete_init()                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The adapters only need a [`prcm_hal::RegisterAccess`], so the same
//! profile runs against `Mmio` on hardware and `RegisterFile` on a host.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

/// Clockdomain adapter over the clock manager registers
pub mod cm;

/// Gate clock adapter
pub mod gate;

/// Powerdomain adapter over the power and reset manager registers
pub mod prm;

/// Reference SoC descriptor tables
pub mod soc;

use alloc::sync::Arc;
use core::fmt;

use prcm_core::{Prcm, PrcmError, Registrar, ResolveErrors};
use prcm_hal::RegisterAccess;

pub use cm::CmClkdmOps;
pub use gate::GateClockOps;
pub use prm::PrmPwrdmOps;

/// Why [`boot`] failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    /// A descriptor or adapter was rejected at registration
    Register(PrcmError),
    /// Cross-references did not resolve
    Resolve(ResolveErrors),
    /// Initial hardware programming failed
    Init(PrcmError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Register(err) => write!(f, "registration failed: {}", err),
            BootError::Resolve(errs) => write!(f, "resolution failed: {}", errs),
            BootError::Init(err) => write!(f, "init failed: {}", err),
        }
    }
}

impl From<ResolveErrors> for BootError {
    fn from(errs: ResolveErrors) -> Self {
        BootError::Resolve(errs)
    }
}

/// Register the reference SoC against `regs` and resolve it
pub fn build<R>(regs: Arc<R>) -> Result<Prcm, BootError>
where
    R: RegisterAccess + 'static,
{
    let mut reg = Registrar::new();
    reg.register_clkdm_ops(Arc::new(CmClkdmOps::new(regs.clone())))
        .map_err(BootError::Register)?;
    reg.register_pwrdm_ops(Arc::new(PrmPwrdmOps::new(regs.clone())))
        .map_err(BootError::Register)?;

    reg.register_voltagedomains(soc::VOLTDMS)
        .map_err(BootError::Register)?;
    reg.register_powerdomains(soc::PWRDMS)
        .map_err(BootError::Register)?;
    reg.register_clockdomains(soc::CLKDMS)
        .map_err(BootError::Register)?;
    reg.register_autodeps(soc::AUTODEPS)
        .map_err(BootError::Register)?;
    reg.register_clocks(soc::clocks(&regs))
        .map_err(BootError::Register)?;

    Ok(reg.resolve()?)
}

/// Build the reference SoC and program its initial hardware state
pub fn boot<R>(regs: Arc<R>) -> Result<Prcm, BootError>
where
    R: RegisterAccess + 'static,
{
    let prcm = build(regs)?;
    prcm.complete_init().map_err(BootError::Init)?;
    log::info!("prcm: reference profile up: {:?}", prcm);
    Ok(prcm)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use prcm_core::{DepKind, PowerState, StateSwitch};
    use prcm_hal::RegisterFile;

    use crate::prm::{PRM_PWSTCTRL, PRM_PWSTST};

    /// Every domain reports ON, as after a cold reset
    fn powered_on() -> Arc<RegisterFile> {
        let regs = Arc::new(RegisterFile::new());
        for pd in soc::PWRDMS {
            let base = prm::prm_base(&pd.hw);
            regs.poke(base + PRM_PWSTST, prm::pwstst_all_on(pd.banks, pd.flags));
        }
        regs
    }

    #[test]
    fn test_boot_programs_next_state_on() {
        let regs = powered_on();
        let prcm = boot(regs.clone()).unwrap();

        for pd in soc::PWRDMS {
            let id = prcm.lookup_powerdomain(pd.name).unwrap().id();
            assert_eq!(prcm.pwrdm_read_next_pwrst(id), Ok(PowerState::On), "{}", pd.name);
            assert_eq!(regs.peek(prm::prm_base(&pd.hw) + PRM_PWSTCTRL) & 0x3, 0x3);
        }
    }

    #[test]
    fn test_boot_activates_autodeps() {
        let regs = powered_on();
        let prcm = boot(regs).unwrap();
        let mpu = prcm.lookup_clockdomain("mpu_clkdm").unwrap().id();

        for name in ["core_l3_clkdm", "core_l4_clkdm", "per_clkdm"] {
            let cd = prcm.lookup_clockdomain(name).unwrap().id();
            assert_eq!(prcm.clkdm_read_wkdep(cd, mpu), Ok(true), "{}", name);
            assert_eq!(prcm.clkdm_read_sleepdep(cd, mpu), Ok(true), "{}", name);
            assert_eq!(prcm.clkdm_dep_usecount(DepKind::Wake, cd, mpu), Ok(1));
        }

        // wkup opts out of autodeps
        let wkup = prcm.lookup_clockdomain("wkup_clkdm").unwrap();
        assert!(wkup.wkdep_srcs().is_empty());
    }

    #[test]
    fn test_boot_enables_init_clocks() {
        let regs = powered_on();
        let prcm = boot(regs.clone()).unwrap();

        let gpt1 = prcm.lookup_clock("gpt1_fck").unwrap();
        assert_eq!(prcm.clk_usecount(gpt1.id()), Ok(1));
        let bit = gpt1.enable_reg().unwrap();
        assert_ne!(regs.peek(bit.reg) & bit.mask(), 0);

        assert_eq!(prcm.clk_get_rate(gpt1.id()), Ok(32_768));
        let uart = prcm.lookup_clock("uart1_fck").unwrap().id();
        assert_eq!(prcm.clk_get_rate(uart), Ok(48_000_000));
    }

    #[test]
    fn test_boot_twice_on_same_prcm_rejected() {
        let prcm = build(powered_on()).unwrap();
        prcm.complete_init().unwrap();
        assert_eq!(prcm.complete_init(), Err(PrcmError::AlreadyExists));
    }

    #[test]
    fn test_uart_enable_through_registers() {
        let regs = powered_on();
        let prcm = boot(regs.clone()).unwrap();
        let uart = prcm.lookup_clock("uart1_fck").unwrap();
        let bit = uart.enable_reg().unwrap();

        prcm.clk_enable(uart.id()).unwrap();
        assert_ne!(regs.peek(bit.reg) & bit.mask(), 0);
        let core_l4 = prcm.lookup_clockdomain("core_l4_clkdm").unwrap().id();
        assert!(prcm.clkdm_usecount(core_l4).unwrap() >= 1);

        prcm.clk_disable(uart.id()).unwrap();
        assert_eq!(regs.peek(bit.reg) & bit.mask(), 0);
    }

    #[test]
    fn test_retention_cycle_through_registers() {
        let regs = powered_on();
        let prcm = boot(regs.clone()).unwrap();
        let per = soc::PWRDMS.iter().find(|pd| pd.name == "per_pwrdm").unwrap();
        let id = prcm.lookup_powerdomain("per_pwrdm").unwrap().id();
        let base = prm::prm_base(&per.hw);

        prcm.pwrdm_pre_transition(Some(id)).unwrap();
        // hardware went to retention with logic off and came back
        regs.poke(base + prm::PRM_PREPWSTST, PowerState::Retention as u32);
        prcm.pwrdm_post_transition(Some(id)).unwrap();

        let counters = prcm.pwrdm_counters(id).unwrap();
        assert_eq!(counters.state_counter[PowerState::Retention as usize], 1);
        assert_eq!(counters.ret_logic_off_counter, 1);
        assert!(prcm.pwrdm_get_context_loss_count(id).unwrap() >= 1);

        prcm.pwrdm_state_switch(id, StateSwitch::Now).unwrap();
        assert_eq!(prcm.pwrdm_cached_state(id), Ok(PowerState::On));
    }

    #[test]
    fn test_mpu_retention_keeps_memory_through_registers() {
        let regs = powered_on();
        let prcm = boot(regs.clone()).unwrap();
        let mpu = soc::PWRDMS.iter().find(|pd| pd.name == "mpu_pwrdm").unwrap();
        let id = prcm.lookup_powerdomain("mpu_pwrdm").unwrap().id();
        let base = prm::prm_base(&mpu.hw);

        // bank 0 reports through bank 1's status field
        assert_eq!(prcm.pwrdm_read_mem_pwrst(id, 0), Ok(PowerState::On));

        prcm.pwrdm_pre_transition(Some(id)).unwrap();
        assert_eq!(prcm.pwrdm_read_prev_mem_pwrst(id, 0), Ok(PowerState::On));

        // retention with logic and memory retained
        let latched = regs.peek(base + prm::PRM_PREPWSTST);
        regs.poke(
            base + prm::PRM_PREPWSTST,
            (latched & !0x3) | PowerState::Retention as u32,
        );
        prcm.pwrdm_post_transition(Some(id)).unwrap();

        let counters = prcm.pwrdm_counters(id).unwrap();
        assert_eq!(counters.state_counter[PowerState::Retention as usize], 1);
        assert_eq!(counters.ret_logic_off_counter, 0);
        assert_eq!(counters.ret_mem_off_counter[0], 0);
        assert_eq!(prcm.pwrdm_get_context_loss_count(id), Ok(0));
    }

    #[test]
    fn test_build_rejects_missing_reference() {
        let mut reg = Registrar::new();
        reg.register_clocks([prcm_core::ClockDesc::new("x").parent("y")])
            .unwrap();
        let err: BootError = reg.resolve().unwrap_err().into();
        assert!(matches!(err, BootError::Resolve(ref e) if e.len() == 1));
    }
}
