//! Clockdomain control through the CM.
//!
//! Register block of a clockdomain, at
//! `partition << 16 | cm_inst` (+ `clkdm_offs` for `CLKSTCTRL`):
//!
//! | Offset | Register      | Content                                     |
//! |--------|---------------|---------------------------------------------|
//! | 0x44   | `CM_SLEEPDEP` | one bit per source domain (`dep_bit`)       |
//! | 0x48   | `CM_CLKSTCTRL`| `CLKTRCTRL` field (`clktrctrl_mask`)        |
//! | 0xC8   | `PM_WKDEP`    | one bit per source domain (`dep_bit`)       |

use alloc::sync::Arc;

use prcm_core::{ClkdmFlags, ClkdmOps, Clockdomain, PrcmError, PrcmResult};
use prcm_hal::RegisterAccess;

/// Sleep dependency register
pub const CM_SLEEPDEP: u32 = 0x44;
/// Clock state control register
pub const CM_CLKSTCTRL: u32 = 0x48;
/// Wake dependency register
pub const PM_WKDEP: u32 = 0xC8;

/// `CLKTRCTRL` values
pub mod clktrctrl {
    /// Software supervised, never idle
    pub const NO_SLEEP: u32 = 0;
    /// Start a software-forced sleep transition
    pub const FORCE_SLEEP: u32 = 1;
    /// Start a software-forced wakeup transition
    pub const FORCE_WAKEUP: u32 = 2;
    /// Hardware supervised idle
    pub const ENABLE_AUTO: u32 = 3;
}

/// Base address of a clockdomain's CM instance
pub fn cm_base(clkdm: &Clockdomain) -> u32 {
    let hw = clkdm.hw();
    (u32::from(hw.prcm_partition) << 16) | u32::from(hw.cm_inst)
}

fn clkstctrl(clkdm: &Clockdomain) -> u32 {
    cm_base(clkdm) + u32::from(clkdm.hw().clkdm_offs) + CM_CLKSTCTRL
}

fn dep_mask(clkdm: &Clockdomain) -> u32 {
    1 << clkdm.hw().dep_bit
}

/// Clockdomain adapter over a [`RegisterAccess`]
#[derive(Debug)]
pub struct CmClkdmOps<R> {
    regs: Arc<R>,
}

impl<R: RegisterAccess> CmClkdmOps<R> {
    /// Adapter over `regs`
    pub fn new(regs: Arc<R>) -> Self {
        Self { regs }
    }

    fn write_clktrctrl(&self, clkdm: &Clockdomain, value: u32) -> PrcmResult<()> {
        let mask = clkdm.hw().clktrctrl_mask;
        if mask == 0 {
            return Err(PrcmError::Unsupported);
        }
        self.regs.write_field(clkstctrl(clkdm), mask, value);
        Ok(())
    }

    fn read_clktrctrl(&self, clkdm: &Clockdomain) -> u32 {
        self.regs
            .read_field(clkstctrl(clkdm), clkdm.hw().clktrctrl_mask)
    }

    fn clear_deps(&self, addr: u32, targets: &[&Clockdomain]) {
        let mask = targets.iter().fold(0, |m, t| m | dep_mask(t));
        self.regs.clear_bits(addr, mask);
    }
}

impl<R: RegisterAccess> ClkdmOps for CmClkdmOps<R> {
    fn add_wkdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.regs.set_bits(cm_base(clkdm1) + PM_WKDEP, dep_mask(clkdm2));
        Ok(())
    }

    fn del_wkdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.regs.clear_bits(cm_base(clkdm1) + PM_WKDEP, dep_mask(clkdm2));
        Ok(())
    }

    fn read_wkdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<bool> {
        Ok(self.regs.read(cm_base(clkdm1) + PM_WKDEP) & dep_mask(clkdm2) != 0)
    }

    fn clear_all_wkdeps(&self, clkdm: &Clockdomain, targets: &[&Clockdomain]) -> PrcmResult<()> {
        self.clear_deps(cm_base(clkdm) + PM_WKDEP, targets);
        Ok(())
    }

    fn add_sleepdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.regs
            .set_bits(cm_base(clkdm1) + CM_SLEEPDEP, dep_mask(clkdm2));
        Ok(())
    }

    fn del_sleepdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.regs
            .clear_bits(cm_base(clkdm1) + CM_SLEEPDEP, dep_mask(clkdm2));
        Ok(())
    }

    fn read_sleepdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<bool> {
        Ok(self.regs.read(cm_base(clkdm1) + CM_SLEEPDEP) & dep_mask(clkdm2) != 0)
    }

    fn clear_all_sleepdeps(
        &self,
        clkdm: &Clockdomain,
        targets: &[&Clockdomain],
    ) -> PrcmResult<()> {
        self.clear_deps(cm_base(clkdm) + CM_SLEEPDEP, targets);
        Ok(())
    }

    fn clkdm_sleep(&self, clkdm: &Clockdomain) -> PrcmResult<()> {
        self.write_clktrctrl(clkdm, clktrctrl::FORCE_SLEEP)
    }

    fn clkdm_wakeup(&self, clkdm: &Clockdomain) -> PrcmResult<()> {
        self.write_clktrctrl(clkdm, clktrctrl::FORCE_WAKEUP)
    }

    fn clkdm_allow_idle(&self, clkdm: &Clockdomain) -> PrcmResult<()> {
        self.write_clktrctrl(clkdm, clktrctrl::ENABLE_AUTO)
    }

    fn clkdm_deny_idle(&self, clkdm: &Clockdomain) -> PrcmResult<()> {
        self.write_clktrctrl(clkdm, clktrctrl::NO_SLEEP)
    }

    fn clkdm_clk_enable(&self, clkdm: &Clockdomain) -> PrcmResult<()> {
        if clkdm.hw().clktrctrl_mask == 0 {
            return Ok(());
        }
        if self.read_clktrctrl(clkdm) == clktrctrl::ENABLE_AUTO {
            // bounce through NO_SLEEP so hardware notices the new activity
            self.write_clktrctrl(clkdm, clktrctrl::NO_SLEEP)?;
            return self.write_clktrctrl(clkdm, clktrctrl::ENABLE_AUTO);
        }
        if clkdm.flags().contains(ClkdmFlags::CAN_FORCE_WAKEUP) {
            return self.write_clktrctrl(clkdm, clktrctrl::FORCE_WAKEUP);
        }
        Ok(())
    }

    fn clkdm_clk_disable(&self, clkdm: &Clockdomain) -> PrcmResult<()> {
        if clkdm.hw().clktrctrl_mask == 0 {
            return Ok(());
        }
        if self.read_clktrctrl(clkdm) == clktrctrl::ENABLE_AUTO {
            return Ok(());
        }
        if clkdm.flags().contains(ClkdmFlags::CAN_FORCE_SLEEP) {
            return self.write_clktrctrl(clkdm, clktrctrl::FORCE_SLEEP);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prcm_core::{ClkdmHw, ClockdomainDesc, PwrdmOps, Registrar, VoltagedomainDesc};
    use prcm_core::{PowerdomainDesc, Prcm};
    use prcm_hal::RegisterFile;

    struct NoPwrdm;
    impl PwrdmOps for NoPwrdm {}

    const MASK: u32 = 0x3;

    fn graph(regs: Arc<RegisterFile>) -> Prcm {
        let mut reg = Registrar::new();
        reg.register_clkdm_ops(Arc::new(CmClkdmOps::new(regs))).unwrap();
        reg.register_pwrdm_ops(Arc::new(NoPwrdm)).unwrap();
        reg.register_voltagedomains(&[VoltagedomainDesc { name: "core" }])
            .unwrap();
        reg.register_powerdomains(&[PowerdomainDesc {
            name: "per_pwrdm",
            voltdm: "core",
            ..PowerdomainDesc::DEFAULT
        }])
        .unwrap();
        reg.register_clockdomains(&[
            ClockdomainDesc {
                name: "per_clkdm",
                pwrdm: "per_pwrdm",
                flags: ClkdmFlags::CAN_HWSUP_SWSUP,
                wkdep_srcs: &["mpu_clkdm"],
                sleepdep_srcs: &["mpu_clkdm"],
                hw: ClkdmHw {
                    prcm_partition: 0,
                    cm_inst: 0x1000,
                    clkdm_offs: 0,
                    clktrctrl_mask: MASK,
                    dep_bit: 7,
                },
                ..ClockdomainDesc::DEFAULT
            },
            ClockdomainDesc {
                name: "mpu_clkdm",
                pwrdm: "per_pwrdm",
                hw: ClkdmHw {
                    cm_inst: 0x0900,
                    dep_bit: 1,
                    ..ClkdmHw::default()
                },
                ..ClockdomainDesc::DEFAULT
            },
        ])
        .unwrap();
        reg.resolve().unwrap()
    }

    #[test]
    fn test_dependency_bits() {
        let regs = Arc::new(RegisterFile::new());
        let prcm = graph(regs.clone());
        let per = prcm.lookup_clockdomain("per_clkdm").unwrap().id();
        let mpu = prcm.lookup_clockdomain("mpu_clkdm").unwrap().id();

        prcm.clkdm_add_wkdep(per, mpu).unwrap();
        prcm.clkdm_add_sleepdep(per, mpu).unwrap();
        assert_eq!(regs.peek(0x1000 + PM_WKDEP), 1 << 1);
        assert_eq!(regs.peek(0x1000 + CM_SLEEPDEP), 1 << 1);

        prcm.clkdm_clear_all_wkdeps(per).unwrap();
        assert_eq!(regs.peek(0x1000 + PM_WKDEP), 0);
        assert_eq!(prcm.clkdm_read_sleepdep(per, mpu), Ok(true));
    }

    #[test]
    fn test_clktrctrl_transitions() {
        let regs = Arc::new(RegisterFile::new());
        let prcm = graph(regs.clone());
        let per = prcm.lookup_clockdomain("per_clkdm").unwrap().id();
        let ctrl = 0x1000 + CM_CLKSTCTRL;

        prcm.clkdm_wakeup(per).unwrap();
        assert_eq!(regs.peek(ctrl), clktrctrl::FORCE_WAKEUP);
        prcm.clkdm_allow_idle(per).unwrap();
        assert_eq!(regs.peek(ctrl), clktrctrl::ENABLE_AUTO);

        // activity under hardware supervision keeps it there
        prcm.clkdm_clk_enable(per).unwrap();
        prcm.clkdm_clk_disable(per).unwrap();
        assert_eq!(regs.peek(ctrl), clktrctrl::ENABLE_AUTO);

        prcm.clkdm_deny_idle(per).unwrap();
        prcm.clkdm_clk_enable(per).unwrap();
        assert_eq!(regs.peek(ctrl), clktrctrl::FORCE_WAKEUP);
        prcm.clkdm_clk_disable(per).unwrap();
        assert_eq!(regs.peek(ctrl), clktrctrl::FORCE_SLEEP);
    }

    #[test]
    fn test_no_clktrctrl_unsupported() {
        let regs = Arc::new(RegisterFile::new());
        let ops = CmClkdmOps::new(regs);
        let prcm = graph(Arc::new(RegisterFile::new()));
        let mpu = prcm.lookup_clockdomain("mpu_clkdm").unwrap();
        assert_eq!(ops.clkdm_sleep(mpu), Err(PrcmError::Unsupported));
        assert_eq!(ops.clkdm_clk_enable(mpu), Ok(()));
    }
}
