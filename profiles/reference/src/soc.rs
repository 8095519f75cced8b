//! Descriptor tables of the reference SoC.
//!
//! ```text
//! voltdm     pwrdm        clkdm                         autodep
//! ───────    ──────────   ────────────────────────────  ───────
//! wakeup     wkup_pwrdm   wkup_clkdm (NO_AUTODEPS)
//! core       core_pwrdm   core_l3_clkdm, core_l4_clkdm
//! core       per_pwrdm    per_clkdm
//! mpu_iva    mpu_pwrdm    mpu_clkdm                      ◀── all
//! ```

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use prcm_core::{
    ClkdmFlags, ClkdmHw, ClockDesc, ClockFlags, ClockdomainDesc, PowerStates, PowerdomainDesc,
    PwrdmFlags, PwrdmHw, RateSource, RegBit, VoltagedomainDesc,
};
use prcm_hal::RegisterAccess;

use crate::gate::GateClockOps;

// =============================================================================
// REGISTER MAP
// =============================================================================

/// PRM partition
pub const PRM_PARTITION: u8 = 1;

/// CM instance of the wakeup domain
pub const CM_WKUP_INST: u16 = 0x0c00;
/// CM instance of the core domains
pub const CM_CORE_INST: u16 = 0x0a00;
/// CM instance of the peripheral domain
pub const CM_PER_INST: u16 = 0x1000;
/// CM instance of the MPU domain
pub const CM_MPU_INST: u16 = 0x0900;

/// Functional clock enables, relative to a CM instance
pub const CM_FCLKEN: u32 = 0x00;
/// Interface clock enables
pub const CM_ICLKEN: u32 = 0x10;
/// Module idle status
pub const CM_IDLEST: u32 = 0x20;
/// Interface clock autoidle
pub const CM_AUTOIDLE: u32 = 0x30;

const fn cm(inst: u16, offs: u32) -> u32 {
    inst as u32 + offs
}

// =============================================================================
// DOMAINS
// =============================================================================

/// Voltage rails
pub const VOLTDMS: &[VoltagedomainDesc] = &[
    VoltagedomainDesc { name: "wakeup" },
    VoltagedomainDesc { name: "core" },
    VoltagedomainDesc { name: "mpu_iva" },
];

/// Powerdomains
pub const PWRDMS: &[PowerdomainDesc] = &[
    PowerdomainDesc {
        name: "wkup_pwrdm",
        voltdm: "wakeup",
        hw: PwrdmHw {
            prcm_partition: PRM_PARTITION,
            prcm_offs: 0x0c00,
        },
        ..PowerdomainDesc::DEFAULT
    },
    PowerdomainDesc {
        name: "core_pwrdm",
        voltdm: "core",
        pwrsts: PowerStates::OFF_RET_ON,
        pwrsts_logic_ret: PowerStates::OFF_RET,
        banks: 2,
        pwrsts_mem_ret: [PowerStates::OFF_RET; 5],
        pwrsts_mem_on: [PowerStates::ON; 5],
        flags: PwrdmFlags::HAS_LOWPOWERSTATECHANGE,
        hw: PwrdmHw {
            prcm_partition: PRM_PARTITION,
            prcm_offs: 0x0a00,
        },
    },
    PowerdomainDesc {
        name: "per_pwrdm",
        voltdm: "core",
        pwrsts: PowerStates::OFF_RET_ON,
        pwrsts_logic_ret: PowerStates::OFF_RET,
        flags: PwrdmFlags::HAS_HDWR_SAR,
        hw: PwrdmHw {
            prcm_partition: PRM_PARTITION,
            prcm_offs: 0x1000,
        },
        ..PowerdomainDesc::DEFAULT
    },
    PowerdomainDesc {
        name: "mpu_pwrdm",
        voltdm: "mpu_iva",
        pwrsts: PowerStates::OFF_RET_ON,
        pwrsts_logic_ret: PowerStates::OFF_RET,
        banks: 1,
        pwrsts_mem_ret: [PowerStates::OFF_RET; 5],
        pwrsts_mem_on: [PowerStates::ON; 5],
        flags: PwrdmFlags::HAS_MPU_QUIRK,
        hw: PwrdmHw {
            prcm_partition: PRM_PARTITION,
            prcm_offs: 0x0900,
        },
    },
];

/// Clockdomains
pub const CLKDMS: &[ClockdomainDesc] = &[
    ClockdomainDesc {
        name: "wkup_clkdm",
        pwrdm: "wkup_pwrdm",
        flags: ClkdmFlags::NO_AUTODEPS,
        hw: ClkdmHw {
            prcm_partition: 0,
            cm_inst: CM_WKUP_INST,
            clkdm_offs: 0,
            clktrctrl_mask: 0,
            dep_bit: 4,
        },
        ..ClockdomainDesc::DEFAULT
    },
    ClockdomainDesc {
        name: "core_l3_clkdm",
        pwrdm: "core_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP,
        wkdep_srcs: &["wkup_clkdm"],
        hw: ClkdmHw {
            prcm_partition: 0,
            cm_inst: CM_CORE_INST,
            clkdm_offs: 0,
            clktrctrl_mask: 0x3,
            dep_bit: 0,
        },
        ..ClockdomainDesc::DEFAULT
    },
    ClockdomainDesc {
        name: "core_l4_clkdm",
        pwrdm: "core_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP,
        wkdep_srcs: &["wkup_clkdm"],
        hw: ClkdmHw {
            prcm_partition: 0,
            cm_inst: CM_CORE_INST,
            clkdm_offs: 0,
            clktrctrl_mask: 0xc,
            dep_bit: 3,
        },
        ..ClockdomainDesc::DEFAULT
    },
    ClockdomainDesc {
        name: "per_clkdm",
        pwrdm: "per_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP_SWSUP,
        wkdep_srcs: &["core_l4_clkdm", "wkup_clkdm"],
        sleepdep_srcs: &["core_l3_clkdm"],
        hw: ClkdmHw {
            prcm_partition: 0,
            cm_inst: CM_PER_INST,
            clkdm_offs: 0,
            clktrctrl_mask: 0x3,
            dep_bit: 7,
        },
    },
    ClockdomainDesc {
        name: "mpu_clkdm",
        pwrdm: "mpu_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP.union(ClkdmFlags::CAN_FORCE_WAKEUP),
        wkdep_srcs: &["per_clkdm"],
        hw: ClkdmHw {
            prcm_partition: 0,
            cm_inst: CM_MPU_INST,
            clkdm_offs: 0,
            clktrctrl_mask: 0x3,
            dep_bit: 1,
        },
        ..ClockdomainDesc::DEFAULT
    },
];

/// Every other clockdomain depends on these
pub const AUTODEPS: &[&str] = &["mpu_clkdm"];

// =============================================================================
// CLOCKS
// =============================================================================

/// The clock tree, with gate adapters bound to `regs`
pub fn clocks<R>(regs: &Arc<R>) -> Vec<ClockDesc>
where
    R: RegisterAccess + 'static,
{
    let gate = || GateClockOps::new(regs.clone());

    vec![
        // Roots
        ClockDesc::new("osc_sys_ck").rate(RateSource::Fixed(26_000_000)),
        ClockDesc::new("sys_32k_ck").rate(RateSource::Fixed(32_768)),
        ClockDesc::new("dpll1_ck").rate(RateSource::Fixed(600_000_000)),
        ClockDesc::new("dpll3_m2_ck").rate(RateSource::Fixed(200_000_000)),
        ClockDesc::new("dpll4_m2_ck").rate(RateSource::Fixed(96_000_000)),
        // Dividers
        ClockDesc::new("sys_ck")
            .parent("osc_sys_ck")
            .rate(RateSource::FixedDivisor(2)),
        ClockDesc::new("func_48m_ck")
            .parent("dpll4_m2_ck")
            .rate(RateSource::FixedDivisor(2)),
        ClockDesc::new("l3_ick")
            .parent("dpll3_m2_ck")
            .clkdm("core_l3_clkdm")
            .rate(RateSource::FixedDivisor(2)),
        ClockDesc::new("l4_ick")
            .parent("l3_ick")
            .clkdm("core_l4_clkdm")
            .rate(RateSource::FixedDivisor(2)),
        ClockDesc::new("mpu_ck")
            .parent("dpll1_ck")
            .clkdm("mpu_clkdm"),
        // Gates
        ClockDesc::new("gpt1_fck")
            .parent("sys_32k_ck")
            .clkdm("wkup_clkdm")
            .flags(ClockFlags::ENABLE_ON_INIT)
            .enable_reg(cm(CM_WKUP_INST, CM_FCLKEN), 0)
            .ops(Arc::new(gate())),
        ClockDesc::new("uart1_ick")
            .parent("l4_ick")
            .clkdm("core_l4_clkdm")
            .flags(ClockFlags::CLOCK_IDLE_CONTROL)
            .enable_reg(cm(CM_CORE_INST, CM_ICLKEN), 13)
            .ops(Arc::new(
                gate().autoidle(RegBit::new(cm(CM_CORE_INST, CM_AUTOIDLE), 13)),
            )),
        ClockDesc::new("uart1_fck")
            .parent("func_48m_ck")
            .clkdm("core_l4_clkdm")
            .enable_reg(cm(CM_CORE_INST, CM_FCLKEN), 13)
            .ops(Arc::new(
                gate()
                    .idlest(RegBit::new(cm(CM_CORE_INST, CM_IDLEST), 13), false)
                    .companion(RegBit::new(cm(CM_CORE_INST, CM_ICLKEN), 13)),
            )),
        ClockDesc::new("gpio2_ick")
            .parent("l4_ick")
            .clkdm("per_clkdm")
            .enable_reg(cm(CM_PER_INST, CM_ICLKEN), 13)
            .ops(Arc::new(gate())),
        ClockDesc::new("gpio2_dbck")
            .parent("sys_32k_ck")
            .clkdm("per_clkdm")
            .enable_reg(cm(CM_PER_INST, CM_FCLKEN), 13)
            .ops(Arc::new(
                gate().idlest(RegBit::new(cm(CM_PER_INST, CM_IDLEST), 13), false),
            )),
    ]
}
