//! Powerdomain control through the PRM.
//!
//! Each powerdomain owns a block of three registers at
//! `partition << 16 | prcm_offs`:
//!
//! ```text
//! PWSTCTRL  (0xE0)  [1:0] POWERSTATE   [2] LOGICRETSTATE  [4] LOWPOWERSTATECHANGE
//!                   [5] SAVEANDRESTORE [8+b] MEMbRETSTATE [17:16+2b] MEMbONSTATE
//! PWSTST    (0xE4)  [1:0] POWERSTATEST [2] LOGICSTATEST   [5:4+2b] MEMbSTATEST
//!                   [20] INTRANSITION
//! PREPWSTST (0xE8)  [1:0] LASTPOWERSTATEENTERED [2] LASTLOGICSTATEENTERED
//!                   [5:4+2b] LASTMEMbSTATEENTERED
//! ```
//!
//! Power state fields use the [`PowerState`] encoding. Single-bit logic
//! and memory retention fields read 0 as OFF and 1 as RET; `LOGICSTATEST`
//! reads 1 as ON.

use alloc::sync::Arc;

use prcm_core::{
    PowerState, Powerdomain, PrcmError, PrcmResult, PwrdmFlags, PwrdmHw, PwrdmOps,
};
use prcm_hal::{wait_until, RegisterAccess};

/// Power state control
pub const PRM_PWSTCTRL: u32 = 0xE0;
/// Power state status
pub const PRM_PWSTST: u32 = 0xE4;
/// Previous power state status
pub const PRM_PREPWSTST: u32 = 0xE8;

const POWERSTATE_MASK: u32 = 0x3;
const LOGICRETSTATE_MASK: u32 = 1 << 2;
const LOWPOWERSTATECHANGE_MASK: u32 = 1 << 4;
const SAVEANDRESTORE_MASK: u32 = 1 << 5;
const LOGICSTATEST_MASK: u32 = 1 << 2;
const INTRANSITION_MASK: u32 = 1 << 20;

/// Poll budget for a powerdomain to leave its transition
pub const PWRDM_TRANSITION_BAILOUT: u32 = 100_000;

const fn mem_retst_mask(bank: u8) -> u32 {
    1 << (8 + bank)
}

const fn mem_onst_mask(bank: u8) -> u32 {
    0x3 << (16 + 2 * bank as u32)
}

const fn mem_st_mask(bank: u8) -> u32 {
    0x3 << (4 + 2 * bank as u32)
}

/// Base address of a powerdomain's register block
pub fn prm_base(hw: &PwrdmHw) -> u32 {
    (u32::from(hw.prcm_partition) << 16) | u32::from(hw.prcm_offs)
}

/// `PWSTST`/`PREPWSTST` value with the domain, its logic and `banks`
/// memory banks all ON.
///
/// MPU-quirk domains report bank 0 in bank 1's status field, so that
/// field is set as well.
pub fn pwstst_all_on(banks: u8, flags: PwrdmFlags) -> u32 {
    let all = (0..banks).fold(
        PowerState::On as u32 | LOGICSTATEST_MASK,
        |v, bank| v | mem_st_mask(bank),
    );
    if flags.contains(PwrdmFlags::HAS_MPU_QUIRK) {
        all | mem_st_mask(1)
    } else {
        all
    }
}

fn decode(raw: u32) -> PrcmResult<PowerState> {
    PowerState::from_raw(raw).ok_or(PrcmError::InvalidArgument)
}

fn retst(bit: bool) -> PowerState {
    if bit {
        PowerState::Retention
    } else {
        PowerState::Off
    }
}

/// Powerdomain adapter over a [`RegisterAccess`]
#[derive(Debug)]
pub struct PrmPwrdmOps<R> {
    regs: Arc<R>,
}

impl<R: RegisterAccess> PrmPwrdmOps<R> {
    /// Adapter over `regs`
    pub fn new(regs: Arc<R>) -> Self {
        Self { regs }
    }

    fn reg(pwrdm: &Powerdomain, offs: u32) -> u32 {
        prm_base(pwrdm.hw()) + offs
    }

    fn field(&self, pwrdm: &Powerdomain, offs: u32, mask: u32) -> u32 {
        self.regs.read_field(Self::reg(pwrdm, offs), mask)
    }
}

impl<R: RegisterAccess> PwrdmOps for PrmPwrdmOps<R> {
    fn set_next_pwrst(&self, pwrdm: &Powerdomain, pwrst: PowerState) -> PrcmResult<()> {
        self.regs
            .write_field(Self::reg(pwrdm, PRM_PWSTCTRL), POWERSTATE_MASK, pwrst as u32);
        Ok(())
    }

    fn read_next_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        decode(self.field(pwrdm, PRM_PWSTCTRL, POWERSTATE_MASK))
    }

    fn read_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        decode(self.field(pwrdm, PRM_PWSTST, POWERSTATE_MASK))
    }

    fn read_prev_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        decode(self.field(pwrdm, PRM_PREPWSTST, POWERSTATE_MASK))
    }

    fn set_logic_retst(&self, pwrdm: &Powerdomain, pwrst: PowerState) -> PrcmResult<()> {
        let bit = match pwrst {
            PowerState::Off => 0,
            PowerState::Retention => 1,
            _ => return Err(PrcmError::InvalidArgument),
        };
        self.regs
            .write_field(Self::reg(pwrdm, PRM_PWSTCTRL), LOGICRETSTATE_MASK, bit);
        Ok(())
    }

    fn read_logic_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(if self.field(pwrdm, PRM_PWSTST, LOGICSTATEST_MASK) != 0 {
            PowerState::On
        } else {
            PowerState::Off
        })
    }

    fn read_prev_logic_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(retst(self.field(pwrdm, PRM_PREPWSTST, LOGICSTATEST_MASK) != 0))
    }

    fn read_logic_retst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(retst(self.field(pwrdm, PRM_PWSTCTRL, LOGICRETSTATE_MASK) != 0))
    }

    fn set_mem_onst(&self, pwrdm: &Powerdomain, bank: u8, pwrst: PowerState) -> PrcmResult<()> {
        self.regs
            .write_field(Self::reg(pwrdm, PRM_PWSTCTRL), mem_onst_mask(bank), pwrst as u32);
        Ok(())
    }

    fn set_mem_retst(&self, pwrdm: &Powerdomain, bank: u8, pwrst: PowerState) -> PrcmResult<()> {
        let bit = match pwrst {
            PowerState::Off => 0,
            PowerState::Retention => 1,
            _ => return Err(PrcmError::InvalidArgument),
        };
        self.regs
            .write_field(Self::reg(pwrdm, PRM_PWSTCTRL), mem_retst_mask(bank), bit);
        Ok(())
    }

    fn read_mem_pwrst(&self, pwrdm: &Powerdomain, bank: u8) -> PrcmResult<PowerState> {
        decode(self.field(pwrdm, PRM_PWSTST, mem_st_mask(bank)))
    }

    fn read_prev_mem_pwrst(&self, pwrdm: &Powerdomain, bank: u8) -> PrcmResult<PowerState> {
        decode(self.field(pwrdm, PRM_PREPWSTST, mem_st_mask(bank)))
    }

    fn read_mem_retst(&self, pwrdm: &Powerdomain, bank: u8) -> PrcmResult<PowerState> {
        Ok(retst(self.field(pwrdm, PRM_PWSTCTRL, mem_retst_mask(bank)) != 0))
    }

    fn clear_all_prev_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        // the latches reset to ON
        let all_on = pwstst_all_on(pwrdm.banks(), pwrdm.flags());
        self.regs.write(Self::reg(pwrdm, PRM_PREPWSTST), all_on);
        Ok(())
    }

    fn enable_hdwr_sar(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.regs
            .set_bits(Self::reg(pwrdm, PRM_PWSTCTRL), SAVEANDRESTORE_MASK);
        Ok(())
    }

    fn disable_hdwr_sar(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.regs
            .clear_bits(Self::reg(pwrdm, PRM_PWSTCTRL), SAVEANDRESTORE_MASK);
        Ok(())
    }

    fn set_lowpwrstchange(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.regs
            .set_bits(Self::reg(pwrdm, PRM_PWSTCTRL), LOWPOWERSTATECHANGE_MASK);
        Ok(())
    }

    fn wait_transition(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        let addr = Self::reg(pwrdm, PRM_PWSTST);
        match wait_until(PWRDM_TRANSITION_BAILOUT, || {
            self.regs.read(addr) & INTRANSITION_MASK == 0
        }) {
            Ok(tries) => {
                if tries > 0 {
                    log::debug!("powerdomain: {}: transition took {} tries", pwrdm.name(), tries);
                }
                Ok(())
            },
            Err(timeout) => {
                log::error!(
                    "powerdomain: {}: waited too long to complete transition",
                    pwrdm.name()
                );
                Err(timeout.into())
            },
        }
    }
}
