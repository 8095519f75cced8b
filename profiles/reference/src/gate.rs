//! Gate clocks: one enable bit, optionally a module idle-status bit, a
//! companion interface clock and an autoidle bit.

use alloc::sync::Arc;

use prcm_core::{Clock, ClockFlags, ClockOps, Idlest, PrcmError, PrcmResult, RegBit};
use prcm_hal::RegisterAccess;

/// Gate clock adapter over a [`RegisterAccess`]
#[derive(Debug)]
pub struct GateClockOps<R> {
    regs: Arc<R>,
    idlest: Option<Idlest>,
    companion: Option<RegBit>,
    autoidle: Option<RegBit>,
}

impl<R: RegisterAccess> GateClockOps<R> {
    /// Plain gate over `regs`
    pub fn new(regs: Arc<R>) -> Self {
        Self {
            regs,
            idlest: None,
            companion: None,
            autoidle: None,
        }
    }

    /// Wait for `bit` to read `ready_val` after enabling
    pub fn idlest(mut self, bit: RegBit, ready_val: bool) -> Self {
        self.idlest = Some(Idlest { bit, ready_val });
        self
    }

    /// Interface clock that must be running for the module to report ready
    pub fn companion(mut self, bit: RegBit) -> Self {
        self.companion = Some(bit);
        self
    }

    /// Autoidle control bit
    pub fn autoidle(mut self, bit: RegBit) -> Self {
        self.autoidle = Some(bit);
        self
    }

    fn bit_set(&self, bit: RegBit) -> bool {
        self.regs.read(bit.reg) & bit.mask() != 0
    }

    fn set_gate(&self, clk: &Clock, on: bool) -> PrcmResult<()> {
        let bit = clk.enable_reg().ok_or(PrcmError::InvalidArgument)?;
        let set = on != clk.flags().contains(ClockFlags::INVERT_ENABLE);
        if set {
            self.regs.set_bits(bit.reg, bit.mask());
        } else {
            self.regs.clear_bits(bit.reg, bit.mask());
        }
        Ok(())
    }
}

impl<R: RegisterAccess> ClockOps for GateClockOps<R> {
    fn enable(&self, clk: &Clock) -> PrcmResult<()> {
        self.set_gate(clk, true)
    }

    fn disable(&self, clk: &Clock) {
        if self.set_gate(clk, false).is_err() {
            log::warn!("clock: {}: no enable register", clk.name());
        }
    }

    fn is_enabled(&self, clk: &Clock) -> PrcmResult<bool> {
        let bit = clk.enable_reg().ok_or(PrcmError::Unsupported)?;
        Ok(self.bit_set(bit) != clk.flags().contains(ClockFlags::INVERT_ENABLE))
    }

    fn find_companion(&self, _clk: &Clock) -> Option<RegBit> {
        self.companion
    }

    fn companion_enabled(&self, companion: RegBit) -> bool {
        self.bit_set(companion)
    }

    fn find_idlest(&self, _clk: &Clock) -> Option<Idlest> {
        self.idlest
    }

    fn module_ready(&self, idlest: &Idlest) -> bool {
        self.bit_set(idlest.bit) == idlest.ready_val
    }

    fn allow_idle(&self, _clk: &Clock) -> PrcmResult<()> {
        let bit = self.autoidle.ok_or(PrcmError::Unsupported)?;
        self.regs.set_bits(bit.reg, bit.mask());
        Ok(())
    }

    fn deny_idle(&self, _clk: &Clock) -> PrcmResult<()> {
        let bit = self.autoidle.ok_or(PrcmError::Unsupported)?;
        self.regs.clear_bits(bit.reg, bit.mask());
        Ok(())
    }
}
