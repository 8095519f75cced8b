//! # Powerdomains
//!
//! A powerdomain groups clockdomains behind one power switch. Transitions
//! are requested (`set_next_pwrst`) and happen asynchronously in hardware;
//! the core only observes them after the fact and keeps a histogram of
//! the states it saw.
//!
//! ## State Machine
//!
//! ```text
//!            set_next_pwrst(RET)          hardware idles
//!   ┌────┐ ─────────────────────▶ ┌────┐ ─────────────────▶ ┌─────┐
//!   │ ON │                        │ ON │                    │ RET │
//!   └────┘ ◀───────────────────── └────┘ ◀───────────────── └─────┘
//!                  wakeup event          post_transition reads
//!                                        prev = RET, counts it
//! ```
//!
//! ## Context Loss
//!
//! Hardware has no explicit "context lost" counter. When a domain was
//! allowed to enter RET with logic (or a memory bank) in either OFF or
//! RET, and the previous-state latch reports OFF, the content was lost.
//! [`Prcm::pwrdm_get_context_loss_count`] sums those events with the OFF
//! entries.

use core::fmt;

use bitflags::bitflags;
use heapless::Vec as BoundedVec;
use spin::Mutex;
use static_assertions::{const_assert, const_assert_eq};

use crate::error::{PrcmError, PrcmResult};
use crate::ops::PwrdmOps;
use crate::prcm::Prcm;
use crate::{ClkdmId, PwrdmId, VoltdmId};

/// Number of distinct power states
pub const PWRDM_MAX_PWRSTS: usize = 4;

/// Maximum memory banks per powerdomain
pub const PWRDM_MAX_MEM_BANKS: usize = 5;

/// Maximum clockdomains per powerdomain
pub const PWRDM_MAX_CLKDMS: usize = 20;

const_assert_eq!(PWRDM_MAX_PWRSTS, PowerState::ALL.len());
const_assert!(PWRDM_MAX_MEM_BANKS <= u8::MAX as usize);
const_assert!(PWRDM_MAX_CLKDMS > 0);

// =============================================================================
// POWER STATES
// =============================================================================

/// Power state of a domain, logic area or memory bank.
///
/// Ordered from deepest to shallowest.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PowerState {
    /// Power removed, content lost
    Off = 0,
    /// Low-voltage retention
    Retention = 1,
    /// On but logically idle
    Inactive = 2,
    /// Fully on
    On = 3,
}

impl PowerState {
    /// Every state, deepest first
    pub const ALL: [PowerState; 4] = [
        PowerState::Off,
        PowerState::Retention,
        PowerState::Inactive,
        PowerState::On,
    ];

    /// Decode a raw register field value
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(PowerState::Off),
            1 => Some(PowerState::Retention),
            2 => Some(PowerState::Inactive),
            3 => Some(PowerState::On),
            _ => None,
        }
    }

    /// Short name used by the counter dump
    pub const fn as_str(self) -> &'static str {
        match self {
            PowerState::Off => "OFF",
            PowerState::Retention => "RET",
            PowerState::Inactive => "INA",
            PowerState::On => "ON",
        }
    }

    /// Single-state mask
    pub const fn mask(self) -> PowerStates {
        PowerStates::from_bits_retain(1 << self as u8)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Set of legal power states
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PowerStates: u8 {
        /// OFF
        const OFF = 1 << PowerState::Off as u8;
        /// RETENTION
        const RET = 1 << PowerState::Retention as u8;
        /// INACTIVE
        const INACTIVE = 1 << PowerState::Inactive as u8;
        /// ON
        const ON = 1 << PowerState::On as u8;

        /// OFF or ON
        const OFF_ON = Self::OFF.bits() | Self::ON.bits();
        /// OFF or RETENTION
        const OFF_RET = Self::OFF.bits() | Self::RET.bits();
        /// RETENTION or ON
        const RET_ON = Self::RET.bits() | Self::ON.bits();
        /// OFF, RETENTION or ON
        const OFF_RET_ON = Self::OFF_RET.bits() | Self::ON.bits();
        /// INACTIVE or ON
        const INA_ON = Self::INACTIVE.bits() | Self::ON.bits();
        /// Every state
        const OFF_RET_INA_ON = Self::OFF_RET_ON.bits() | Self::INACTIVE.bits();
    }
}

impl PowerStates {
    /// Whether `state` is in the set
    #[inline]
    pub const fn has(self, state: PowerState) -> bool {
        self.bits() & state.mask().bits() != 0
    }
}

bitflags! {
    /// Powerdomain hardware features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PwrdmFlags: u8 {
        /// Hardware save-and-restore of logic context
        const HAS_HDWR_SAR = 1 << 0;
        /// Memory bank 0 status is reported on bank 1
        const HAS_MPU_QUIRK = 1 << 1;
        /// Low-power state changes can be triggered without a wakeup
        const HAS_LOWPOWERSTATECHANGE = 1 << 2;
    }
}

/// Which hardware latch [`Prcm::pwrdm_state_switch`] reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSwitch {
    /// The current state
    Now,
    /// The state entered during the last transition
    Prev,
}

/// Register coordinates of a powerdomain, interpreted by the adapter only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PwrdmHw {
    /// PRCM partition
    pub prcm_partition: u8,
    /// PRM instance offset
    pub prcm_offs: u16,
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Static description of a powerdomain
#[derive(Debug, Clone, Copy)]
pub struct PowerdomainDesc {
    /// Unique name
    pub name: &'static str,
    /// Feeding voltagedomain name
    pub voltdm: &'static str,
    /// Legal domain states
    pub pwrsts: PowerStates,
    /// Legal logic states while in retention
    pub pwrsts_logic_ret: PowerStates,
    /// Number of memory banks
    pub banks: u8,
    /// Legal bank states while the domain is in retention
    pub pwrsts_mem_ret: [PowerStates; PWRDM_MAX_MEM_BANKS],
    /// Legal bank states while the domain is on
    pub pwrsts_mem_on: [PowerStates; PWRDM_MAX_MEM_BANKS],
    /// Hardware features
    pub flags: PwrdmFlags,
    /// Register coordinates
    pub hw: PwrdmHw,
}

impl PowerdomainDesc {
    /// Empty descriptor, for struct-update syntax
    pub const DEFAULT: Self = Self {
        name: "",
        voltdm: "",
        pwrsts: PowerStates::ON,
        pwrsts_logic_ret: PowerStates::empty(),
        banks: 0,
        pwrsts_mem_ret: [PowerStates::empty(); PWRDM_MAX_MEM_BANKS],
        pwrsts_mem_on: [PowerStates::empty(); PWRDM_MAX_MEM_BANKS],
        flags: PwrdmFlags::empty(),
        hw: PwrdmHw {
            prcm_partition: 0,
            prcm_offs: 0,
        },
    };
}

// =============================================================================
// POWERDOMAIN
// =============================================================================

#[derive(Debug)]
pub(crate) struct PwrdmState {
    state: PowerState,
    state_counter: [u32; PWRDM_MAX_PWRSTS],
    ret_logic_off_counter: u32,
    ret_mem_off_counter: [u32; PWRDM_MAX_MEM_BANKS],
}

impl PwrdmState {
    fn count(&mut self, state: PowerState) {
        let slot = &mut self.state_counter[state as usize];
        *slot = slot.saturating_add(1);
    }
}

/// A registered powerdomain
pub struct Powerdomain {
    id: PwrdmId,
    name: &'static str,
    voltdm: VoltdmId,
    pwrsts: PowerStates,
    pwrsts_logic_ret: PowerStates,
    banks: u8,
    pwrsts_mem_ret: [PowerStates; PWRDM_MAX_MEM_BANKS],
    pwrsts_mem_on: [PowerStates; PWRDM_MAX_MEM_BANKS],
    flags: PwrdmFlags,
    hw: PwrdmHw,
    clkdms: BoundedVec<ClkdmId, PWRDM_MAX_CLKDMS>,
    state: Mutex<PwrdmState>,
}

impl Powerdomain {
    pub(crate) fn new(id: PwrdmId, desc: &PowerdomainDesc, voltdm: VoltdmId) -> Self {
        Self {
            id,
            name: desc.name,
            voltdm,
            pwrsts: desc.pwrsts,
            pwrsts_logic_ret: desc.pwrsts_logic_ret,
            banks: desc.banks,
            pwrsts_mem_ret: desc.pwrsts_mem_ret,
            pwrsts_mem_on: desc.pwrsts_mem_on,
            flags: desc.flags,
            hw: desc.hw,
            clkdms: BoundedVec::new(),
            state: Mutex::new(PwrdmState {
                state: PowerState::On,
                state_counter: [0; PWRDM_MAX_PWRSTS],
                ret_logic_off_counter: 0,
                ret_mem_off_counter: [0; PWRDM_MAX_MEM_BANKS],
            }),
        }
    }

    pub(crate) fn add_clkdm(&mut self, clkdm: ClkdmId) -> PrcmResult<()> {
        self.clkdms.push(clkdm).map_err(|_| PrcmError::LimitExceeded)
    }

    /// Stable handle
    pub fn id(&self) -> PwrdmId {
        self.id
    }

    /// Domain name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Feeding voltagedomain
    pub fn voltdm(&self) -> VoltdmId {
        self.voltdm
    }

    /// Legal domain states
    pub fn pwrsts(&self) -> PowerStates {
        self.pwrsts
    }

    /// Legal logic states while in retention
    pub fn pwrsts_logic_ret(&self) -> PowerStates {
        self.pwrsts_logic_ret
    }

    /// Number of memory banks
    pub fn banks(&self) -> u8 {
        self.banks
    }

    /// Legal retention states of `bank`
    pub fn pwrsts_mem_ret(&self, bank: u8) -> Option<PowerStates> {
        self.bank(bank).ok().map(|b| self.pwrsts_mem_ret[b])
    }

    /// Legal on states of `bank`
    pub fn pwrsts_mem_on(&self, bank: u8) -> Option<PowerStates> {
        self.bank(bank).ok().map(|b| self.pwrsts_mem_on[b])
    }

    /// Hardware features
    pub fn flags(&self) -> PwrdmFlags {
        self.flags
    }

    /// Register coordinates
    pub fn hw(&self) -> &PwrdmHw {
        &self.hw
    }

    /// Clockdomains in this powerdomain, in registration order
    pub fn clkdms(&self) -> &[ClkdmId] {
        &self.clkdms
    }

    /// Whether hardware save-and-restore is available
    pub fn has_hdwr_sar(&self) -> bool {
        self.flags.contains(PwrdmFlags::HAS_HDWR_SAR)
    }

    /// Whether any legal configuration of the domain loses context
    pub fn can_ever_lose_context(&self) -> bool {
        let banks = 0..self.banks as usize;

        if self.pwrsts.contains(PowerStates::OFF) {
            return true;
        }
        if self.pwrsts.contains(PowerStates::RET) {
            if self.pwrsts_logic_ret.contains(PowerStates::OFF) {
                return true;
            }
            if banks
                .clone()
                .any(|b| self.pwrsts_mem_ret[b].contains(PowerStates::OFF))
            {
                return true;
            }
        }
        banks.into_iter().any(|b| self.pwrsts_mem_on[b].contains(PowerStates::OFF))
    }

    fn bank(&self, bank: u8) -> PrcmResult<usize> {
        if bank < self.banks {
            Ok(bank as usize)
        } else {
            Err(PrcmError::InvalidArgument)
        }
    }

    /// Bank whose status registers actually report `bank`
    fn status_bank(&self, bank: u8) -> PrcmResult<u8> {
        self.bank(bank)?;
        if self.flags.contains(PwrdmFlags::HAS_MPU_QUIRK) {
            Ok(1)
        } else {
            Ok(bank)
        }
    }
}

impl fmt::Debug for Powerdomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Powerdomain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("voltdm", &self.voltdm)
            .field("pwrsts", &self.pwrsts)
            .field("banks", &self.banks)
            .field("flags", &self.flags)
            .field("clkdms", &self.clkdms)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// COUNTERS
// =============================================================================

/// Snapshot of a powerdomain's transition statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwrdmCounters {
    /// Domain name
    pub name: &'static str,
    /// Last observed state
    pub state: PowerState,
    /// Times each state was observed, indexed by `PowerState as usize`
    pub state_counter: [u32; PWRDM_MAX_PWRSTS],
    /// Retention entries that lost logic context
    pub ret_logic_off_counter: u32,
    /// Retention entries that lost each bank's content
    pub ret_mem_off_counter: [u32; PWRDM_MAX_MEM_BANKS],
    /// Number of valid entries in `ret_mem_off_counter`
    pub banks: u8,
}

impl PwrdmCounters {
    /// OFF entries plus retention entries that lost logic or memory,
    /// saturating at `u32::MAX`
    pub fn context_loss_count(&self) -> u32 {
        self.ret_mem_off_counter[..self.banks as usize]
            .iter()
            .fold(
                self.state_counter[PowerState::Off as usize]
                    .saturating_add(self.ret_logic_off_counter),
                |acc, &n| acc.saturating_add(n),
            )
    }
}

impl fmt::Display for PwrdmCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.state)?;
        for state in PowerState::ALL {
            write!(f, ",{}:{}", state, self.state_counter[state as usize])?;
        }
        write!(f, ",RET-LOGIC-OFF:{}", self.ret_logic_off_counter)?;
        for bank in 0..self.banks as usize {
            write!(f, ",RET-MEMBANK{}-OFF:{}", bank + 1, self.ret_mem_off_counter[bank])?;
        }
        Ok(())
    }
}

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Clone, Copy)]
enum SleepSwitch {
    None,
    ForceWakeup { clkdm: ClkdmId, hwsup: bool },
    LowPowerStateChange,
}

impl Prcm {
    pub(crate) fn pd(&self, id: PwrdmId) -> PrcmResult<&Powerdomain> {
        self.pwrdms.get(id.index()).ok_or(PrcmError::InvalidArgument)
    }

    pub(crate) fn pwrdm_ops(&self) -> PrcmResult<&dyn PwrdmOps> {
        self.pwrdm_ops.as_deref().ok_or(PrcmError::NoAdapter)
    }

    /// Program the state the domain enters on its next idle.
    ///
    /// States outside the domain's legal set are rejected and nothing is
    /// cached either way.
    pub fn pwrdm_set_next_pwrst(&self, id: PwrdmId, pwrst: PowerState) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        if !pwrdm.pwrsts.has(pwrst) {
            log::debug!("powerdomain: {}: {} is not a legal state", pwrdm.name, pwrst);
            return Err(PrcmError::InvalidArgument);
        }

        log::debug!("powerdomain: setting next powerstate for {} to {}", pwrdm.name, pwrst);
        self.pwrdm_ops()?.set_next_pwrst(pwrdm, pwrst)
    }

    /// Programmed next state
    pub fn pwrdm_read_next_pwrst(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        self.pwrdm_ops()?.read_next_pwrst(pwrdm)
    }

    /// Current state; always-on domains are not read from hardware
    pub fn pwrdm_read_pwrst(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        if pwrdm.pwrsts == PowerStates::ON {
            return Ok(PowerState::On);
        }
        self.pwrdm_ops()?.read_pwrst(pwrdm)
    }

    /// State entered during the last transition
    pub fn pwrdm_read_prev_pwrst(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        self.pwrdm_ops()?.read_prev_pwrst(pwrdm)
    }

    /// Cached state from the last reconciliation
    pub fn pwrdm_cached_state(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        Ok(self.pd(id)?.state.lock().state)
    }

    // =========================================================================
    // Logic and memory
    // =========================================================================

    /// Program the logic state used in retention
    pub fn pwrdm_set_logic_retst(&self, id: PwrdmId, pwrst: PowerState) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        if !pwrdm.pwrsts_logic_ret.has(pwrst) {
            return Err(PrcmError::InvalidArgument);
        }
        log::debug!("powerdomain: setting next logic powerstate for {} to {}", pwrdm.name, pwrst);
        self.pwrdm_ops()?.set_logic_retst(pwrdm, pwrst)
    }

    /// Current logic state
    pub fn pwrdm_read_logic_pwrst(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        self.pwrdm_ops()?.read_logic_pwrst(pwrdm)
    }

    /// Logic state entered during the last transition
    pub fn pwrdm_read_prev_logic_pwrst(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        self.pwrdm_ops()?.read_prev_logic_pwrst(pwrdm)
    }

    /// Programmed logic retention state
    pub fn pwrdm_read_logic_retst(&self, id: PwrdmId) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        self.pwrdm_ops()?.read_logic_retst(pwrdm)
    }

    /// Program `bank`'s state while the domain is on
    pub fn pwrdm_set_mem_onst(&self, id: PwrdmId, bank: u8, pwrst: PowerState) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        let b = pwrdm.bank(bank)?;
        if !pwrdm.pwrsts_mem_on[b].has(pwrst) {
            return Err(PrcmError::InvalidArgument);
        }
        log::debug!(
            "powerdomain: setting next memory powerstate for domain {} bank {} while pwrdm-ON to {}",
            pwrdm.name,
            bank,
            pwrst
        );
        self.pwrdm_ops()?.set_mem_onst(pwrdm, bank, pwrst)
    }

    /// Program `bank`'s state while the domain is in retention
    pub fn pwrdm_set_mem_retst(&self, id: PwrdmId, bank: u8, pwrst: PowerState) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        let b = pwrdm.bank(bank)?;
        if !pwrdm.pwrsts_mem_ret[b].has(pwrst) {
            return Err(PrcmError::InvalidArgument);
        }
        log::debug!(
            "powerdomain: setting next memory powerstate for domain {} bank {} while pwrdm-RET to {}",
            pwrdm.name,
            bank,
            pwrst
        );
        self.pwrdm_ops()?.set_mem_retst(pwrdm, bank, pwrst)
    }

    /// Current state of `bank`
    pub fn pwrdm_read_mem_pwrst(&self, id: PwrdmId, bank: u8) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        let bank = pwrdm.status_bank(bank)?;
        self.pwrdm_ops()?.read_mem_pwrst(pwrdm, bank)
    }

    /// State `bank` entered during the last transition
    pub fn pwrdm_read_prev_mem_pwrst(&self, id: PwrdmId, bank: u8) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        let bank = pwrdm.status_bank(bank)?;
        self.pwrdm_ops()?.read_prev_mem_pwrst(pwrdm, bank)
    }

    /// Programmed retention state of `bank`
    pub fn pwrdm_read_mem_retst(&self, id: PwrdmId, bank: u8) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        pwrdm.bank(bank)?;
        self.pwrdm_ops()?.read_mem_retst(pwrdm, bank)
    }

    /// Reset the domain's previous-state latches
    pub fn pwrdm_clear_all_prev_pwrst(&self, id: PwrdmId) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        log::debug!("powerdomain: clearing previous power state reg for {}", pwrdm.name);
        self.pwrdm_ops()?.clear_all_prev_pwrst(pwrdm)
    }

    /// Enable hardware save-and-restore
    pub fn pwrdm_enable_hdwr_sar(&self, id: PwrdmId) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        if !pwrdm.has_hdwr_sar() {
            return Err(PrcmError::Unsupported);
        }
        log::debug!("powerdomain: {}: setting SAVEANDRESTORE bit", pwrdm.name);
        self.pwrdm_ops()?.enable_hdwr_sar(pwrdm)
    }

    /// Disable hardware save-and-restore
    pub fn pwrdm_disable_hdwr_sar(&self, id: PwrdmId) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        if !pwrdm.has_hdwr_sar() {
            return Err(PrcmError::Unsupported);
        }
        log::debug!("powerdomain: {}: clearing SAVEANDRESTORE bit", pwrdm.name);
        self.pwrdm_ops()?.disable_hdwr_sar(pwrdm)
    }

    /// Whether hardware save-and-restore is available
    pub fn pwrdm_has_hdwr_sar(&self, id: PwrdmId) -> PrcmResult<bool> {
        Ok(self.pd(id)?.has_hdwr_sar())
    }

    /// Trigger a low-power state change without waking the domain
    pub fn pwrdm_set_lowpwrstchange(&self, id: PwrdmId) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        if !pwrdm.flags.contains(PwrdmFlags::HAS_LOWPOWERSTATECHANGE) {
            return Err(PrcmError::Unsupported);
        }
        self.pwrdm_ops()?.set_lowpwrstchange(pwrdm)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Bounded wait until the domain is not mid-transition
    pub fn pwrdm_wait_transition(&self, id: PwrdmId) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        self.pwrdm_ops()?.wait_transition(pwrdm)
    }

    /// Reconcile the cached state with hardware and update the counters.
    ///
    /// `Now` compares the current hardware state with the cache. `Prev`
    /// additionally accounts the state entered during the last transition
    /// and, when that was retention, the logic and memory content lost.
    pub fn pwrdm_state_switch(&self, id: PwrdmId, which: StateSwitch) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        let ops = self.pwrdm_ops()?;

        let mut st = pwrdm.state.lock();
        let state = self.pwrdm_read_pwrst(id)?;

        let prev = match which {
            StateSwitch::Now => st.state,
            StateSwitch::Prev => {
                let prev = ops.read_prev_pwrst(pwrdm)?;
                if st.state != prev {
                    st.count(prev);
                }
                if prev == PowerState::Retention {
                    self.update_logic_membank_counters(pwrdm, &mut st);
                }
                prev
            },
        };

        if state != prev {
            st.count(state);
        }

        #[cfg(feature = "debug")]
        log::trace!(
            "powerdomain: {}: {} -> {}, counters {:?}",
            pwrdm.name,
            prev,
            state,
            st.state_counter
        );

        st.state = state;
        Ok(())
    }

    fn update_logic_membank_counters(&self, pwrdm: &Powerdomain, st: &mut PwrdmState) {
        if pwrdm.pwrsts_logic_ret == PowerStates::OFF_RET
            && self.pwrdm_read_prev_logic_pwrst(pwrdm.id) == Ok(PowerState::Off)
        {
            st.ret_logic_off_counter = st.ret_logic_off_counter.saturating_add(1);
        }

        for bank in 0..pwrdm.banks {
            if pwrdm.pwrsts_mem_ret[bank as usize] == PowerStates::OFF_RET
                && self.pwrdm_read_prev_mem_pwrst(pwrdm.id, bank) == Ok(PowerState::Off)
            {
                let slot = &mut st.ret_mem_off_counter[bank as usize];
                *slot = slot.saturating_add(1);
            }
        }
    }

    /// Wait out a pending transition, then reconcile the current state.
    /// A timeout leaves the cached state stale.
    pub(crate) fn pwrdm_clkdm_state_switch(&self, id: PwrdmId) {
        match self.pwrdm_wait_transition(id) {
            Ok(()) | Err(PrcmError::Unsupported) => self.pwrdm_reevaluate(id),
            Err(err) => {
                let name = self.pd(id).map(|p| p.name).unwrap_or("?");
                log::warn!("powerdomain: {}: transition did not complete: {}", name, err);
            },
        }
    }

    pub(crate) fn pwrdm_reevaluate(&self, id: PwrdmId) {
        if let Err(err) = self.pwrdm_state_switch(id, StateSwitch::Now) {
            log::debug!("powerdomain: state re-evaluation failed: {}", err);
        }
    }

    fn pwrdm_sweep<F>(&self, id: Option<PwrdmId>, mut f: F) -> PrcmResult<()>
    where
        F: FnMut(PwrdmId) -> PrcmResult<()>,
    {
        match id {
            Some(id) => f(id),
            None => {
                let mut first = None;
                for pwrdm in &self.pwrdms {
                    if let Err(err) = f(pwrdm.id) {
                        first.get_or_insert(err);
                    }
                }
                first.map_or(Ok(()), Err)
            },
        }
    }

    /// Clear previous-state latches and snapshot the current state of one
    /// domain, or of every domain when `id` is `None`
    pub fn pwrdm_pre_transition(&self, id: Option<PwrdmId>) -> PrcmResult<()> {
        self.pwrdm_sweep(id, |id| {
            match self.pwrdm_clear_all_prev_pwrst(id) {
                Ok(()) | Err(PrcmError::Unsupported) => {},
                Err(err) => return Err(err),
            }
            self.pwrdm_state_switch(id, StateSwitch::Now)
        })
    }

    /// Account the transitions that happened since
    /// [`Prcm::pwrdm_pre_transition`]
    pub fn pwrdm_post_transition(&self, id: Option<PwrdmId>) -> PrcmResult<()> {
        self.pwrdm_sweep(id, |id| self.pwrdm_state_switch(id, StateSwitch::Prev))
    }

    /// Read the cached state from hardware for the first time
    pub(crate) fn pwrdm_prime(&self, id: PwrdmId) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;
        match self.pwrdm_wait_transition(id) {
            Ok(()) | Err(PrcmError::Unsupported) | Err(PrcmError::NoAdapter) => {},
            Err(err) => log::warn!("powerdomain: {}: still in transition: {}", pwrdm.name, err),
        }
        let state = self.pwrdm_read_pwrst(id).unwrap_or(PowerState::On);

        let mut st = pwrdm.state.lock();
        st.state = state;
        st.state_counter = [0; PWRDM_MAX_PWRSTS];
        st.state_counter[state as usize] = 1;
        Ok(())
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Snapshot of the transition statistics
    pub fn pwrdm_counters(&self, id: PwrdmId) -> PrcmResult<PwrdmCounters> {
        let pwrdm = self.pd(id)?;
        let st = pwrdm.state.lock();
        Ok(PwrdmCounters {
            name: pwrdm.name,
            state: st.state,
            state_counter: st.state_counter,
            ret_logic_off_counter: st.ret_logic_off_counter,
            ret_mem_off_counter: st.ret_mem_off_counter,
            banks: pwrdm.banks,
        })
    }

    /// How many times the domain has lost context, saturating
    pub fn pwrdm_get_context_loss_count(&self, id: PwrdmId) -> PrcmResult<u32> {
        let count = self.pwrdm_counters(id)?.context_loss_count();
        log::debug!("powerdomain: {}: context loss count = {}", self.pd(id)?.name, count);
        Ok(count)
    }

    /// Whether any legal configuration of the domain loses context
    pub fn pwrdm_can_ever_lose_context(&self, id: PwrdmId) -> PrcmResult<bool> {
        Ok(self.pd(id)?.can_ever_lose_context())
    }

    // =========================================================================
    // Policy helpers
    // =========================================================================

    /// Nearest legal state to `req`.
    ///
    /// Searches deeper states first, then shallower ones up to RET for the
    /// logic area or ON for the domain.
    pub fn pwrdm_get_valid_lp_state(
        &self,
        id: PwrdmId,
        logic: bool,
        req: PowerState,
    ) -> PrcmResult<PowerState> {
        let pwrdm = self.pd(id)?;
        let (legal, default) = if logic {
            (pwrdm.pwrsts_logic_ret, PowerState::Retention)
        } else {
            (pwrdm.pwrsts, PowerState::On)
        };

        if legal.has(req) {
            return Ok(req);
        }

        let mut deeper = PowerState::ALL[..req as usize].iter().rev();
        if let Some(&state) = deeper.find(|&&s| legal.has(s)) {
            return Ok(state);
        }

        for &state in &PowerState::ALL[req as usize + 1..] {
            if legal.has(state) || state == default {
                return Ok(state);
            }
        }

        log::warn!("powerdomain: {}: no valid low-power state for {}", pwrdm.name, req);
        Ok(PowerState::On)
    }

    /// Program `pwrst` (rounded down to a legal state) as the next state.
    ///
    /// A domain currently below ON is kept reachable while the request is
    /// programmed: either through a low-power state change, when the
    /// hardware has one and the request is deeper than the current state,
    /// or by force-waking its first clockdomain and putting it back
    /// afterwards.
    pub fn set_pwrdm_state(&self, id: PwrdmId, pwrst: PowerState) -> PrcmResult<()> {
        let pwrdm = self.pd(id)?;

        let pwrst = match PowerState::ALL[..=pwrst as usize]
            .iter()
            .rev()
            .find(|&&s| pwrdm.pwrsts.has(s))
        {
            Some(&state) => state,
            None => return Ok(()),
        };

        let curr = self.pwrdm_read_pwrst(id)?;
        let next = self.pwrdm_read_next_pwrst(id)?;
        if curr == pwrst && next == pwrst {
            return Ok(());
        }

        let mut switch = SleepSwitch::None;
        if curr < PowerState::On {
            if curr > pwrst && pwrdm.flags.contains(PwrdmFlags::HAS_LOWPOWERSTATECHANGE) {
                switch = SleepSwitch::LowPowerStateChange;
            } else if let Some(&clkdm) = pwrdm.clkdms.first() {
                let hwsup = self.clkdm_in_hwsup(clkdm)?;
                if let Err(err) = self.clkdm_wakeup(clkdm) {
                    log::debug!("powerdomain: {}: force wakeup failed: {}", pwrdm.name, err);
                }
                switch = SleepSwitch::ForceWakeup { clkdm, hwsup };
            }
        }

        let ret = self.pwrdm_set_next_pwrst(id, pwrst);
        if let Err(err) = ret {
            log::error!(
                "powerdomain: {}: unable to set power state to {}: {}",
                pwrdm.name,
                pwrst,
                err
            );
        }

        match switch {
            SleepSwitch::None => {},
            SleepSwitch::ForceWakeup { clkdm, hwsup } => {
                let restore = if hwsup {
                    self.clkdm_allow_idle(clkdm)
                } else {
                    self.clkdm_sleep(clkdm)
                };
                if let Err(err) = restore {
                    log::debug!("powerdomain: {}: clockdomain restore failed: {}", pwrdm.name, err);
                }
            },
            SleepSwitch::LowPowerStateChange => {
                if let Err(err) = self.pwrdm_set_lowpwrstchange(id) {
                    log::warn!("powerdomain: {}: low-power state change failed: {}", pwrdm.name, err);
                }
                self.pwrdm_reevaluate(id);
            },
        }

        ret
    }
}

// =============================================================================
// TESTS
// =============================================================================
