//! In-memory adapters and a small reference graph for the unit tests

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use spin::Mutex;

use crate::clock::{Clock, ClockDesc, ClockFlags, RateSource};
use crate::clockdomain::{ClkdmFlags, Clockdomain, ClockdomainDesc};
use crate::error::{PrcmError, PrcmResult};
use crate::ops::{ClkdmOps, ClockOps, Idlest, PwrdmOps, RegBit};
use crate::powerdomain::{
    PowerState, PowerStates, Powerdomain, PowerdomainDesc, PWRDM_MAX_MEM_BANKS,
};
use crate::prcm::Prcm;
use crate::registrar::Registrar;
use crate::voltagedomain::VoltagedomainDesc;
use crate::{ClkdmId, ClockId, PwrdmId};

/// Per-operation call counter keyed by operation name
#[derive(Default)]
struct Calls(Mutex<BTreeMap<&'static str, u32>>);

impl Calls {
    fn hit(&self, op: &'static str) {
        *self.0.lock().entry(op).or_insert(0) += 1;
    }

    fn get(&self, op: &str) -> u32 {
        self.0.lock().get(op).copied().unwrap_or(0)
    }

    fn reset(&self) {
        self.0.lock().clear();
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Gate clock with an optional module idle-status bit
pub struct MockClockOps {
    idlest: Option<Idlest>,
    hw_on: AtomicBool,
    autoidle: AtomicBool,
    fail_enable: AtomicBool,
    never_ready: AtomicBool,
    companion_on: AtomicBool,
    ready_after: AtomicU32,
    since_enable: AtomicU32,
    enables: AtomicU32,
    disables: AtomicU32,
    polls: AtomicU32,
    rate: AtomicU64,
}

impl MockClockOps {
    pub fn new() -> Self {
        Self {
            idlest: None,
            hw_on: AtomicBool::new(false),
            autoidle: AtomicBool::new(false),
            fail_enable: AtomicBool::new(false),
            never_ready: AtomicBool::new(false),
            companion_on: AtomicBool::new(true),
            ready_after: AtomicU32::new(0),
            since_enable: AtomicU32::new(0),
            enables: AtomicU32::new(0),
            disables: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            rate: AtomicU64::new(0),
        }
    }

    /// A gate whose module reports ready through an idlest bit
    pub fn with_idlest() -> Self {
        Self {
            idlest: Some(Idlest {
                bit: RegBit::new(0x20, 0),
                ready_val: false,
            }),
            ..Self::new()
        }
    }

    pub fn enables(&self) -> u32 {
        self.enables.load(Ordering::SeqCst)
    }

    pub fn disables(&self) -> u32 {
        self.disables.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn hw_on(&self) -> bool {
        self.hw_on.load(Ordering::SeqCst)
    }

    pub fn autoidle(&self) -> bool {
        self.autoidle.load(Ordering::SeqCst)
    }

    pub fn set_fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }

    /// Report ready only on the `polls`-th poll after an enable
    pub fn set_ready_after(&self, polls: u32) {
        self.ready_after.store(polls, Ordering::SeqCst);
    }

    pub fn set_never_ready(&self, never: bool) {
        self.never_ready.store(never, Ordering::SeqCst);
    }

    pub fn set_companion_on(&self, on: bool) {
        self.companion_on.store(on, Ordering::SeqCst);
    }

    /// Gate left open behind the engine's back
    pub fn force_hw_on(&self, on: bool) {
        self.hw_on.store(on, Ordering::SeqCst);
    }
}

impl ClockOps for MockClockOps {
    fn enable(&self, _clk: &Clock) -> PrcmResult<()> {
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(PrcmError::InvalidArgument);
        }
        self.enables.fetch_add(1, Ordering::SeqCst);
        self.since_enable.store(0, Ordering::SeqCst);
        self.hw_on.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self, _clk: &Clock) {
        self.disables.fetch_add(1, Ordering::SeqCst);
        self.hw_on.store(false, Ordering::SeqCst);
    }

    fn is_enabled(&self, _clk: &Clock) -> PrcmResult<bool> {
        Ok(self.hw_on())
    }

    fn find_companion(&self, _clk: &Clock) -> Option<RegBit> {
        self.idlest.map(|_| RegBit::new(0x10, 1))
    }

    fn companion_enabled(&self, _companion: RegBit) -> bool {
        self.companion_on.load(Ordering::SeqCst)
    }

    fn find_idlest(&self, _clk: &Clock) -> Option<Idlest> {
        self.idlest
    }

    fn module_ready(&self, _idlest: &Idlest) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let seen = self.since_enable.fetch_add(1, Ordering::SeqCst) + 1;
        !self.never_ready.load(Ordering::SeqCst) && seen >= self.ready_after.load(Ordering::SeqCst)
    }

    fn allow_idle(&self, _clk: &Clock) -> PrcmResult<()> {
        self.autoidle.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deny_idle(&self, _clk: &Clock) -> PrcmResult<()> {
        self.autoidle.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn recalc(&self, _clk: &Clock, parent_rate: u64) -> PrcmResult<u64> {
        match self.rate.load(Ordering::SeqCst) {
            0 => Ok(parent_rate),
            rate => Ok(rate),
        }
    }

    fn round_rate(&self, _clk: &Clock, parent_rate: u64, rate: u64) -> PrcmResult<u64> {
        Ok(rate.min(parent_rate))
    }

    fn set_rate(&self, clk: &Clock, parent_rate: u64, rate: u64) -> PrcmResult<u64> {
        let rate = self.round_rate(clk, parent_rate, rate)?;
        self.rate.store(rate, Ordering::SeqCst);
        Ok(rate)
    }

    fn set_parent(&self, _clk: &Clock, _parent: &Clock) -> PrcmResult<()> {
        Ok(())
    }
}

// =============================================================================
// CLOCKDOMAIN
// =============================================================================

/// Clockdomain adapter recording dependency bits by domain name
#[derive(Default)]
pub struct MockClkdmOps {
    calls: Calls,
    failing: Mutex<BTreeSet<&'static str>>,
    wkdeps: Mutex<BTreeSet<(&'static str, &'static str)>>,
    sleepdeps: Mutex<BTreeSet<(&'static str, &'static str)>>,
}

impl MockClkdmOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.calls.get(op)
    }

    pub fn reset_calls(&self) {
        self.calls.reset();
    }

    /// Make `op` fail with [`PrcmError::InvalidArgument`]
    pub fn set_fail(&self, op: &'static str, fail: bool) {
        let mut failing = self.failing.lock();
        if fail {
            failing.insert(op);
        } else {
            failing.remove(op);
        }
    }

    fn call(&self, op: &'static str) -> PrcmResult<()> {
        self.calls.hit(op);
        if self.failing.lock().contains(op) {
            return Err(PrcmError::InvalidArgument);
        }
        Ok(())
    }
}

impl ClkdmOps for MockClkdmOps {
    fn add_wkdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.call("add_wkdep")?;
        self.wkdeps.lock().insert((clkdm1.name(), clkdm2.name()));
        Ok(())
    }

    fn del_wkdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.call("del_wkdep")?;
        self.wkdeps.lock().remove(&(clkdm1.name(), clkdm2.name()));
        Ok(())
    }

    fn read_wkdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<bool> {
        self.call("read_wkdep")?;
        Ok(self.wkdeps.lock().contains(&(clkdm1.name(), clkdm2.name())))
    }

    fn clear_all_wkdeps(&self, clkdm: &Clockdomain, targets: &[&Clockdomain]) -> PrcmResult<()> {
        self.call("clear_all_wkdeps")?;
        let mut wkdeps = self.wkdeps.lock();
        for target in targets {
            wkdeps.remove(&(clkdm.name(), target.name()));
        }
        Ok(())
    }

    fn add_sleepdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.call("add_sleepdep")?;
        self.sleepdeps.lock().insert((clkdm1.name(), clkdm2.name()));
        Ok(())
    }

    fn del_sleepdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<()> {
        self.call("del_sleepdep")?;
        self.sleepdeps.lock().remove(&(clkdm1.name(), clkdm2.name()));
        Ok(())
    }

    fn read_sleepdep(&self, clkdm1: &Clockdomain, clkdm2: &Clockdomain) -> PrcmResult<bool> {
        self.call("read_sleepdep")?;
        Ok(self.sleepdeps.lock().contains(&(clkdm1.name(), clkdm2.name())))
    }

    fn clear_all_sleepdeps(
        &self,
        clkdm: &Clockdomain,
        targets: &[&Clockdomain],
    ) -> PrcmResult<()> {
        self.call("clear_all_sleepdeps")?;
        let mut sleepdeps = self.sleepdeps.lock();
        for target in targets {
            sleepdeps.remove(&(clkdm.name(), target.name()));
        }
        Ok(())
    }

    fn clkdm_sleep(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        self.call("clkdm_sleep")
    }

    fn clkdm_wakeup(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        self.call("clkdm_wakeup")
    }

    fn clkdm_allow_idle(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        self.call("clkdm_allow_idle")
    }

    fn clkdm_deny_idle(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        self.call("clkdm_deny_idle")
    }

    fn clkdm_clk_enable(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        self.call("clkdm_clk_enable")
    }

    fn clkdm_clk_disable(&self, _clkdm: &Clockdomain) -> PrcmResult<()> {
        self.call("clkdm_clk_disable")
    }
}

// =============================================================================
// POWERDOMAIN
// =============================================================================

/// Simulated power state registers of one powerdomain
#[derive(Debug, Clone, Copy)]
pub struct SimPwrdm {
    pub next: PowerState,
    pub cur: PowerState,
    pub prev: PowerState,
    pub logic: PowerState,
    pub prev_logic: PowerState,
    pub logic_retst: PowerState,
    pub mem: [PowerState; PWRDM_MAX_MEM_BANKS],
    pub prev_mem: [PowerState; PWRDM_MAX_MEM_BANKS],
    pub mem_retst: [PowerState; PWRDM_MAX_MEM_BANKS],
    pub mem_onst: [PowerState; PWRDM_MAX_MEM_BANKS],
    /// Transition never completes
    pub stuck: bool,
    pub sar: bool,
}

impl Default for SimPwrdm {
    fn default() -> Self {
        Self {
            next: PowerState::On,
            cur: PowerState::On,
            prev: PowerState::On,
            logic: PowerState::On,
            prev_logic: PowerState::On,
            logic_retst: PowerState::On,
            mem: [PowerState::On; PWRDM_MAX_MEM_BANKS],
            prev_mem: [PowerState::On; PWRDM_MAX_MEM_BANKS],
            mem_retst: [PowerState::On; PWRDM_MAX_MEM_BANKS],
            mem_onst: [PowerState::On; PWRDM_MAX_MEM_BANKS],
            stuck: false,
            sar: false,
        }
    }
}

/// Powerdomain adapter over simulated registers, keyed by domain name
#[derive(Default)]
pub struct MockPwrdmOps {
    calls: Calls,
    sims: Mutex<BTreeMap<&'static str, SimPwrdm>>,
}

impl MockPwrdmOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.calls.get(op)
    }

    pub fn reset_calls(&self) {
        self.calls.reset();
    }

    /// Snapshot of a domain's registers
    pub fn sim(&self, name: &'static str) -> SimPwrdm {
        self.sims.lock().get(name).copied().unwrap_or_default()
    }

    pub fn update(&self, name: &'static str, f: impl FnOnce(&mut SimPwrdm)) {
        f(self.sims.lock().entry(name).or_default());
    }

    /// Pretend the domain went through `entered` and came back
    pub fn simulate_sleep(
        &self,
        name: &'static str,
        entered: PowerState,
        logic: PowerState,
        mem: &[PowerState],
    ) {
        self.update(name, |hw| {
            hw.prev = entered;
            hw.prev_logic = logic;
            for (bank, &st) in mem.iter().enumerate() {
                hw.prev_mem[bank] = st;
            }
        });
    }

    fn with<T>(
        &self,
        op: &'static str,
        pwrdm: &Powerdomain,
        f: impl FnOnce(&mut SimPwrdm) -> T,
    ) -> T {
        self.calls.hit(op);
        f(self.sims.lock().entry(pwrdm.name()).or_default())
    }
}

impl PwrdmOps for MockPwrdmOps {
    fn set_next_pwrst(&self, pwrdm: &Powerdomain, pwrst: PowerState) -> PrcmResult<()> {
        self.with("set_next_pwrst", pwrdm, |hw| hw.next = pwrst);
        Ok(())
    }

    fn read_next_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(self.with("read_next_pwrst", pwrdm, |hw| hw.next))
    }

    fn read_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(self.with("read_pwrst", pwrdm, |hw| hw.cur))
    }

    fn read_prev_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(self.with("read_prev_pwrst", pwrdm, |hw| hw.prev))
    }

    fn set_logic_retst(&self, pwrdm: &Powerdomain, pwrst: PowerState) -> PrcmResult<()> {
        self.with("set_logic_retst", pwrdm, |hw| hw.logic_retst = pwrst);
        Ok(())
    }

    fn read_logic_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(self.with("read_logic_pwrst", pwrdm, |hw| hw.logic))
    }

    fn read_prev_logic_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(self.with("read_prev_logic_pwrst", pwrdm, |hw| hw.prev_logic))
    }

    fn read_logic_retst(&self, pwrdm: &Powerdomain) -> PrcmResult<PowerState> {
        Ok(self.with("read_logic_retst", pwrdm, |hw| hw.logic_retst))
    }

    fn set_mem_onst(&self, pwrdm: &Powerdomain, bank: u8, pwrst: PowerState) -> PrcmResult<()> {
        self.with("set_mem_onst", pwrdm, |hw| hw.mem_onst[bank as usize] = pwrst);
        Ok(())
    }

    fn set_mem_retst(&self, pwrdm: &Powerdomain, bank: u8, pwrst: PowerState) -> PrcmResult<()> {
        self.with("set_mem_retst", pwrdm, |hw| hw.mem_retst[bank as usize] = pwrst);
        Ok(())
    }

    fn read_mem_pwrst(&self, pwrdm: &Powerdomain, bank: u8) -> PrcmResult<PowerState> {
        Ok(self.with("read_mem_pwrst", pwrdm, |hw| hw.mem[bank as usize]))
    }

    fn read_prev_mem_pwrst(&self, pwrdm: &Powerdomain, bank: u8) -> PrcmResult<PowerState> {
        Ok(self.with("read_prev_mem_pwrst", pwrdm, |hw| hw.prev_mem[bank as usize]))
    }

    fn read_mem_retst(&self, pwrdm: &Powerdomain, bank: u8) -> PrcmResult<PowerState> {
        Ok(self.with("read_mem_retst", pwrdm, |hw| hw.mem_retst[bank as usize]))
    }

    fn clear_all_prev_pwrst(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.with("clear_all_prev_pwrst", pwrdm, |hw| {
            hw.prev = hw.cur;
            hw.prev_logic = hw.logic;
            hw.prev_mem = hw.mem;
        });
        Ok(())
    }

    fn enable_hdwr_sar(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.with("enable_hdwr_sar", pwrdm, |hw| hw.sar = true);
        Ok(())
    }

    fn disable_hdwr_sar(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.with("disable_hdwr_sar", pwrdm, |hw| hw.sar = false);
        Ok(())
    }

    fn set_lowpwrstchange(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        self.with("set_lowpwrstchange", pwrdm, |_| ());
        Ok(())
    }

    fn wait_transition(&self, pwrdm: &Powerdomain) -> PrcmResult<()> {
        if self.with("wait_transition", pwrdm, |hw| hw.stuck) {
            return Err(PrcmError::Timeout);
        }
        Ok(())
    }
}

// =============================================================================
// FIXTURE
// =============================================================================

/// Registrar with both domain adapters already installed
pub fn registrar_with_mocks() -> (Registrar, Arc<MockClkdmOps>, Arc<MockPwrdmOps>) {
    let clkdm_ops = Arc::new(MockClkdmOps::new());
    let pwrdm_ops = Arc::new(MockPwrdmOps::new());
    let mut reg = Registrar::new();
    reg.register_clkdm_ops(clkdm_ops.clone()).unwrap();
    reg.register_pwrdm_ops(pwrdm_ops.clone()).unwrap();
    (reg, clkdm_ops, pwrdm_ops)
}

const VOLTDMS: &[VoltagedomainDesc] = &[VoltagedomainDesc { name: "core" }];

const PWRDMS: &[PowerdomainDesc] = &[
    PowerdomainDesc {
        name: "wkup_pwrdm",
        voltdm: "core",
        ..PowerdomainDesc::DEFAULT
    },
    PowerdomainDesc {
        name: "core_pwrdm",
        voltdm: "core",
        pwrsts: PowerStates::OFF_RET_ON,
        pwrsts_logic_ret: PowerStates::OFF_RET,
        banks: 2,
        pwrsts_mem_ret: [PowerStates::OFF_RET; PWRDM_MAX_MEM_BANKS],
        pwrsts_mem_on: [PowerStates::ON; PWRDM_MAX_MEM_BANKS],
        ..PowerdomainDesc::DEFAULT
    },
    PowerdomainDesc {
        name: "per_pwrdm",
        voltdm: "core",
        pwrsts: PowerStates::RET_ON,
        pwrsts_logic_ret: PowerStates::RET,
        ..PowerdomainDesc::DEFAULT
    },
];

const CLKDMS: &[ClockdomainDesc] = &[
    ClockdomainDesc {
        name: "wkup_clkdm",
        pwrdm: "wkup_pwrdm",
        flags: ClkdmFlags::NO_AUTODEPS,
        ..ClockdomainDesc::DEFAULT
    },
    ClockdomainDesc {
        name: "core_l3_clkdm",
        pwrdm: "core_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP_SWSUP,
        wkdep_srcs: &["wkup_clkdm"],
        ..ClockdomainDesc::DEFAULT
    },
    ClockdomainDesc {
        name: "core_l4_clkdm",
        pwrdm: "core_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP,
        wkdep_srcs: &["core_l3_clkdm", "wkup_clkdm"],
        ..ClockdomainDesc::DEFAULT
    },
    ClockdomainDesc {
        name: "per_clkdm",
        pwrdm: "per_pwrdm",
        flags: ClkdmFlags::CAN_HWSUP_SWSUP,
        wkdep_srcs: &["core_l4_clkdm"],
        sleepdep_srcs: &["core_l3_clkdm"],
        ..ClockdomainDesc::DEFAULT
    },
];

/// Resolved reference graph with handles on every mock
pub struct Fixture {
    pub prcm: Prcm,
    pub clkdm_ops: Arc<MockClkdmOps>,
    pub pwrdm_ops: Arc<MockPwrdmOps>,
    pub core_ops: Arc<MockClockOps>,
    pub uart_ops: Arc<MockClockOps>,
    pub gpio_ops: Arc<MockClockOps>,
}

impl Fixture {
    pub fn clock(&self, name: &str) -> ClockId {
        self.prcm.lookup_clock(name).unwrap().id()
    }

    pub fn clkdm(&self, name: &str) -> ClkdmId {
        self.prcm.lookup_clockdomain(name).unwrap().id()
    }

    pub fn pwrdm(&self, name: &str) -> PwrdmId {
        self.prcm.lookup_powerdomain(name).unwrap().id()
    }
}

/// Three powerdomains on one rail, four clockdomains and a six-clock tree:
///
/// ```text
/// osc (26 MHz) -> sys_ck (/2) -> core_ck [core_l3] -> l4_ck (/2) [core_l4]
///                                                       ├─ uart_fck [core_l4]
///                                                       └─ gpio_fck [per]
/// ```
///
/// `complete_init` has not run and the mock call counters start at zero.
pub fn fixture() -> Fixture {
    let (mut reg, clkdm_ops, pwrdm_ops) = registrar_with_mocks();
    let core_ops = Arc::new(MockClockOps::new());
    let uart_ops = Arc::new(MockClockOps::with_idlest());
    let gpio_ops = Arc::new(MockClockOps::new());

    reg.register_voltagedomains(VOLTDMS).unwrap();
    reg.register_powerdomains(PWRDMS).unwrap();
    reg.register_clockdomains(CLKDMS).unwrap();
    reg.register_autodeps(&["wkup_clkdm"]).unwrap();
    reg.register_clocks([
        ClockDesc::new("osc").rate(RateSource::Fixed(26_000_000)),
        ClockDesc::new("sys_ck")
            .parent("osc")
            .rate(RateSource::FixedDivisor(2)),
        ClockDesc::new("core_ck")
            .parent("sys_ck")
            .clkdm("core_l3_clkdm")
            .flags(ClockFlags::CLOCK_IDLE_CONTROL)
            .rate(RateSource::Adapter)
            .ops(core_ops.clone()),
        ClockDesc::new("l4_ck")
            .parent("core_ck")
            .clkdm("core_l4_clkdm")
            .rate(RateSource::FixedDivisor(2)),
        ClockDesc::new("uart_fck")
            .parent("l4_ck")
            .clkdm("core_l4_clkdm")
            .enable_reg(0x00, 13)
            .ops(uart_ops.clone()),
        ClockDesc::new("gpio_fck")
            .parent("l4_ck")
            .clkdm("per_clkdm")
            .flags(ClockFlags::ENABLE_ON_INIT)
            .enable_reg(0x00, 14)
            .ops(gpio_ops.clone()),
    ])
    .unwrap();

    let prcm = reg.resolve().unwrap();
    clkdm_ops.reset_calls();
    pwrdm_ops.reset_calls();

    Fixture {
        prcm,
        clkdm_ops,
        pwrdm_ops,
        core_ops,
        uart_ops,
        gpio_ops,
    }
}
