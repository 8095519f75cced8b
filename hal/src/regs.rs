//! # Register Access
//!
//! The narrow `read(addr) / write(addr, value)` collaborator every
//! architecture adapter is written against, with two backends:
//!
//! - [`Mmio`]: volatile accesses relative to a mapped base address
//! - [`RegisterFile`]: a sparse in-memory register bank (host builds,
//!   simulation and tests)
//!
//! Addresses are 32-bit offsets from the backend's base. Register values
//! are always 32 bits wide.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use spin::Mutex;

// =============================================================================
// RegisterAccess
// =============================================================================

/// 32-bit register read/write collaborator
pub trait RegisterAccess: Send + Sync {
    /// Read the register at `addr`
    fn read(&self, addr: u32) -> u32;

    /// Write `value` to the register at `addr`
    fn write(&self, addr: u32, value: u32);

    /// Read-modify-write: replace the bits selected by `mask` with `value`
    /// (already shifted into position). Returns the value written.
    fn rmw(&self, addr: u32, mask: u32, value: u32) -> u32 {
        let v = (self.read(addr) & !mask) | (value & mask);
        self.write(addr, v);
        v
    }

    /// Set the bits in `mask`
    fn set_bits(&self, addr: u32, mask: u32) {
        self.rmw(addr, mask, mask);
    }

    /// Clear the bits in `mask`
    fn clear_bits(&self, addr: u32, mask: u32) {
        self.rmw(addr, mask, 0);
    }

    /// Read the field selected by `mask`, shifted down to bit 0
    fn read_field(&self, addr: u32, mask: u32) -> u32 {
        if mask == 0 {
            return 0;
        }
        (self.read(addr) & mask) >> mask.trailing_zeros()
    }

    /// Write `value` into the field selected by `mask`
    fn write_field(&self, addr: u32, mask: u32, value: u32) {
        if mask == 0 {
            return;
        }
        self.rmw(addr, mask, value << mask.trailing_zeros());
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for alloc::sync::Arc<T> {
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value)
    }
}

// =============================================================================
// Mmio
// =============================================================================

/// Volatile memory-mapped register window
#[derive(Debug)]
pub struct Mmio {
    base: usize,
    len: usize,
}

impl Mmio {
    /// Create a register window over `[base, base + len)`
    ///
    /// # Safety
    ///
    /// The range must be mapped as device memory for the lifetime of the
    /// returned value, and no other code may assume exclusive ownership of
    /// the registers in it.
    pub const unsafe fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    /// Base address of the window
    pub fn base(&self) -> usize {
        self.base
    }

    /// Pointer to the register at `addr`, or `None` when the offset is
    /// misaligned or outside the window
    #[inline]
    fn ptr(&self, addr: u32) -> Option<*mut u32> {
        let off = addr as usize;
        let inside = off % 4 == 0 && off.checked_add(4).is_some_and(|end| end <= self.len);
        if inside {
            Some((self.base + off) as *mut u32)
        } else {
            log::error!("mmio: offset {:#x} outside window of {:#x} bytes", off, self.len);
            None
        }
    }
}

// SAFETY: the window is plain device memory; accesses are single volatile
// 32-bit operations and callers serialize read-modify-write sequences.
unsafe impl Send for Mmio {}
// SAFETY: see above.
unsafe impl Sync for Mmio {}

/// Out-of-window reads return 0 and out-of-window writes are dropped.
impl RegisterAccess for Mmio {
    #[inline]
    fn read(&self, addr: u32) -> u32 {
        match self.ptr(addr) {
            // SAFETY: `ptr` bounds-checks the offset; `new` guarantees the
            // window is mapped.
            Some(reg) => unsafe { core::ptr::read_volatile(reg) },
            None => 0,
        }
    }

    #[inline]
    fn write(&self, addr: u32, value: u32) {
        if let Some(reg) = self.ptr(addr) {
            // SAFETY: as for `read`.
            unsafe { core::ptr::write_volatile(reg, value) }
        }
    }
}

// =============================================================================
// RegisterFile
// =============================================================================

/// Sparse in-memory register bank. Unwritten registers read as zero.
#[derive(Debug, Default)]
pub struct RegisterFile {
    regs: Mutex<BTreeMap<u32, u32>>,
    writes: Mutex<Vec<(u32, u32)>>,
    trace: bool,
}

impl RegisterFile {
    /// Create an empty register bank
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a register bank that records every write in order
    pub fn with_trace() -> Self {
        Self {
            trace: true,
            ..Self::default()
        }
    }

    /// Preload a register without recording it as a write
    pub fn poke(&self, addr: u32, value: u32) {
        self.regs.lock().insert(addr, value);
    }

    /// Read a register without side effects
    pub fn peek(&self, addr: u32) -> u32 {
        self.regs.lock().get(&addr).copied().unwrap_or(0)
    }

    /// Recorded writes (empty unless created with [`RegisterFile::with_trace`])
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.writes.lock().clone()
    }

    /// Number of recorded writes to `addr`
    pub fn write_count(&self, addr: u32) -> usize {
        self.writes.lock().iter().filter(|(a, _)| *a == addr).count()
    }

    /// Forget recorded writes
    pub fn clear_trace(&self) {
        self.writes.lock().clear();
    }
}

impl RegisterAccess for RegisterFile {
    fn read(&self, addr: u32) -> u32 {
        self.peek(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        #[cfg(feature = "debug")]
        log::trace!("regs: write {:#010x} <- {:#010x}", addr, value);

        self.regs.lock().insert(addr, value);
        if self.trace {
            self.writes.lock().push((addr, value));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
