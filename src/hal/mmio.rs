//! Memory-mapped register access
//!
//! Every peripheral driver in this crate talks to hardware through a
//! [`RegisterBus`]. On the board that bus is [`Volatile`], which performs
//! volatile 32-bit loads and stores at the physical address. Host-side tests
//! substitute the simulator in [`crate::sim`].

use core::ptr::{read_volatile, write_volatile};

/// Memory-mapped I/O register wrapper for hardware access
pub struct Mmio<T> {
    addr: *mut T,
}

impl<T> Mmio<T> {
    /// Create a new MMIO register at the given address
    ///
    /// # Safety
    /// The caller must ensure the address is valid and points to a hardware register
    pub const unsafe fn new(addr: u32) -> Self {
        Self {
            addr: addr as usize as *mut T,
        }
    }

    /// Read from the register
    pub fn read(&self) -> T
    where
        T: Copy,
    {
        unsafe { read_volatile(self.addr) }
    }

    /// Write to the register
    pub fn write(&self, value: T) {
        unsafe { write_volatile(self.addr, value) }
    }

    /// Modify the register using a closure
    pub fn modify<F>(&self, f: F)
    where
        T: Copy,
        F: FnOnce(T) -> T,
    {
        let value = self.read();
        self.write(f(value));
    }
}

/// 32-bit register access by physical address.
///
/// Implementations must not reorder or coalesce accesses: each call is one
/// bus transaction, in program order.
pub trait RegisterBus {
    /// Read the 32-bit register at `addr`.
    fn read(&self, addr: u32) -> u32;

    /// Write `value` to the 32-bit register at `addr`.
    fn write(&self, addr: u32, value: u32);

    /// Read-modify-write the register at `addr`.
    fn modify<F>(&self, addr: u32, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(addr);
        self.write(addr, f(value));
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for &B {
    #[inline]
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    #[inline]
    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value);
    }
}

/// The physical peripheral bus of the BCM2837.
///
/// Only meaningful when running bare-metal on the board with the peripheral
/// window identity-mapped at [`super::PERIPHERAL_BASE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Volatile;

impl RegisterBus for Volatile {
    #[inline(always)]
    fn read(&self, addr: u32) -> u32 {
        let reg = unsafe { Mmio::<u32>::new(addr) };
        reg.read()
    }

    #[inline(always)]
    fn write(&self, addr: u32, value: u32) {
        let reg = unsafe { Mmio::<u32>::new(addr) };
        reg.write(value);
    }
}
