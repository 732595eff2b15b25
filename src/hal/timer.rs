//! System timer for BCM2837
//!
//! Free-running 64-bit counter clocked at 1 MHz. Provides the microsecond
//! tick source, blocking delays and the timeout checks used by SPI0.

use super::mmio::{RegisterBus, Volatile};
use super::TIMER_BASE;
use embedded_hal::delay::DelayNs;

/// System timer counter lower 32 bits
const TIMER_CLO: u32 = 0x04;
/// System timer counter upper 32 bits
const TIMER_CHI: u32 = 0x08;

/// System timer for BCM2837
#[derive(Debug, Clone, Copy)]
pub struct SystemTimer<B = Volatile> {
    base: u32,
    bus: B,
}

impl SystemTimer<Volatile> {
    /// Create a new system timer
    pub const fn new() -> Self {
        Self::with_bus(Volatile)
    }
}

impl Default for SystemTimer<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> SystemTimer<B> {
    /// Create a system timer at [`TIMER_BASE`] on the given bus
    pub const fn with_bus(bus: B) -> Self {
        Self {
            base: TIMER_BASE,
            bus,
        }
    }
}

impl<B: RegisterBus> SystemTimer<B> {
    /// Microseconds since boot
    pub fn get_ticks(&self) -> u64 {
        let high = self.bus.read(self.base + TIMER_CHI);
        let low = self.bus.read(self.base + TIMER_CLO);

        // CLO wrapped between the two reads, take both again
        let (high, low) = if self.bus.read(self.base + TIMER_CHI) == high {
            (high, low)
        } else {
            (
                self.bus.read(self.base + TIMER_CHI),
                self.bus.read(self.base + TIMER_CLO),
            )
        };

        (u64::from(high) << 32) | u64::from(low)
    }

    /// Busy-wait for `us` microseconds
    pub fn delay_us(&self, us: u32) {
        let start = self.get_ticks();
        while !self.is_timeout(start, us) {
            core::hint::spin_loop();
        }
    }

    /// Busy-wait for `ms` milliseconds
    pub fn delay_ms(&self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }

    /// Check whether `timeout_us` has elapsed since `start`
    pub fn is_timeout(&self, start: u64, timeout_us: u32) -> bool {
        self.get_ticks().wrapping_sub(start) >= u64::from(timeout_us)
    }
}

impl<B: RegisterBus> DelayNs for SystemTimer<B> {
    fn delay_ns(&mut self, ns: u32) {
        SystemTimer::delay_us(self, ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        SystemTimer::delay_us(self, us);
    }

    fn delay_ms(&mut self, ms: u32) {
        SystemTimer::delay_ms(self, ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[test]
    fn ticks_combine_both_halves() {
        let sim = SimBus::new();
        sim.set_ticks(0x0000_0002_FFFF_FF00);
        let timer = SystemTimer::with_bus(&sim);

        let ticks = timer.get_ticks();
        assert_eq!(ticks >> 32, 2);
        assert!(ticks >= 0x0000_0002_FFFF_FF00);
    }

    #[test]
    fn low_word_wrap_rereads_high_word() {
        let sim = SimBus::new();
        // CLO advances on every read, so this wraps between CHI reads
        sim.set_ticks(0x0000_0000_FFFF_FFFF);
        let timer = SystemTimer::with_bus(&sim);

        let ticks = timer.get_ticks();
        assert_eq!(ticks >> 32, 1);
    }

    #[test]
    fn delay_waits_at_least_the_requested_time() {
        let sim = SimBus::new();
        let timer = SystemTimer::with_bus(&sim);

        let start = timer.get_ticks();
        timer.delay_us(250);
        assert!(timer.get_ticks() - start >= 250);
        assert!(timer.is_timeout(start, 250));
    }

    #[test]
    fn delay_ns_rounds_up_to_whole_microseconds() {
        let sim = SimBus::new();
        let mut timer = SystemTimer::with_bus(&sim);

        let start = timer.get_ticks();
        DelayNs::delay_ns(&mut timer, 1);
        assert!(timer.get_ticks() - start >= 1);
    }
}
