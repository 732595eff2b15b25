//! Hardware random number generator
//!
//! The RNG block collects entropy into a small FIFO of 32-bit words. The
//! count of ready words sits in the top byte of the status register.

use super::mmio::{RegisterBus, Volatile};
use super::RNG_BASE;

const RNG_CTRL: u32 = 0x00;
const RNG_STATUS: u32 = 0x04;
const RNG_DATA: u32 = 0x08;
const RNG_INT_MASK: u32 = 0x10;

const RNG_CTRL_EN: u32 = 1;
const RNG_INT_OFF: u32 = 1;
/// Initial warm-up count, the number of bits discarded before the FIFO fills
const RNG_WARMUP_COUNT: u32 = 0x0004_0000;
const RNG_READY_SHIFT: u32 = 24;

/// Hardware random number generator
#[derive(Debug, Clone, Copy)]
pub struct HardwareRng<B = Volatile> {
    base: u32,
    bus: B,
}

impl HardwareRng<Volatile> {
    /// Create the RNG driver for the physical peripheral
    pub const fn new() -> Self {
        Self::with_bus(Volatile)
    }
}

impl Default for HardwareRng<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> HardwareRng<B> {
    /// Create an RNG driver at [`RNG_BASE`] on the given bus
    pub const fn with_bus(bus: B) -> Self {
        Self {
            base: RNG_BASE,
            bus,
        }
    }
}

impl<B: RegisterBus> HardwareRng<B> {
    /// Start the generator and wait until the first word of entropy is ready
    pub fn init(&self) {
        self.bus.write(self.base + RNG_STATUS, RNG_WARMUP_COUNT);
        self.bus.modify(self.base + RNG_INT_MASK, |val| val | RNG_INT_OFF);
        self.bus.modify(self.base + RNG_CTRL, |val| val | RNG_CTRL_EN);

        while self.available() == 0 {
            core::hint::spin_loop();
        }
        debug!("hardware RNG ready");
    }

    /// Words of entropy waiting in the FIFO
    pub fn available(&self) -> u32 {
        self.bus.read(self.base + RNG_STATUS) >> RNG_READY_SHIFT
    }

    /// Next random word, blocking until one is ready
    pub fn get_random(&self) -> u32 {
        while self.available() == 0 {
            core::hint::spin_loop();
        }
        self.bus.read(self.base + RNG_DATA)
    }

    /// Fill `buf` with random bytes
    pub fn fill_bytes(&self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(4) {
            let word = self.get_random().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[test]
    fn init_programs_warmup_mask_and_enable() {
        let sim = SimBus::new();
        sim.poke(RNG_BASE + RNG_INT_MASK, 0b100);
        let rng = HardwareRng::with_bus(&sim);

        rng.init();

        assert_eq!(sim.peek(RNG_BASE + RNG_CTRL) & RNG_CTRL_EN, RNG_CTRL_EN);
        // mask bit added, other bits kept
        assert_eq!(sim.peek(RNG_BASE + RNG_INT_MASK), 0b101);
        assert_eq!(sim.peek(RNG_BASE + RNG_STATUS) & 0x00FF_FFFF, RNG_WARMUP_COUNT);
        assert!(rng.available() > 0);
    }

    #[test]
    fn words_are_read_from_the_data_register() {
        let sim = SimBus::new();
        let rng = HardwareRng::with_bus(&sim);
        rng.init();

        let first = rng.get_random();
        let second = rng.get_random();
        assert_ne!(first, second);

        let mut buf = [0u8; 7];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
