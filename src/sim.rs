//! Register-level simulator of the GPIO, SPI0, system timer and RNG blocks
//!
//! [`SimBus`] answers the same addresses as the BCM2837 and reproduces the
//! behaviour the drivers depend on:
//!
//! - GPIO: function select, set/clear latching into the output latch,
//!   levels that follow the latch for outputs and [`SimBus::drive`] for
//!   everything else, rising/falling edge detect with write-1-to-clear
//!   status, and the GPPUD/GPPUDCLK pull latch.
//! - SPI0: 16-entry TX and RX FIFOs, one-shot FIFO clears, TA/DONE/TXD/RXD
//!   flags, and a slave that echoes MOSI ([`Miso::Loopback`]) or answers a
//!   fixed byte. Bytes shift only while TA is set and the RX FIFO has room.
//! - System timer: CLO/CHI advance by one microsecond on every CLO read so
//!   delays and timeouts terminate.
//! - RNG: once enabled, each status read adds a word of entropy (up to four)
//!   and each data read consumes one from an xorshift sequence.
//!
//! [`SimBus::tag_mosi`] records the level of one GPIO (a display DC line,
//! say) next to every byte shifted out on MOSI.
//!
//! Register accesses through the [`RegisterBus`] impl are counted;
//! [`SimBus::peek`] and [`SimBus::poke`] bypass the counter.

#![cfg(any(test, feature = "sim"))]

use crate::hal::gpio::Level;
use crate::hal::mmio::RegisterBus;
use crate::hal::{GPIO_BASE, RNG_BASE, SPI0_BASE, TIMER_BASE};
use core::cell::RefCell;
use heapless::{Deque, Vec};

const FIFO_DEPTH: usize = 16;
const MOSI_LOG_LEN: usize = 256;

const CS_TA: u32 = 1 << 7;
const CS_CLEAR_TX: u32 = 1 << 4;
const CS_CLEAR_RX: u32 = 1 << 5;
const CS_DONE: u32 = 1 << 16;
const CS_RXD: u32 = 1 << 17;
const CS_TXD: u32 = 1 << 18;
const CS_RXR: u32 = 1 << 19;
const CS_RXF: u32 = 1 << 20;
/// CS bits that hold their written value
const CS_WRITABLE: u32 = 0x03E0_3FCF;

/// What the simulated SPI slave sends back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miso {
    /// Echo every byte (MOSI wired to MISO)
    Loopback,
    /// Answer the same byte for every byte sent
    Fixed(u8),
}

struct Gpio {
    fsel: [u32; 6],
    latch: u64,
    inputs: u64,
    rising: u64,
    falling: u64,
    events: u64,
    pud: u32,
    pud_clk: [u32; 2],
    pulls: [u8; 54],
}

struct Spi {
    cs: u32,
    clk: u32,
    dlen: u32,
    tx: Deque<u8, FIFO_DEPTH>,
    rx: Deque<u8, FIFO_DEPTH>,
    miso: Miso,
    stalled: bool,
    overruns: u32,
    underruns: u32,
    mosi: Vec<u8, MOSI_LOG_LEN>,
    /// Level of the tagged pin while the current bytes shift
    tag_level: Option<bool>,
    tags: Vec<bool, MOSI_LOG_LEN>,
}

const RNG_READY_MAX: u32 = 4;

struct Rng {
    ctrl: u32,
    status: u32,
    int_mask: u32,
    ready: u32,
    seed: u32,
}

impl Rng {
    fn status(&self) -> u32 {
        (self.ready << 24) | (self.status & 0x00FF_FFFF)
    }

    fn read(&mut self, offset: u32) -> u32 {
        match offset {
            0x00 => self.ctrl,
            0x04 => {
                if self.ctrl & 1 != 0 && self.ready < RNG_READY_MAX {
                    self.ready += 1;
                }
                self.status()
            }
            0x08 => {
                self.ready = self.ready.saturating_sub(1);
                self.seed ^= self.seed << 13;
                self.seed ^= self.seed >> 17;
                self.seed ^= self.seed << 5;
                self.seed
            }
            0x10 => self.int_mask,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            0x00 => self.ctrl = value,
            0x04 => self.status = value & 0x00FF_FFFF,
            0x10 => self.int_mask = value,
            _ => {}
        }
    }
}

struct State {
    gpio: Gpio,
    spi: Spi,
    rng: Rng,
    tag_pin: Option<u8>,
    ticks: u64,
    accesses: usize,
}

/// Simulated peripheral bus
pub struct SimBus {
    state: RefCell<State>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// All registers at their reset values, loopback slave
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                gpio: Gpio {
                    fsel: [0; 6],
                    latch: 0,
                    inputs: 0,
                    rising: 0,
                    falling: 0,
                    events: 0,
                    pud: 0,
                    pud_clk: [0; 2],
                    pulls: [0; 54],
                },
                spi: Spi {
                    cs: 0,
                    clk: 0,
                    dlen: 0,
                    tx: Deque::new(),
                    rx: Deque::new(),
                    miso: Miso::Loopback,
                    stalled: false,
                    overruns: 0,
                    underruns: 0,
                    mosi: Vec::new(),
                    tag_level: None,
                    tags: Vec::new(),
                },
                rng: Rng {
                    ctrl: 0,
                    status: 0,
                    int_mask: 0,
                    ready: 0,
                    seed: 0x2545_F491,
                },
                tag_pin: None,
                ticks: 0,
                accesses: 0,
            }),
        }
    }

    /// Drive an external level onto a pin (seen when it is not an output)
    pub fn drive(&self, pin: u8, level: Level) {
        let mut state = self.state.borrow_mut();
        let before = state.gpio.levels();
        let bit = 1u64 << pin;
        match level {
            Level::High => state.gpio.inputs |= bit,
            Level::Low => state.gpio.inputs &= !bit,
        }
        state.gpio.latch_edges(before);
    }

    /// Pull setting latched for `pin` by the last GPPUD/GPPUDCLK sequence
    pub fn pull(&self, pin: u8) -> u32 {
        u32::from(self.state.borrow().gpio.pulls[usize::from(pin)])
    }

    /// Choose what the SPI slave answers
    pub fn set_miso(&self, miso: Miso) {
        self.state.borrow_mut().spi.miso = miso;
    }

    /// Freeze the SPI shifter: TXD and DONE stay low, nothing moves
    pub fn stall_spi(&self, stalled: bool) {
        self.state.borrow_mut().spi.stalled = stalled;
    }

    /// Bytes written while the TX FIFO was full
    pub fn spi_overruns(&self) -> u32 {
        self.state.borrow().spi.overruns
    }

    /// Reads of an empty RX FIFO
    pub fn spi_underruns(&self) -> u32 {
        self.state.borrow().spi.underruns
    }

    /// Bytes shifted out on MOSI so far (first 256)
    pub fn mosi_log(&self) -> Vec<u8, MOSI_LOG_LEN> {
        self.state.borrow().spi.mosi.clone()
    }

    /// Record the level of `pin` next to every MOSI byte from now on
    pub fn tag_mosi(&self, pin: u8) {
        self.state.borrow_mut().tag_pin = Some(pin);
    }

    /// Tagged pin level for each byte in [`mosi_log`](Self::mosi_log)
    /// shifted since [`tag_mosi`](Self::tag_mosi)
    pub fn mosi_tags(&self) -> Vec<bool, MOSI_LOG_LEN> {
        self.state.borrow().spi.tags.clone()
    }

    /// Set the free-running counter
    pub fn set_ticks(&self, ticks: u64) {
        self.state.borrow_mut().ticks = ticks;
    }

    /// Register reads and writes made through the bus
    pub fn access_count(&self) -> usize {
        self.state.borrow().accesses
    }

    /// Read a register without side effects or counting
    pub fn peek(&self, addr: u32) -> u32 {
        self.state.borrow().peek(addr)
    }

    /// Store a raw register value without side effects or counting
    pub fn poke(&self, addr: u32, value: u32) {
        self.state.borrow_mut().poke(addr, value);
    }
}

impl RegisterBus for SimBus {
    fn read(&self, addr: u32) -> u32 {
        let mut state = self.state.borrow_mut();
        state.accesses += 1;
        state.read(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        let mut state = self.state.borrow_mut();
        state.accesses += 1;
        state.write(addr, value);
    }
}

/// Read 32 bits of a 54-bit per-pin field
fn bank(bits: u64, index: u32) -> u32 {
    (bits >> (index * 32)) as u32
}

/// Replace 32 bits of a 54-bit per-pin field
fn set_bank(bits: &mut u64, index: u32, value: u32) {
    let shift = index * 32;
    let mask = 0xFFFF_FFFFu64 << shift;
    *bits = (*bits & !mask) | ((u64::from(value) << shift) & mask);
    *bits &= (1 << 54) - 1;
}

impl Gpio {
    fn outputs(&self) -> u64 {
        (0..54u32).fold(0, |acc, pin| {
            let code = (self.fsel[(pin / 10) as usize] >> ((pin % 10) * 3)) & 0b111;
            if code == 0b001 {
                acc | (1 << pin)
            } else {
                acc
            }
        })
    }

    fn levels(&self) -> u64 {
        let outputs = self.outputs();
        (self.latch & outputs) | (self.inputs & !outputs)
    }

    fn latch_edges(&mut self, before: u64) {
        let after = self.levels();
        self.events |= (!before & after & self.rising) | (before & !after & self.falling);
    }

    fn read(&self, offset: u32) -> u32 {
        match offset {
            0x00..=0x14 => self.fsel[(offset / 4) as usize],
            0x34 | 0x38 => bank(self.levels(), (offset - 0x34) / 4),
            0x40 | 0x44 => bank(self.events, (offset - 0x40) / 4),
            0x4C | 0x50 => bank(self.rising, (offset - 0x4C) / 4),
            0x58 | 0x5C => bank(self.falling, (offset - 0x58) / 4),
            0x94 => self.pud,
            0x98 | 0x9C => self.pud_clk[((offset - 0x98) / 4) as usize],
            // SET/CLR are write-only
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        let before = self.levels();
        match offset {
            0x00..=0x14 => self.fsel[(offset / 4) as usize] = value,
            0x1C | 0x20 => self.latch |= u64::from(value) << ((offset - 0x1C) * 8),
            0x28 | 0x2C => self.latch &= !(u64::from(value) << ((offset - 0x28) * 8)),
            0x40 | 0x44 => self.events &= !(u64::from(value) << ((offset - 0x40) * 8)),
            0x4C | 0x50 => set_bank(&mut self.rising, (offset - 0x4C) / 4, value),
            0x58 | 0x5C => set_bank(&mut self.falling, (offset - 0x58) / 4, value),
            0x94 => self.pud = value & 0b11,
            0x98 | 0x9C => {
                let index = ((offset - 0x98) / 4) as usize;
                // a rising clock bit samples the control signal into the pin
                let clocked = value & !self.pud_clk[index];
                for bit in 0..32 {
                    let pin = index * 32 + bit;
                    if clocked & (1 << bit) != 0 && pin < 54 {
                        self.pulls[pin] = self.pud as u8;
                    }
                }
                self.pud_clk[index] = value;
            }
            _ => {}
        }
        self.latch &= (1 << 54) - 1;
        self.latch_edges(before);
    }
}

impl Spi {
    /// Move bytes through the shifter while a transfer is active
    fn shift(&mut self) {
        if self.cs & CS_TA == 0 || self.stalled {
            return;
        }
        while !self.rx.is_full() {
            let Some(byte) = self.tx.pop_front() else {
                break;
            };
            let _ = self.mosi.push(byte);
            if let Some(level) = self.tag_level {
                let _ = self.tags.push(level);
            }
            let reply = match self.miso {
                Miso::Loopback => byte,
                Miso::Fixed(reply) => reply,
            };
            let _ = self.rx.push_back(reply);
        }
    }

    fn status(&self) -> u32 {
        let mut cs = self.cs;
        if !self.stalled {
            if !self.tx.is_full() {
                cs |= CS_TXD;
            }
            if self.cs & CS_TA != 0 && self.tx.is_empty() {
                cs |= CS_DONE;
            }
        }
        if !self.rx.is_empty() {
            cs |= CS_RXD;
        }
        if self.rx.len() >= FIFO_DEPTH * 3 / 4 {
            cs |= CS_RXR;
        }
        if self.rx.is_full() {
            cs |= CS_RXF;
        }
        cs
    }

    fn read(&mut self, offset: u32) -> u32 {
        match offset {
            0x00 => {
                self.shift();
                self.status()
            }
            0x04 => {
                let byte = match self.rx.pop_front() {
                    Some(byte) => byte,
                    None => {
                        self.underruns += 1;
                        0
                    }
                };
                self.shift();
                u32::from(byte)
            }
            0x08 => self.clk,
            0x0C => self.dlen,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            0x00 => {
                if value & CS_CLEAR_TX != 0 {
                    self.tx.clear();
                }
                if value & CS_CLEAR_RX != 0 {
                    self.rx.clear();
                }
                self.cs = value & CS_WRITABLE;
            }
            0x04 => {
                if self.tx.push_back((value & 0xFF) as u8).is_err() {
                    self.overruns += 1;
                }
            }
            0x08 => self.clk = value & 0xFFFF,
            0x0C => self.dlen = value & 0xFFFF,
            _ => {}
        }
    }
}

impl State {
    fn read(&mut self, addr: u32) -> u32 {
        if let Some(offset) = addr.checked_sub(GPIO_BASE).filter(|o| *o < 0x100) {
            self.gpio.read(offset)
        } else if let Some(offset) = addr.checked_sub(SPI0_BASE).filter(|o| *o < 0x20) {
            let levels = self.gpio.levels();
            self.spi.tag_level = self.tag_pin.map(|pin| levels & (1 << pin) != 0);
            self.spi.read(offset)
        } else if let Some(offset) = addr.checked_sub(RNG_BASE).filter(|o| *o < 0x20) {
            self.rng.read(offset)
        } else if addr == TIMER_BASE + 0x04 {
            let low = self.ticks as u32;
            self.ticks += 1;
            low
        } else if addr == TIMER_BASE + 0x08 {
            (self.ticks >> 32) as u32
        } else {
            0
        }
    }

    fn write(&mut self, addr: u32, value: u32) {
        if let Some(offset) = addr.checked_sub(GPIO_BASE).filter(|o| *o < 0x100) {
            self.gpio.write(offset, value);
        } else if let Some(offset) = addr.checked_sub(SPI0_BASE).filter(|o| *o < 0x20) {
            self.spi.write(offset, value);
        } else if let Some(offset) = addr.checked_sub(RNG_BASE).filter(|o| *o < 0x20) {
            self.rng.write(offset, value);
        }
    }

    fn peek(&self, addr: u32) -> u32 {
        if let Some(offset) = addr.checked_sub(GPIO_BASE).filter(|o| *o < 0x100) {
            self.gpio.read(offset)
        } else if addr == SPI0_BASE {
            self.spi.status()
        } else if addr == SPI0_BASE + 0x08 {
            self.spi.clk
        } else if let Some(offset) = addr.checked_sub(RNG_BASE).filter(|o| *o < 0x20) {
            match offset {
                0x00 => self.rng.ctrl,
                0x04 => self.rng.status(),
                0x10 => self.rng.int_mask,
                _ => 0,
            }
        } else if addr == TIMER_BASE + 0x04 {
            self.ticks as u32
        } else if addr == TIMER_BASE + 0x08 {
            (self.ticks >> 32) as u32
        } else {
            0
        }
    }

    fn poke(&mut self, addr: u32, value: u32) {
        if let Some(offset) = addr.checked_sub(GPIO_BASE).filter(|o| *o < 0x18) {
            self.gpio.fsel[(offset / 4) as usize] = value;
        } else if addr == SPI0_BASE {
            self.spi.cs = value & CS_WRITABLE;
        } else if addr == SPI0_BASE + 0x08 {
            self.spi.clk = value & 0xFFFF;
        } else if let Some(offset) = addr.checked_sub(RNG_BASE).filter(|o| *o < 0x20) {
            self.rng.write(offset, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_overflow_is_counted_not_stored() {
        let sim = SimBus::new();
        for byte in 0..20u32 {
            sim.write(SPI0_BASE + 0x04, byte);
        }
        assert_eq!(sim.spi_overruns(), 4);

        sim.write(SPI0_BASE, CS_TA);
        // status read runs the shifter
        assert_ne!(sim.read(SPI0_BASE) & CS_RXF, 0);
        for byte in 0..16u32 {
            assert_eq!(sim.read(SPI0_BASE + 0x04), byte);
        }
        assert_eq!(sim.read(SPI0_BASE + 0x04), 0);
        assert_eq!(sim.spi_underruns(), 1);
    }

    #[test]
    fn clear_bits_are_one_shot() {
        let sim = SimBus::new();
        sim.write(SPI0_BASE + 0x04, 0xAB);
        sim.write(SPI0_BASE, CS_CLEAR_TX | CS_CLEAR_RX | CS_TA);

        let cs = sim.read(SPI0_BASE);
        assert_eq!(cs & (CS_CLEAR_TX | CS_CLEAR_RX), 0);
        assert_ne!(cs & CS_TA, 0);
        assert_ne!(cs & CS_DONE, 0);
        assert_eq!(cs & CS_RXD, 0);
    }

    #[test]
    fn accesses_are_counted_but_peeks_are_not() {
        let sim = SimBus::new();
        sim.peek(GPIO_BASE);
        sim.poke(GPIO_BASE, 1);
        assert_eq!(sim.access_count(), 0);

        sim.read(GPIO_BASE);
        sim.write(GPIO_BASE, 0);
        assert_eq!(sim.access_count(), 2);
    }
}
