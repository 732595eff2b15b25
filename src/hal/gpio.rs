//! GPIO controller for BCM2837
//!
//! Pin function multiplexing, output set/clear, level reads, edge-detect
//! configuration and pull-up/down control for GPIO 0-53.
//!
//! Per-pin registers come in two banks: bank 0 holds pins 0-31 and bank 1,
//! four bytes further on, holds pins 32-53. Function select packs ten pins
//! per register at three bits each.

use super::mmio::{RegisterBus, Volatile};
use super::GPIO_BASE;
use embedded_hal::digital;

/// Number of GPIO pins on the BCM2837
pub const NUM_PINS: u8 = 54;

const PINS_PER_FSEL: u8 = 10;
const FSEL_BITS: u8 = 3;
const FSEL_MASK: u32 = 0b111;
const PINS_PER_BANK: u8 = 32;

/// GPIO function select registers (GPFSEL0..GPFSEL5, 4 bytes apart)
const GPFSEL0: u32 = 0x00;

/// GPIO pin output set registers
const GPSET0: u32 = 0x1C;

/// GPIO pin output clear registers
const GPCLR0: u32 = 0x28;

/// GPIO pin level registers
const GPLEV0: u32 = 0x34;

/// GPIO event detect status registers
const GPEDS0: u32 = 0x40;

/// GPIO rising / falling edge detect enable registers
const GPREN0: u32 = 0x4C;
const GPFEN0: u32 = 0x58;

/// GPIO pull-up/down control register
const GPPUD: u32 = 0x94;
const GPPUDCLK0: u32 = 0x98;

/// Cycles the pull control signal needs to settle (BCM2837 datasheet, p101)
const PUD_SETTLE_CYCLES: u32 = 150;

/// GPIO pin function modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum PinMode {
    /// Input (reset state)
    Input = 0b000,
    /// Output
    Output = 0b001,
    /// Alternate function 0
    Alt0 = 0b100,
    /// Alternate function 1
    Alt1 = 0b101,
    /// Alternate function 2
    Alt2 = 0b110,
    /// Alternate function 3
    Alt3 = 0b111,
    /// Alternate function 4
    Alt4 = 0b011,
    /// Alternate function 5
    Alt5 = 0b010,
}

impl PinMode {
    /// The 3-bit function select code.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for PinMode {
    type Error = GpioError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0b000 => Ok(PinMode::Input),
            0b001 => Ok(PinMode::Output),
            0b100 => Ok(PinMode::Alt0),
            0b101 => Ok(PinMode::Alt1),
            0b110 => Ok(PinMode::Alt2),
            0b111 => Ok(PinMode::Alt3),
            0b011 => Ok(PinMode::Alt4),
            0b010 => Ok(PinMode::Alt5),
            _ => Err(GpioError::InvalidMode(code)),
        }
    }
}

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Logic 0
    Low,
    /// Logic 1
    High,
}

impl Level {
    /// `true` for [`Level::High`].
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Edge(s) latched into the event detect status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Low to high only
    Rising,
    /// High to low only
    Falling,
    /// Both directions
    Changing,
    /// Edge detection off
    NoEdge,
}

impl Edge {
    /// (rising enabled, falling enabled)
    const fn enables(self) -> (bool, bool) {
        match self {
            Edge::Rising => (true, false),
            Edge::Falling => (false, true),
            Edge::Changing => (true, true),
            Edge::NoEdge => (false, false),
        }
    }
}

/// GPIO pull-up/down control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// No pull resistor
    None = 0b00,
    /// Pull to ground
    PullDown = 0b01,
    /// Pull to 3V3
    PullUp = 0b10,
}

/// GPIO errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioError {
    /// Pin number is not in 0..54
    InvalidPin(u8),
    /// Function select code does not fit in three bits
    InvalidMode(u32),
}

/// Offset of a pin's bank register relative to bank 0, and its bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BankBit {
    offset: u32,
    mask: u32,
}

impl BankBit {
    const fn of(pin: u8) -> Self {
        Self {
            offset: (pin / PINS_PER_BANK) as u32 * 4,
            mask: 1 << (pin % PINS_PER_BANK),
        }
    }
}

fn check_pin(pin: u8) -> Result<u8, GpioError> {
    if pin < NUM_PINS {
        Ok(pin)
    } else {
        warn!("GPIO pin {} out of range", pin);
        Err(GpioError::InvalidPin(pin))
    }
}

/// GPIO controller for BCM2837
///
/// Operations on a pin outside 0..54 return [`GpioError::InvalidPin`]
/// without touching any register.
pub struct Gpio<B = Volatile> {
    base: u32,
    bus: B,
}

impl Gpio<Volatile> {
    /// Create the GPIO controller for the physical peripheral
    pub const fn new() -> Self {
        Self::with_bus(Volatile)
    }
}

impl Default for Gpio<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Gpio<B> {
    /// Create a GPIO controller at [`GPIO_BASE`] on the given bus
    pub const fn with_bus(bus: B) -> Self {
        Self {
            base: GPIO_BASE,
            bus,
        }
    }
}

impl<B: RegisterBus> Gpio<B> {
    /// Set GPIO pin function
    ///
    /// Only the three function bits of `pin` change; the other nine pins
    /// sharing the GPFSEL register keep their modes.
    pub fn set_mode(&self, pin: u8, mode: PinMode) -> Result<(), GpioError> {
        let pin = check_pin(pin)?;
        let addr = self.base + GPFSEL0 + u32::from(pin / PINS_PER_FSEL) * 4;
        let shift = (pin % PINS_PER_FSEL) * FSEL_BITS;

        self.bus
            .modify(addr, |val| (val & !(FSEL_MASK << shift)) | (mode.code() << shift));
        Ok(())
    }

    /// Set GPIO pin function from a raw 3-bit code
    pub fn set_mode_code(&self, pin: u8, code: u32) -> Result<(), GpioError> {
        let pin = check_pin(pin)?;
        let mode = PinMode::try_from(code)?;
        self.set_mode(pin, mode)
    }

    /// Read back the current function of a pin
    pub fn mode(&self, pin: u8) -> Result<PinMode, GpioError> {
        let pin = check_pin(pin)?;
        let addr = self.base + GPFSEL0 + u32::from(pin / PINS_PER_FSEL) * 4;
        let shift = (pin % PINS_PER_FSEL) * FSEL_BITS;

        PinMode::try_from((self.bus.read(addr) >> shift) & FSEL_MASK)
    }

    /// Drive a pin high or low
    ///
    /// Has no visible effect unless the pin is an output, but the hardware
    /// latches the level and applies it once the pin becomes an output.
    pub fn write(&self, pin: u8, level: Level) -> Result<(), GpioError> {
        let pin = check_pin(pin)?;
        self.write_level(pin, level);
        Ok(())
    }

    /// Set GPIO pin high
    pub fn set_high(&self, pin: u8) -> Result<(), GpioError> {
        self.write(pin, Level::High)
    }

    /// Set GPIO pin low
    pub fn set_low(&self, pin: u8) -> Result<(), GpioError> {
        self.write(pin, Level::Low)
    }

    /// Read GPIO pin level
    pub fn read(&self, pin: u8) -> Result<Level, GpioError> {
        let pin = check_pin(pin)?;
        Ok(self.read_level(pin))
    }

    /// Select which edges latch an event for `pin`
    pub fn enable_edge_detect(&self, pin: u8, edge: Edge) -> Result<(), GpioError> {
        let pin = check_pin(pin)?;
        let BankBit { offset, mask } = BankBit::of(pin);
        let (rising, falling) = edge.enables();

        let apply = |enable: bool| move |val: u32| if enable { val | mask } else { val & !mask };
        self.bus.modify(self.base + GPREN0 + offset, apply(rising));
        self.bus.modify(self.base + GPFEN0 + offset, apply(falling));
        Ok(())
    }

    /// Check and consume a latched edge event on `pin`
    ///
    /// A detected event is cleared by writing its bit back, so each event is
    /// reported once.
    pub fn event_detected(&self, pin: u8) -> Result<bool, GpioError> {
        let pin = check_pin(pin)?;
        let BankBit { offset, mask } = BankBit::of(pin);
        let addr = self.base + GPEDS0 + offset;

        let detected = self.bus.read(addr) & mask != 0;
        if detected {
            // write-1-to-clear, zero bits leave other pending events alone
            self.bus.write(addr, mask);
        }
        Ok(detected)
    }

    /// Set GPIO pull-up/down control
    pub fn set_pull(&self, pin: u8, pull: Pull) -> Result<(), GpioError> {
        let pin = check_pin(pin)?;
        let BankBit { offset, mask } = BankBit::of(pin);
        let pud = self.base + GPPUD;
        let pud_clk = self.base + GPPUDCLK0 + offset;

        self.bus.write(pud, pull as u32);
        settle();

        self.bus.write(pud_clk, mask);
        settle();

        self.bus.write(pud, 0);
        self.bus.write(pud_clk, 0);
        Ok(())
    }

    /// Borrow a single pin as an `embedded-hal` digital pin
    pub fn pin(&self, pin: u8) -> Result<GpioPin<'_, B>, GpioError> {
        let pin = check_pin(pin)?;
        Ok(GpioPin { gpio: self, pin })
    }

    fn write_level(&self, pin: u8, level: Level) {
        let BankBit { offset, mask } = BankBit::of(pin);
        let reg = match level {
            Level::High => GPSET0,
            Level::Low => GPCLR0,
        };
        self.bus.write(self.base + reg + offset, mask);
    }

    fn read_level(&self, pin: u8) -> Level {
        let BankBit { offset, .. } = BankBit::of(pin);
        let lev = self.bus.read(self.base + GPLEV0 + offset);
        Level::from((lev >> (pin % PINS_PER_BANK)) & 1 != 0)
    }
}

fn settle() {
    for _ in 0..PUD_SETTLE_CYCLES {
        core::hint::spin_loop();
    }
}

/// A single validated pin borrowed from a [`Gpio`] controller
pub struct GpioPin<'a, B: RegisterBus> {
    gpio: &'a Gpio<B>,
    pin: u8,
}

impl<B: RegisterBus> GpioPin<'_, B> {
    /// The pin number
    pub fn number(&self) -> u8 {
        self.pin
    }
}

impl<B: RegisterBus> digital::ErrorType for GpioPin<'_, B> {
    type Error = core::convert::Infallible;
}

impl<B: RegisterBus> digital::OutputPin for GpioPin<'_, B> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.gpio.write_level(self.pin, Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.gpio.write_level(self.pin, Level::High);
        Ok(())
    }
}

impl<B: RegisterBus> digital::InputPin for GpioPin<'_, B> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.gpio.read_level(self.pin).is_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.gpio.read_level(self.pin).is_high())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;
    use embedded_hal::digital::{InputPin, OutputPin};
    use proptest::prelude::*;

    const ALL_MODES: [PinMode; 8] = [
        PinMode::Input,
        PinMode::Output,
        PinMode::Alt0,
        PinMode::Alt1,
        PinMode::Alt2,
        PinMode::Alt3,
        PinMode::Alt4,
        PinMode::Alt5,
    ];

    fn fsel(sim: &SimBus, pin: u8) -> u32 {
        sim.peek(GPIO_BASE + GPFSEL0 + u32::from(pin / 10) * 4)
    }

    proptest! {
        #[test]
        fn set_mode_only_touches_its_own_field(
            pin in 0u8..NUM_PINS,
            mode_idx in 0usize..8,
            seed in any::<u32>(),
        ) {
            let sim = SimBus::new();
            let reg = GPIO_BASE + GPFSEL0 + u32::from(pin / 10) * 4;
            // unused top two bits of GPFSEL stay clear on hardware
            sim.poke(reg, seed & 0x3FFF_FFFF);
            let gpio = Gpio::with_bus(&sim);
            let mode = ALL_MODES[mode_idx];

            gpio.set_mode(pin, mode).unwrap();

            let shift = u32::from(pin % 10) * 3;
            let after = fsel(&sim, pin);
            prop_assert_eq!((after >> shift) & 0b111, mode.code());
            prop_assert_eq!(after & !(0b111 << shift), seed & 0x3FFF_FFFF & !(0b111 << shift));
            prop_assert_eq!(gpio.mode(pin).unwrap(), mode);
        }
    }

    #[test]
    fn invalid_pins_touch_no_register() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        for pin in NUM_PINS..=u8::MAX {
            let before = sim.access_count();
            assert_eq!(gpio.set_mode(pin, PinMode::Output), Err(GpioError::InvalidPin(pin)));
            assert_eq!(gpio.write(pin, Level::High), Err(GpioError::InvalidPin(pin)));
            assert_eq!(gpio.read(pin), Err(GpioError::InvalidPin(pin)));
            assert_eq!(gpio.event_detected(pin), Err(GpioError::InvalidPin(pin)));
            assert_eq!(gpio.enable_edge_detect(pin, Edge::Changing), Err(GpioError::InvalidPin(pin)));
            assert!(gpio.pin(pin).is_err());
            assert_eq!(sim.access_count(), before);
        }
    }

    #[test]
    fn invalid_mode_code_is_rejected_before_any_access() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        assert_eq!(gpio.set_mode_code(4, 8), Err(GpioError::InvalidMode(8)));
        assert_eq!(sim.access_count(), 0);
        assert_eq!(gpio.set_mode_code(4, 0b100), Ok(()));
        assert_eq!(gpio.mode(4), Ok(PinMode::Alt0));
    }

    #[test]
    fn output_round_trip_in_both_banks() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        for pin in [5, 31, 32, 40, 53] {
            gpio.set_mode(pin, PinMode::Output).unwrap();
            gpio.write(pin, Level::High).unwrap();
            assert_eq!(gpio.read(pin), Ok(Level::High), "pin {pin}");
            gpio.write(pin, Level::Low).unwrap();
            assert_eq!(gpio.read(pin), Ok(Level::Low), "pin {pin}");
        }
    }

    #[test]
    fn bank_boundary_routes_to_correct_register() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);
        for pin in [31, 32] {
            gpio.set_mode(pin, PinMode::Output).unwrap();
        }

        gpio.set_high(32).unwrap();
        assert_eq!(gpio.read(31), Ok(Level::Low));
        assert_eq!(gpio.read(32), Ok(Level::High));
        assert_eq!(sim.peek(GPIO_BASE + GPLEV0 + 4), 1);

        gpio.set_high(31).unwrap();
        assert_eq!(sim.peek(GPIO_BASE + GPLEV0), 1 << 31);
    }

    #[test]
    fn edge_detect_bank_boundary() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        gpio.enable_edge_detect(31, Edge::Rising).unwrap();
        gpio.enable_edge_detect(32, Edge::Falling).unwrap();
        assert_eq!(sim.peek(GPIO_BASE + GPREN0), 1 << 31);
        assert_eq!(sim.peek(GPIO_BASE + GPREN0 + 4), 0);
        assert_eq!(sim.peek(GPIO_BASE + GPFEN0), 0);
        assert_eq!(sim.peek(GPIO_BASE + GPFEN0 + 4), 1);

        sim.drive(31, Level::High);
        sim.drive(32, Level::High);
        sim.drive(32, Level::Low);
        assert_eq!(sim.peek(GPIO_BASE + GPEDS0), 1 << 31);
        assert_eq!(sim.peek(GPIO_BASE + GPEDS0 + 4), 1);

        assert_eq!(gpio.event_detected(32), Ok(true));
        assert_eq!(sim.peek(GPIO_BASE + GPEDS0 + 4), 0);
        assert_eq!(sim.peek(GPIO_BASE + GPEDS0), 1 << 31);

        assert_eq!(gpio.event_detected(31), Ok(true));
        assert_eq!(sim.peek(GPIO_BASE + GPEDS0), 0);
        assert_eq!(gpio.event_detected(32), Ok(false));
    }

    #[test]
    fn level_written_while_input_applies_once_output() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        gpio.set_mode(17, PinMode::Input).unwrap();
        gpio.set_high(17).unwrap();
        assert_eq!(gpio.read(17), Ok(Level::Low));

        gpio.set_mode(17, PinMode::Output).unwrap();
        assert_eq!(gpio.read(17), Ok(Level::High));
    }

    #[test]
    fn inputs_follow_the_driven_level() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        sim.drive(21, Level::High);
        assert_eq!(gpio.read(21), Ok(Level::High));
        sim.drive(21, Level::Low);
        assert_eq!(gpio.read(21), Ok(Level::Low));
    }

    #[test]
    fn edge_enables_set_and_clear_independently() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);
        let bit = 1 << (35 - 32);

        gpio.enable_edge_detect(35, Edge::Changing).unwrap();
        assert_eq!(sim.peek(GPIO_BASE + GPREN0 + 4) & bit, bit);
        assert_eq!(sim.peek(GPIO_BASE + GPFEN0 + 4) & bit, bit);

        gpio.enable_edge_detect(35, Edge::Falling).unwrap();
        assert_eq!(sim.peek(GPIO_BASE + GPREN0 + 4) & bit, 0);
        assert_eq!(sim.peek(GPIO_BASE + GPFEN0 + 4) & bit, bit);

        gpio.enable_edge_detect(35, Edge::NoEdge).unwrap();
        assert_eq!(sim.peek(GPIO_BASE + GPREN0 + 4), 0);
        assert_eq!(sim.peek(GPIO_BASE + GPFEN0 + 4), 0);
    }

    #[test]
    fn event_is_reported_exactly_once() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        gpio.enable_edge_detect(17, Edge::Rising).unwrap();
        gpio.enable_edge_detect(18, Edge::Rising).unwrap();
        assert_eq!(gpio.event_detected(17), Ok(false));

        sim.drive(17, Level::High);
        sim.drive(18, Level::High);
        assert_eq!(gpio.event_detected(17), Ok(true));
        assert_eq!(gpio.event_detected(17), Ok(false));
        // consuming 17 left 18 pending
        assert_eq!(gpio.event_detected(18), Ok(true));

        // falling edge is not enabled
        sim.drive(17, Level::Low);
        assert_eq!(gpio.event_detected(17), Ok(false));
    }

    #[test]
    fn pull_sequence_latches_and_releases_control() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);

        gpio.set_pull(4, Pull::PullUp).unwrap();
        gpio.set_pull(45, Pull::PullDown).unwrap();

        assert_eq!(sim.pull(4), Pull::PullUp as u32);
        assert_eq!(sim.pull(45), Pull::PullDown as u32);
        assert_eq!(sim.pull(5), Pull::None as u32);
        assert_eq!(sim.peek(GPIO_BASE + GPPUD), 0);
        assert_eq!(sim.peek(GPIO_BASE + GPPUDCLK0), 0);
    }

    #[test]
    fn digital_pin_traits_drive_the_controller() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);
        gpio.set_mode(25, PinMode::Output).unwrap();

        let mut dc = gpio.pin(25).unwrap();
        assert_eq!(dc.number(), 25);
        dc.set_high().unwrap();
        assert!(dc.is_high().unwrap());
        dc.set_low().unwrap();
        assert!(dc.is_low().unwrap());
    }
}
