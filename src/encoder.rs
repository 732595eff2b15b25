//! Quadrature rotary encoder driver
//!
//! Decodes the two-phase A/B output of a mechanical encoder (tested against
//! Bourns PEC11R-style parts with the datasheet RC filter) by polling both
//! pins through GPIO.
//!
//! Each poll packs the previous and current pin levels into four bits
//!
//! ```text
//!   bit 3   bit 2   bit 1   bit 0
//!  prev A  prev B  curr A  curr B
//! ```
//!
//! and looks the result up in [`TRANSITIONS`]. Single-bit changes are a
//! step of +1 or -1; no change and double-bit changes (a missed edge) are 0.
//!
//! Polling must outpace the encoder: a transition that happens and reverts
//! between two polls is lost without any indication.

use crate::hal::gpio::{Gpio, GpioError, PinMode, NUM_PINS};
use crate::hal::mmio::RegisterBus;

/// Count increment indexed by the 4-bit encoder state
#[rustfmt::skip]
pub const TRANSITIONS: [i8; 16] = [
     0,  1, -1,  0,
    -1,  0,  0,  1,
     1,  0,  0, -1,
     0, -1,  1,  0,
];

/// Packed previous/current A/B levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderState(u8);

impl EncoderState {
    const CURR_B: u8 = 1 << 0;
    const CURR_A: u8 = 1 << 1;
    const PREV_B: u8 = 1 << 2;
    const PREV_A: u8 = 1 << 3;
    const CURR: u8 = Self::CURR_A | Self::CURR_B;

    /// Build a state from its raw 4-bit value
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw & 0x0F)
    }

    /// The raw 4-bit value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Current A level
    pub const fn a(self) -> bool {
        self.0 & Self::CURR_A != 0
    }

    /// Current B level
    pub const fn b(self) -> bool {
        self.0 & Self::CURR_B != 0
    }

    /// A level at the previous poll
    pub const fn prev_a(self) -> bool {
        self.0 & Self::PREV_A != 0
    }

    /// B level at the previous poll
    pub const fn prev_b(self) -> bool {
        self.0 & Self::PREV_B != 0
    }

    /// Move the current sample into the previous slot and record a new one
    #[must_use]
    pub const fn advance(self, a: bool, b: bool) -> Self {
        let prev = (self.0 & Self::CURR) << 2;
        let a = if a { Self::CURR_A } else { 0 };
        let b = if b { Self::CURR_B } else { 0 };
        Self(prev | a | b)
    }

    /// Count increment for this transition
    pub const fn delta(self) -> i8 {
        TRANSITIONS[self.0 as usize]
    }
}

/// A rotary encoder wired to two GPIO inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotaryEncoder {
    pin_a: u8,
    pin_b: u8,
    state: EncoderState,
    count: i32,
}

impl RotaryEncoder {
    /// Describe an encoder on `pin_a` / `pin_b`
    pub const fn new(pin_a: u8, pin_b: u8) -> Result<Self, GpioError> {
        if pin_a >= NUM_PINS {
            return Err(GpioError::InvalidPin(pin_a));
        }
        if pin_b >= NUM_PINS {
            return Err(GpioError::InvalidPin(pin_b));
        }
        Ok(Self {
            pin_a,
            pin_b,
            state: EncoderState(0),
            count: 0,
        })
    }

    /// Make both pins inputs and zero the count and state
    pub fn init<B: RegisterBus>(&mut self, gpio: &Gpio<B>) -> Result<(), GpioError> {
        gpio.set_mode(self.pin_a, PinMode::Input)?;
        gpio.set_mode(self.pin_b, PinMode::Input)?;
        self.reset();
        debug!("encoder on GPIO {}/{} initialized", self.pin_a, self.pin_b);
        Ok(())
    }

    /// Sample both pins once and apply the resulting step
    ///
    /// Returns the step applied to the count (-1, 0 or +1).
    pub fn poll<B: RegisterBus>(&mut self, gpio: &Gpio<B>) -> Result<i8, GpioError> {
        let a = gpio.read(self.pin_a)?.is_high();
        let b = gpio.read(self.pin_b)?.is_high();
        Ok(self.update(a, b))
    }

    /// Apply one A/B sample without touching hardware
    pub fn update(&mut self, a: bool, b: bool) -> i8 {
        self.state = self.state.advance(a, b);
        let delta = self.state.delta();
        self.count = self.count.wrapping_add(i32::from(delta));
        delta
    }

    /// Accumulated steps since the last reset
    pub const fn count(&self) -> i32 {
        self.count
    }

    /// Last packed sample
    pub const fn state(&self) -> EncoderState {
        self.state
    }

    /// Zero the count and the stored sample
    pub fn reset(&mut self) {
        self.count = 0;
        self.state = EncoderState::default();
    }
}
