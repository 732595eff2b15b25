//! PWM output pin claim
//!
//! Each PWM channel can be brought out on one of two GPIOs. Clock manager
//! and range/data setup are left to the caller.

use super::gpio::{Gpio, GpioError, PinMode};
use super::mmio::RegisterBus;

/// PWM channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmChannel {
    /// Channel 1 (PWM0)
    Ch1,
    /// Channel 2 (PWM1)
    Ch2,
}

/// GPIO that can carry a PWM channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmPin {
    /// Channel 1 on GPIO 12 (Alt0)
    Gpio12,
    /// Channel 2 on GPIO 13 (Alt0)
    Gpio13,
    /// Channel 1 on GPIO 18 (Alt5)
    Gpio18,
    /// Channel 2 on GPIO 19 (Alt5)
    Gpio19,
}

impl PwmPin {
    /// GPIO number
    pub const fn number(self) -> u8 {
        match self {
            PwmPin::Gpio12 => 12,
            PwmPin::Gpio13 => 13,
            PwmPin::Gpio18 => 18,
            PwmPin::Gpio19 => 19,
        }
    }

    /// Channel routed to this pin
    pub const fn channel(self) -> PwmChannel {
        match self {
            PwmPin::Gpio12 | PwmPin::Gpio18 => PwmChannel::Ch1,
            PwmPin::Gpio13 | PwmPin::Gpio19 => PwmChannel::Ch2,
        }
    }

    /// Function select that connects the pin to the PWM block
    pub const fn mode(self) -> PinMode {
        match self {
            PwmPin::Gpio12 | PwmPin::Gpio13 => PinMode::Alt0,
            PwmPin::Gpio18 | PwmPin::Gpio19 => PinMode::Alt5,
        }
    }
}

/// A PWM output claimed on a specific pin
#[derive(Debug)]
pub struct PwmOutput {
    pin: PwmPin,
}

impl PwmOutput {
    /// Switch `pin` to its PWM alternate function
    pub fn claim<B: RegisterBus>(gpio: &Gpio<B>, pin: PwmPin) -> Result<Self, GpioError> {
        gpio.set_mode(pin.number(), pin.mode())?;
        debug!("PWM channel on GPIO {} claimed", pin.number());
        Ok(Self { pin })
    }

    /// Return the pin to input mode
    pub fn release<B: RegisterBus>(self, gpio: &Gpio<B>) -> Result<(), GpioError> {
        gpio.set_mode(self.pin.number(), PinMode::Input)
    }

    /// Pin carrying this output
    pub const fn pin(&self) -> PwmPin {
        self.pin
    }

    /// Channel driving this output
    pub const fn channel(&self) -> PwmChannel {
        self.pin.channel()
    }
}
