//! BSC1 (I2C) pin claim
//!
//! Only the pin multiplexing is handled here: SDA1 and SCL1 on GPIO 2/3.

use super::gpio::{Gpio, GpioError, PinMode};
use super::mmio::RegisterBus;

/// I2C data line
pub const SDA_PIN: u8 = 2;
/// I2C clock line
pub const SCL_PIN: u8 = 3;

/// Handle for the BSC1 I2C master pins
#[derive(Debug, Default)]
pub struct I2c1 {
    claimed: bool,
}

impl I2c1 {
    /// A handle that has not claimed its pins yet
    pub const fn new() -> Self {
        Self { claimed: false }
    }

    /// Route GPIO 2/3 to BSC1 (Alt0)
    pub fn start<B: RegisterBus>(&mut self, gpio: &Gpio<B>) -> Result<(), GpioError> {
        gpio.set_mode(SDA_PIN, PinMode::Alt0)?;
        gpio.set_mode(SCL_PIN, PinMode::Alt0)?;
        self.claimed = true;
        info!("I2C1 started on GPIO {}/{}", SDA_PIN, SCL_PIN);
        Ok(())
    }

    /// Release GPIO 2/3 back to inputs
    pub fn end<B: RegisterBus>(&mut self, gpio: &Gpio<B>) -> Result<(), GpioError> {
        gpio.set_mode(SDA_PIN, PinMode::Input)?;
        gpio.set_mode(SCL_PIN, PinMode::Input)?;
        self.claimed = false;
        Ok(())
    }

    /// Whether the pins are currently routed to BSC1
    pub const fn is_claimed(&self) -> bool {
        self.claimed
    }
}
