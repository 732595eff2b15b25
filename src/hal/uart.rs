//! Auxiliary mini UART pin claim
//!
//! TXD1 and RXD1 on GPIO 14/15 (Alt5). Baud rate and the AUX enable bits
//! are left to the caller.

use super::gpio::{Gpio, GpioError, PinMode};
use super::mmio::RegisterBus;

/// Mini UART transmit line
pub const TX_PIN: u8 = 14;
/// Mini UART receive line
pub const RX_PIN: u8 = 15;

/// Handle for the mini UART pins
#[derive(Debug, Default)]
pub struct MiniUart {
    claimed: bool,
}

impl MiniUart {
    /// A handle that has not claimed its pins yet
    pub const fn new() -> Self {
        Self { claimed: false }
    }

    /// Route GPIO 14/15 to the mini UART
    pub fn start<B: RegisterBus>(&mut self, gpio: &Gpio<B>) -> Result<(), GpioError> {
        gpio.set_mode(TX_PIN, PinMode::Alt5)?;
        gpio.set_mode(RX_PIN, PinMode::Alt5)?;
        self.claimed = true;
        info!("mini UART started on GPIO {}/{}", TX_PIN, RX_PIN);
        Ok(())
    }

    /// Release GPIO 14/15 back to inputs
    pub fn end<B: RegisterBus>(&mut self, gpio: &Gpio<B>) -> Result<(), GpioError> {
        gpio.set_mode(TX_PIN, PinMode::Input)?;
        gpio.set_mode(RX_PIN, PinMode::Input)?;
        self.claimed = false;
        Ok(())
    }

    /// Whether the pins are currently routed to the mini UART
    pub const fn is_claimed(&self) -> bool {
        self.claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[test]
    fn claims_tx_and_rx_as_alt5() {
        let sim = SimBus::new();
        let gpio = Gpio::with_bus(&sim);
        let mut uart = MiniUart::new();

        uart.start(&gpio).unwrap();
        assert!(uart.is_claimed());
        assert_eq!(gpio.mode(TX_PIN), Ok(PinMode::Alt5));
        assert_eq!(gpio.mode(RX_PIN), Ok(PinMode::Alt5));
        // GPFSEL1 holds pins 10-19; 14 and 15 share it with SPI0's SCLK
        assert_eq!(gpio.mode(11), Ok(PinMode::Input));

        uart.end(&gpio).unwrap();
        assert_eq!(gpio.mode(TX_PIN), Ok(PinMode::Input));
        assert_eq!(gpio.mode(RX_PIN), Ok(PinMode::Input));
    }
}
