//! # rpi3-bsp
//!
//! Bare-metal board support for the BCM2837 (Raspberry Pi 3 / Zero 2 W):
//! GPIO, the SPI0 master and a polled quadrature rotary encoder, with the
//! hardware RNG, an ILI9341 display on SPI0 and pin claims for I2C, the
//! mini UART and PWM alongside.
//!
//! ```text
//!  Ili9341 ──SpiBus──> Spi0 ──timeouts──> SystemTimer ─┐
//!     └──DC/RST──> GpioPin ─┐  └──claims pins──┐       │
//!  RotaryEncoder ──reads────┼──────────────> Gpio ─────┼──> RegisterBus
//!  I2c1 / MiniUart / PwmOutput ──claim pins──┘         │        │
//!  HardwareRng ────────────────────────────────────────┘        │
//!                      Volatile (MMIO @ 0x3F00_0000) <──────────┤
//!                      SimBus   (host tests)        <───────────┘
//! ```
//!
//! All drivers are single-threaded and polled; nothing here takes locks or
//! installs interrupt handlers.
//!
//! ## Features
//!
//! - `defmt`: log through `defmt` and derive `defmt::Format` on public types
//! - `sim`: expose the register simulator (`sim`) for host-side testing
//!
//! ## Example
//!
//! ```rust,no_run
//! use rpi3_bsp::{ClockDivider, Gpio, PinMode, RotaryEncoder, Spi0};
//!
//! let gpio = Gpio::new();
//! let mut spi = Spi0::new();
//! spi.start(&gpio).unwrap();
//! spi.set_clock_divider(ClockDivider::DIV_64);
//!
//! let reply = spi.transfer_byte(0x9F).unwrap();
//!
//! let mut knob = RotaryEncoder::new(5, 6).unwrap();
//! knob.init(&gpio).unwrap();
//! loop {
//!     if knob.poll(&gpio).unwrap() != 0 {
//!         gpio.set_mode(25, PinMode::Output).unwrap();
//!         gpio.set_high(25).unwrap();
//!     }
//! #   break;
//! }
//! # let _ = reply;
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all)]

// must come first so the logging macros are visible to every module
mod fmt;

pub mod display;
pub mod encoder;
pub mod hal;
pub mod sim;

pub use display::{DisplayError, Ili9341};
pub use encoder::{EncoderState, RotaryEncoder};
pub use hal::{
    gpio::{Edge, Gpio, GpioError, GpioPin, Level, PinMode, Pull},
    i2c::I2c1,
    mmio::{Mmio, RegisterBus, Volatile},
    pwm::{PwmChannel, PwmOutput, PwmPin},
    rng::HardwareRng,
    spi::{ChipSelect, ClockDivider, Spi0, SpiConfig, SpiCs, SpiError},
    timer::SystemTimer,
    uart::MiniUart,
};
