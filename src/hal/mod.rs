//! Hardware Abstraction Layer for BCM2837 (Raspberry Pi 3 / Zero 2 W)
//!
//! Register map and low-level drivers for the GPIO block, the SPI0 master,
//! the free-running system timer and the hardware RNG, plus pin claims for
//! the I2C, mini UART and PWM blocks.
//!
//! | Peripheral   | Offset      | Physical address |
//! |--------------|-------------|------------------|
//! | System timer | `+0x003000` | `0x3F00_3000`    |
//! | RNG          | `+0x104000` | `0x3F10_4000`    |
//! | GPIO         | `+0x200000` | `0x3F20_0000`    |
//! | SPI0         | `+0x204000` | `0x3F20_4000`    |

pub mod gpio;
pub mod i2c;
#[allow(unsafe_code)]
pub mod mmio;
pub mod pwm;
pub mod rng;
pub mod spi;
pub mod timer;
pub mod uart;

/// Base address for BCM2837 peripherals
pub const PERIPHERAL_BASE: u32 = 0x3F00_0000;

/// GPIO base address
pub const GPIO_BASE: u32 = PERIPHERAL_BASE + 0x20_0000;

/// SPI0 master base address
pub const SPI0_BASE: u32 = PERIPHERAL_BASE + 0x20_4000;

/// System Timer base address
pub const TIMER_BASE: u32 = PERIPHERAL_BASE + 0x00_3000;

/// Hardware RNG base address
pub const RNG_BASE: u32 = PERIPHERAL_BASE + 0x10_4000;
