//! SPI0 master for BCM2837
//!
//! Polled, FIFO-based transfers as described in section 10.6.1 of the
//! BCM2835/7 ARM peripherals datasheet. A transaction runs while the
//! Transfer Active (TA) bit is set:
//!
//! ```text
//!  Idle --begin_transfer()--> Active --end_transfer()--> Idle
//!         (clear FIFOs, TA=1)         (wait DONE, TA=0)
//! ```
//!
//! # Blocking
//!
//! Every wait polls CS until the hardware raises the expected flag. With no
//! timeout configured (the default) a device that never completes a transfer
//! blocks the caller forever. [`Spi0::set_timeout`] bounds each wait and
//! turns a stall into [`SpiError::Timeout`].

use super::gpio::{Gpio, GpioError, PinMode};
use super::mmio::{RegisterBus, Volatile};
use super::timer::SystemTimer;
use super::SPI0_BASE;
use bitflags::bitflags;
use embedded_hal::spi;

/// SPI0 register offsets
const SPI0_CS: u32 = 0x00;
const SPI0_FIFO: u32 = 0x04;
const SPI0_CLK: u32 = 0x08;

// GPIO pins owned by SPI0, all Alt0
/// Chip enable 1
pub const CE1_PIN: u8 = 7;
/// Chip enable 0
pub const CE0_PIN: u8 = 8;
/// Master in, slave out
pub const MISO_PIN: u8 = 9;
/// Master out, slave in
pub const MOSI_PIN: u8 = 10;
/// Serial clock
pub const SCLK_PIN: u8 = 11;

const SPI0_PINS: [u8; 5] = [CE1_PIN, CE0_PIN, MISO_PIN, MOSI_PIN, SCLK_PIN];

bitflags! {
    /// SPI0 master control and status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiCs: u32 {
        /// Chip select field (00 = CE0, 01 = CE1)
        const CS = 0b11;
        /// Clock phase
        const CPHA = 1 << 2;
        /// Clock polarity
        const CPOL = 1 << 3;
        /// Clear TX FIFO (one-shot)
        const CLEAR_TX = 1 << 4;
        /// Clear RX FIFO (one-shot)
        const CLEAR_RX = 1 << 5;
        /// Chip select polarity
        const CSPOL = 1 << 6;
        /// Transfer active
        const TA = 1 << 7;
        /// DMA enable
        const DMAEN = 1 << 8;
        /// Interrupt on done
        const INTD = 1 << 9;
        /// Interrupt on RXR
        const INTR = 1 << 10;
        /// Automatically deassert chip select
        const ADCS = 1 << 11;
        /// Read enable (bidirectional mode)
        const REN = 1 << 12;
        /// LoSSI enable
        const LEN = 1 << 13;
        /// LoSSI monochrome (DMA)
        const LMONO = 1 << 14;
        /// LoSSI TE input enable
        const TE_EN = 1 << 15;
        /// Transfer done
        const DONE = 1 << 16;
        /// RX FIFO contains data
        const RXD = 1 << 17;
        /// TX FIFO can accept data
        const TXD = 1 << 18;
        /// RX FIFO needs reading
        const RXR = 1 << 19;
        /// RX FIFO full
        const RXF = 1 << 20;
        /// Chip select 0 polarity
        const CSPOL0 = 1 << 21;
        /// Chip select 1 polarity
        const CSPOL1 = 1 << 22;
        /// Chip select 2 polarity
        const CSPOL2 = 1 << 23;
        /// DMA mode in LoSSI mode
        const DMA_LEN = 1 << 24;
        /// 32-bit words in LoSSI DMA mode
        const LEN_LONG = 1 << 25;

        /// Both FIFO clear bits
        const CLEAR_FIFOS = Self::CLEAR_TX.bits() | Self::CLEAR_RX.bits();
    }
}

/// Chip select line asserted during transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSelect {
    /// CE0, GPIO 8
    #[default]
    Cs0 = 0,
    /// CE1, GPIO 7
    Cs1 = 1,
}

/// SPI0 clock divider: SCLK = core clock / divider
///
/// Speeds below assume the 250 MHz core clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDivider(u32);

impl ClockDivider {
    /// 125.0 MHz
    pub const DIV_2: Self = Self(2);
    /// 62.5 MHz
    pub const DIV_4: Self = Self(4);
    /// 31.2 MHz
    pub const DIV_8: Self = Self(8);
    /// 15.6 MHz
    pub const DIV_16: Self = Self(16);
    /// 7.8 MHz
    pub const DIV_32: Self = Self(32);
    /// 3.9 MHz
    pub const DIV_64: Self = Self(64);
    /// 1953 kHz
    pub const DIV_128: Self = Self(128);
    /// 976 kHz
    pub const DIV_256: Self = Self(256);
    /// 488 kHz
    pub const DIV_512: Self = Self(512);
    /// 244 kHz
    pub const DIV_1024: Self = Self(1024);
    /// 122 kHz
    pub const DIV_2048: Self = Self(2048);
    /// 61 kHz
    pub const DIV_4096: Self = Self(4096);
    /// 30.5 kHz
    pub const DIV_8192: Self = Self(8192);
    /// 15.2 kHz
    pub const DIV_16384: Self = Self(16384);
    /// 7629 Hz
    pub const DIV_32768: Self = Self(32768);
    /// 3815 Hz, the reset value (CDIV = 0)
    pub const DIV_65536: Self = Self(65536);

    /// Any even divider in 2..=65536
    pub const fn new(divider: u32) -> Result<Self, SpiError> {
        if divider < 2 || divider > 65536 || divider % 2 != 0 {
            Err(SpiError::InvalidDivider(divider))
        } else {
            Ok(Self(divider))
        }
    }

    /// The divider value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// CDIV field value (65536 is encoded as 0)
    const fn cdiv(self) -> u32 {
        self.0 & 0xFFFF
    }
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::DIV_65536
    }
}

/// SPI0 configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// SCLK divider
    pub divider: ClockDivider,
    /// Line asserted during transfers
    pub chip_select: ChipSelect,
    /// Upper bound on each hardware wait, `None` to wait forever
    pub timeout_us: Option<u32>,
}

/// SPI0 errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiError {
    /// A status flag did not assert within the configured timeout
    Timeout,
    /// TX and RX buffers differ in length
    LengthMismatch {
        /// Bytes to send
        tx: usize,
        /// Bytes of room to receive into
        rx: usize,
    },
    /// Divider is odd or outside 2..=65536
    InvalidDivider(u32),
    /// Claiming or releasing the bus pins failed
    Gpio(GpioError),
}

impl From<GpioError> for SpiError {
    fn from(error: GpioError) -> Self {
        SpiError::Gpio(error)
    }
}

impl spi::Error for SpiError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// Source and sink for one interleaved FIFO exchange.
trait Exchange {
    fn len(&self) -> usize;
    fn tx(&self, index: usize) -> u8;
    fn rx(&mut self, index: usize, byte: u8);
}

/// Separate buffers; the shorter side is padded with zeros on TX or has
/// its surplus RX bytes dropped.
struct Split<'a> {
    read: &'a mut [u8],
    write: &'a [u8],
}

impl Exchange for Split<'_> {
    fn len(&self) -> usize {
        self.read.len().max(self.write.len())
    }

    fn tx(&self, index: usize) -> u8 {
        self.write.get(index).copied().unwrap_or(0)
    }

    fn rx(&mut self, index: usize, byte: u8) {
        if let Some(slot) = self.read.get_mut(index) {
            *slot = byte;
        }
    }
}

/// One buffer, overwritten with what comes back. Byte `i` is always sent
/// before byte `i` is received, so no unsent data is clobbered.
struct InPlace<'a>(&'a mut [u8]);

impl Exchange for InPlace<'_> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn tx(&self, index: usize) -> u8 {
        self.0[index]
    }

    fn rx(&mut self, index: usize, byte: u8) {
        self.0[index] = byte;
    }
}

/// Start tick and length of a bounded wait
type Deadline = Option<(u64, u32)>;

/// SPI0 master controller
pub struct Spi0<B = Volatile> {
    base: u32,
    bus: B,
    timer: SystemTimer<B>,
    timeout_us: Option<u32>,
}

impl Spi0<Volatile> {
    /// Create the SPI0 controller for the physical peripheral
    pub const fn new() -> Self {
        Self::with_bus(Volatile)
    }
}

impl Default for Spi0<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Copy> Spi0<B> {
    /// Create an SPI0 controller at [`SPI0_BASE`] on the given bus
    pub const fn with_bus(bus: B) -> Self {
        Self {
            base: SPI0_BASE,
            bus,
            timer: SystemTimer::with_bus(bus),
            timeout_us: None,
        }
    }
}

impl<B: RegisterBus + Copy> Spi0<B> {
    /// Claim GPIO 7-11 and reset the controller
    ///
    /// Zeroes CS, clears both FIFOs and selects CE0.
    pub fn start<G: RegisterBus>(&mut self, gpio: &Gpio<G>) -> Result<(), SpiError> {
        for pin in SPI0_PINS {
            gpio.set_mode(pin, PinMode::Alt0)?;
        }

        self.write_cs(SpiCs::empty());
        self.write_cs(SpiCs::CLEAR_FIFOS);
        self.set_chip_select(ChipSelect::Cs0);

        info!("SPI0 started on GPIO {}-{}", CE1_PIN, SCLK_PIN);
        Ok(())
    }

    /// Release GPIO 7-11 back to inputs
    ///
    /// Must not be called while a transfer is active.
    pub fn end<G: RegisterBus>(&mut self, gpio: &Gpio<G>) -> Result<(), SpiError> {
        for pin in SPI0_PINS {
            gpio.set_mode(pin, PinMode::Input)?;
        }

        info!("SPI0 stopped");
        Ok(())
    }

    /// Apply divider, chip select and timeout in one go
    pub fn configure(&mut self, config: &SpiConfig) {
        self.set_clock_divider(config.divider);
        self.set_chip_select(config.chip_select);
        self.set_timeout(config.timeout_us);
    }

    /// Set the SCLK divider; used from the next transfer on
    pub fn set_clock_divider(&mut self, divider: ClockDivider) {
        self.bus.write(self.base + SPI0_CLK, divider.cdiv());
        debug!("SPI0 clock divider set to {}", divider.get());
    }

    /// Select the chip select line for the next transfer
    ///
    /// Only the CS field changes; every other control bit is written back
    /// as read.
    pub fn set_chip_select(&mut self, cs: ChipSelect) {
        self.bus.modify(self.base + SPI0_CS, |val| {
            (val & !SpiCs::CS.bits()) | cs as u32
        });
        debug!("SPI0 chip select set to {}", cs as u32);
    }

    /// Bound every subsequent hardware wait, or `None` to block forever
    pub fn set_timeout(&mut self, timeout_us: Option<u32>) {
        self.timeout_us = timeout_us;
    }

    /// Current control and status flags
    pub fn status(&self) -> SpiCs {
        SpiCs::from_bits_retain(self.bus.read(self.base + SPI0_CS))
    }

    /// Whether a transfer is active (TA set)
    pub fn is_active(&self) -> bool {
        self.status().contains(SpiCs::TA)
    }

    /// Clear both FIFOs and assert TA
    ///
    /// Required before [`send`](Self::send) / [`send16`](Self::send16).
    pub fn begin_transfer(&mut self) {
        self.set_cs_bits(SpiCs::CLEAR_FIFOS);
        self.set_cs_bits(SpiCs::TA);
    }

    /// Queue one byte once the TX FIFO has room
    ///
    /// Does not wait for the byte to be shifted out, so several sends can be
    /// pipelined inside one transaction.
    pub fn send(&mut self, byte: u8) -> Result<(), SpiError> {
        self.wait_until(|cs| cs.contains(SpiCs::TXD))?;
        self.write_fifo(byte);
        Ok(())
    }

    /// Queue a 16-bit word, high byte first
    pub fn send16(&mut self, word: u16) -> Result<(), SpiError> {
        let [high, low] = word.to_be_bytes();
        self.wait_until(|cs| cs.contains(SpiCs::TXD))?;
        self.write_fifo(high);
        self.write_fifo(low);
        Ok(())
    }

    /// Wait for the transaction to finish and drop TA
    ///
    /// Returns at once if the hardware already cleared TA.
    pub fn end_transfer(&mut self) -> Result<(), SpiError> {
        self.wait_until(|cs| !cs.contains(SpiCs::TA) || cs.contains(SpiCs::DONE))?;
        self.clear_cs_bits(SpiCs::TA);
        Ok(())
    }

    /// Send one byte and return the byte clocked in meanwhile
    ///
    /// Self-contained: must not be mixed with
    /// [`begin_transfer`](Self::begin_transfer) / [`end_transfer`](Self::end_transfer).
    pub fn transfer_byte(&mut self, byte: u8) -> Result<u8, SpiError> {
        self.begin_transfer();
        self.wait_until(|cs| cs.contains(SpiCs::TXD))?;
        self.write_fifo(byte);
        self.wait_until(|cs| cs.contains(SpiCs::DONE))?;
        let received = self.read_fifo();
        self.clear_cs_bits(SpiCs::TA);
        Ok(received)
    }

    /// Send a 16-bit word high byte first and return the word clocked in
    pub fn transfer16(&mut self, word: u16) -> Result<u16, SpiError> {
        let [high, low] = word.to_be_bytes();
        self.begin_transfer();
        self.wait_until(|cs| cs.contains(SpiCs::TXD))?;
        self.write_fifo(high);
        self.write_fifo(low);
        self.wait_until(|cs| cs.contains(SpiCs::DONE))?;
        let received = [self.read_fifo(), self.read_fifo()];
        self.clear_cs_bits(SpiCs::TA);
        Ok(u16::from_be_bytes(received))
    }

    /// Full-duplex transfer of `tx` while filling `rx`
    ///
    /// Works for any length: the TX FIFO is topped up and the RX FIFO
    /// drained in the same loop.
    pub fn buffer_transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
        if tx.len() != rx.len() {
            warn!("SPI0 buffer lengths differ: tx {} rx {}", tx.len(), rx.len());
            return Err(SpiError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        self.exchange(&mut Split { read: rx, write: tx })
    }

    fn exchange<X: Exchange>(&mut self, xfer: &mut X) -> Result<(), SpiError> {
        let len = xfer.len();
        let mut written = 0;
        let mut read = 0;

        self.begin_transfer();
        let mut deadline = self.deadline();

        while written < len || read < len {
            let progress = (written, read);

            while written < len && self.status().contains(SpiCs::TXD) {
                self.write_fifo(xfer.tx(written));
                written += 1;
            }

            while read < len && self.status().contains(SpiCs::RXD) {
                xfer.rx(read, self.read_fifo());
                read += 1;
            }

            if (written, read) == progress {
                self.check(deadline)?;
            } else {
                deadline = self.deadline();
            }
        }

        self.wait_until(|cs| cs.contains(SpiCs::DONE))?;
        self.clear_cs_bits(SpiCs::TA);
        trace!("SPI0 exchanged {} bytes", len);
        Ok(())
    }

    fn wait_until<F>(&mut self, ready: F) -> Result<SpiCs, SpiError>
    where
        F: Fn(SpiCs) -> bool,
    {
        let deadline = self.deadline();
        loop {
            let cs = self.status();
            if ready(cs) {
                return Ok(cs);
            }
            self.check(deadline)?;
            core::hint::spin_loop();
        }
    }

    fn deadline(&self) -> Deadline {
        self.timeout_us.map(|us| (self.timer.get_ticks(), us))
    }

    /// Abort the transfer if `deadline` has passed
    fn check(&mut self, deadline: Deadline) -> Result<(), SpiError> {
        match deadline {
            Some((start, us)) if self.timer.is_timeout(start, us) => {
                warn!("SPI0 timed out after {} us, status {:#x}", us, self.status().bits());
                self.clear_cs_bits(SpiCs::TA);
                Err(SpiError::Timeout)
            }
            _ => Ok(()),
        }
    }

    fn write_cs(&self, cs: SpiCs) {
        self.bus.write(self.base + SPI0_CS, cs.bits());
    }

    fn set_cs_bits(&self, bits: SpiCs) {
        self.bus.modify(self.base + SPI0_CS, |val| val | bits.bits());
    }

    fn clear_cs_bits(&self, bits: SpiCs) {
        self.bus.modify(self.base + SPI0_CS, |val| val & !bits.bits());
    }

    fn write_fifo(&self, byte: u8) {
        self.bus.write(self.base + SPI0_FIFO, u32::from(byte));
    }

    fn read_fifo(&self) -> u8 {
        (self.bus.read(self.base + SPI0_FIFO) & 0xFF) as u8
    }
}

impl<B: RegisterBus + Copy> spi::ErrorType for Spi0<B> {
    type Error = SpiError;
}

impl<B: RegisterBus + Copy> spi::SpiBus<u8> for Spi0<B> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.exchange(&mut Split { read: words, write: &[] })
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.exchange(&mut Split { read: &mut [], write: words })
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.exchange(&mut Split { read, write })
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.exchange(&mut InPlace(words))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // every exchange waits for DONE before returning
        Ok(())
    }
}
