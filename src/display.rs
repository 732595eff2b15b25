//! ILI9341 240x320 TFT over SPI0
//!
//! The controller takes a command byte with DC low followed by parameter
//! or pixel bytes with DC high. Chip select is driven by SPI0 in hardware.
//!
//! | Signal | Pin                         |
//! |--------|-----------------------------|
//! | SCLK   | GPIO 11 (SPI0)              |
//! | MOSI   | GPIO 10 (SPI0)              |
//! | CS     | GPIO 8 (CE0)                |
//! | DC     | any output, e.g. GPIO 25    |
//! | RST    | any output, e.g. GPIO 24    |
//!
//! The driver is generic over `embedded-hal` traits; on the board it runs
//! on `&mut Spi0` with two [`GpioPin`](crate::hal::gpio::GpioPin)s and the
//! [`SystemTimer`](crate::hal::timer::SystemTimer) for delays.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Panel width in pixels
pub const WIDTH: u16 = 240;
/// Panel height in pixels
pub const HEIGHT: u16 = 320;

/// ILI9341 command codes used by this driver
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Software reset
    SoftwareReset = 0x01,
    /// Leave sleep mode
    SleepOut = 0x11,
    /// Normal display mode on
    NormalMode = 0x13,
    /// Gamma curve select
    GammaSet = 0x26,
    /// Display off
    DisplayOff = 0x28,
    /// Display on
    DisplayOn = 0x29,
    /// Column address window
    ColumnAddressSet = 0x2A,
    /// Page (row) address window
    PageAddressSet = 0x2B,
    /// Start pixel data
    MemoryWrite = 0x2C,
    /// Memory access control (scan direction, BGR)
    MemoryAccessControl = 0x36,
    /// Vertical scroll start address
    VerticalScrollStart = 0x37,
    /// Pixel format
    PixelFormat = 0x3A,
    /// Frame rate control, normal mode
    FrameRateControl = 0xB1,
    /// Display function control
    DisplayFunctionControl = 0xB6,
    /// Power control 1
    PowerControl1 = 0xC0,
    /// Power control 2
    PowerControl2 = 0xC1,
    /// VCOM control 1
    VcomControl1 = 0xC5,
    /// VCOM control 2
    VcomControl2 = 0xC7,
    /// Positive gamma correction
    PositiveGamma = 0xE0,
    /// Negative gamma correction
    NegativeGamma = 0xE1,
}

/// RGB565 colours
pub mod color {
    /// 0, 0, 0
    pub const BLACK: u16 = 0x0000;
    /// 0, 0, 255
    pub const BLUE: u16 = 0x001F;
    /// 255, 0, 0
    pub const RED: u16 = 0xF800;
    /// 0, 255, 0
    pub const GREEN: u16 = 0x07E0;
    /// 0, 255, 255
    pub const CYAN: u16 = 0x07FF;
    /// 255, 0, 255
    pub const MAGENTA: u16 = 0xF81F;
    /// 255, 255, 0
    pub const YELLOW: u16 = 0xFFE0;
    /// 255, 165, 0
    pub const ORANGE: u16 = 0xFD20;
    /// 255, 255, 255
    pub const WHITE: u16 = 0xFFFF;
}

// Power, VCOM and gamma setup for the common 2.2"/2.8" modules. The first
// five entries are undocumented vendor registers.
const INIT_SEQUENCE: &[(u8, &[u8])] = &[
    (0xEF, &[0x03, 0x80, 0x02]),
    (0xCF, &[0x00, 0xC1, 0x30]),
    (0xED, &[0x64, 0x03, 0x12, 0x81]),
    (0xE8, &[0x85, 0x00, 0x78]),
    (0xCB, &[0x39, 0x2C, 0x00, 0x34, 0x02]),
    (0xF7, &[0x20]),
    (0xEA, &[0x00, 0x00]),
    (Command::PowerControl1 as u8, &[0x23]),
    (Command::PowerControl2 as u8, &[0x10]),
    (Command::VcomControl1 as u8, &[0x3E, 0x28]),
    (Command::VcomControl2 as u8, &[0x86]),
    (Command::MemoryAccessControl as u8, &[0x48]),
    (Command::VerticalScrollStart as u8, &[0x00]),
    // 16 bits per pixel
    (Command::PixelFormat as u8, &[0x55]),
    (Command::FrameRateControl as u8, &[0x00, 0x18]),
    (Command::DisplayFunctionControl as u8, &[0x08, 0x82, 0x27]),
    // 3-gamma off
    (0xF2, &[0x00]),
    (Command::GammaSet as u8, &[0x01]),
    (
        Command::PositiveGamma as u8,
        &[
            0x0F, 0x31, 0x2B, 0x0C, 0x0E, 0x08, 0x4E, 0xF1, 0x37, 0x07, 0x10, 0x03, 0x0E, 0x09,
            0x00,
        ],
    ),
    (
        Command::NegativeGamma as u8,
        &[
            0x00, 0x0E, 0x14, 0x03, 0x11, 0x07, 0x31, 0xC1, 0x48, 0x08, 0x0F, 0x0C, 0x31, 0x36,
            0x0F,
        ],
    ),
];

/// Pixels sent per SPI write when filling
const FILL_CHUNK: usize = 32;

/// Display errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayError {
    /// SPI write failed
    Spi,
    /// DC or RST pin could not be driven
    Gpio,
    /// Window lies outside the panel
    OutOfBounds,
}

/// ILI9341 display driver
pub struct Ili9341<SPI, DC, RST, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    delay: DELAY,
}

impl<SPI, DC, RST, DELAY> Ili9341<SPI, DC, RST, DELAY>
where
    SPI: SpiBus<u8>,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Wrap an SPI bus, the DC and RST outputs and a delay source
    ///
    /// The pins must already be outputs and SPI0 started.
    pub fn new(spi: SPI, dc: DC, rst: RST, delay: DELAY) -> Self {
        Self { spi, dc, rst, delay }
    }

    /// Reset the panel and run the power-up sequence
    ///
    /// Leaves the display on, in normal mode, with RGB565 pixels.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.hardware_reset()?;

        self.write_command(Command::SoftwareReset as u8)?;
        self.delay.delay_ms(150);

        for &(cmd, params) in INIT_SEQUENCE {
            self.command(cmd, params)?;
        }

        self.write_command(Command::SleepOut as u8)?;
        self.delay.delay_ms(200);
        self.write_command(Command::DisplayOn as u8)?;
        self.delay.delay_ms(200);
        self.write_command(Command::NormalMode as u8)?;

        info!("ILI9341 initialized");
        Ok(())
    }

    fn hardware_reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(|_| DisplayError::Gpio)?;
        self.rst.set_low().map_err(|_| DisplayError::Gpio)?;
        self.delay.delay_us(20);
        self.rst.set_high().map_err(|_| DisplayError::Gpio)?;
        self.delay.delay_ms(120);
        Ok(())
    }

    /// Send a command byte with DC low, then return DC high for data
    pub fn write_command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(|_| DisplayError::Gpio)?;
        self.spi.write(&[cmd]).map_err(|_| DisplayError::Spi)?;
        self.dc.set_high().map_err(|_| DisplayError::Gpio)
    }

    /// Send parameter or pixel bytes (DC high)
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(|_| DisplayError::Gpio)?;
        self.spi.write(data).map_err(|_| DisplayError::Spi)
    }

    /// A command followed by its parameters
    pub fn command(&mut self, cmd: u8, params: &[u8]) -> Result<(), DisplayError> {
        self.write_command(cmd)?;
        if params.is_empty() {
            return Ok(());
        }
        self.write_data(params)
    }

    /// Select the inclusive pixel window for the next memory write and start it
    pub fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), DisplayError> {
        if x0 > x1 || y0 > y1 || x1 >= WIDTH || y1 >= HEIGHT {
            warn!("ILI9341 window {},{}-{},{} out of bounds", x0, y0, x1, y1);
            return Err(DisplayError::OutOfBounds);
        }

        let [x0h, x0l] = x0.to_be_bytes();
        let [x1h, x1l] = x1.to_be_bytes();
        self.command(Command::ColumnAddressSet as u8, &[x0h, x0l, x1h, x1l])?;

        let [y0h, y0l] = y0.to_be_bytes();
        let [y1h, y1l] = y1.to_be_bytes();
        self.command(Command::PageAddressSet as u8, &[y0h, y0l, y1h, y1l])?;

        self.write_command(Command::MemoryWrite as u8)
    }

    /// Fill a `width` x `height` rectangle at (`x`, `y`) with one colour
    pub fn fill_rect(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color: u16,
    ) -> Result<(), DisplayError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let x1 = x.checked_add(width - 1).ok_or(DisplayError::OutOfBounds)?;
        let y1 = y.checked_add(height - 1).ok_or(DisplayError::OutOfBounds)?;
        self.set_window(x, y, x1, y1)?;

        let [high, low] = color.to_be_bytes();
        let mut chunk = [0u8; FILL_CHUNK * 2];
        for pair in chunk.chunks_exact_mut(2) {
            pair[0] = high;
            pair[1] = low;
        }

        let mut remaining = usize::from(width) * usize::from(height);
        while remaining > 0 {
            let pixels = remaining.min(FILL_CHUNK);
            self.write_data(&chunk[..pixels * 2])?;
            remaining -= pixels;
        }
        Ok(())
    }

    /// Fill the whole panel with one colour
    pub fn clear(&mut self, color: u16) -> Result<(), DisplayError> {
        self.fill_rect(0, 0, WIDTH, HEIGHT, color)
    }

    /// Turn the panel output on or off without touching display RAM
    pub fn set_display_on(&mut self, on: bool) -> Result<(), DisplayError> {
        let cmd = if on {
            Command::DisplayOn
        } else {
            Command::DisplayOff
        };
        self.write_command(cmd as u8)
    }

    /// Give back the bus, pins and delay
    pub fn release(self) -> (SPI, DC, RST, DELAY) {
        (self.spi, self.dc, self.rst, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::gpio::{Gpio, Level, PinMode};
    use crate::hal::spi::Spi0;
    use crate::hal::timer::SystemTimer;
    use crate::sim::SimBus;

    const DC_PIN: u8 = 25;
    const RST_PIN: u8 = 24;

    fn setup(sim: &SimBus) -> (Gpio<&SimBus>, Spi0<&SimBus>) {
        let gpio = Gpio::with_bus(sim);
        gpio.set_mode(DC_PIN, PinMode::Output).unwrap();
        gpio.set_mode(RST_PIN, PinMode::Output).unwrap();
        let mut spi = Spi0::with_bus(sim);
        spi.start(&gpio).unwrap();
        sim.tag_mosi(DC_PIN);
        (gpio, spi)
    }

    #[test]
    fn command_goes_out_with_dc_low_and_params_with_dc_high() {
        let sim = SimBus::new();
        let (gpio, mut spi) = setup(&sim);
        let mut lcd = Ili9341::new(
            &mut spi,
            gpio.pin(DC_PIN).unwrap(),
            gpio.pin(RST_PIN).unwrap(),
            SystemTimer::with_bus(&sim),
        );

        lcd.command(Command::MemoryAccessControl as u8, &[0x48]).unwrap();
        lcd.write_command(Command::DisplayOn as u8).unwrap();

        assert_eq!(sim.mosi_log().as_slice(), &[0x36, 0x48, 0x29]);
        assert_eq!(sim.mosi_tags().as_slice(), &[false, true, false]);
        // left in data mode
        assert_eq!(gpio.read(DC_PIN), Ok(Level::High));
    }

    #[test]
    fn init_resets_then_streams_the_power_up_sequence() {
        let sim = SimBus::new();
        let (gpio, mut spi) = setup(&sim);
        let mut lcd = Ili9341::new(
            &mut spi,
            gpio.pin(DC_PIN).unwrap(),
            gpio.pin(RST_PIN).unwrap(),
            SystemTimer::with_bus(&sim),
        );

        lcd.init().unwrap();

        let log = sim.mosi_log();
        let tags = sim.mosi_tags();
        assert_eq!(&log[..5], &[0x01, 0xEF, 0x03, 0x80, 0x02]);
        assert_eq!(&tags[..5], &[false, false, true, true, true]);
        assert_eq!(&log[log.len() - 3..], &[0x11, 0x29, 0x13]);

        let commands = tags.iter().filter(|dc| !**dc).count();
        assert_eq!(commands, INIT_SEQUENCE.len() + 4);
        let params: usize = INIT_SEQUENCE.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(log.len(), commands + params);

        assert_eq!(gpio.read(RST_PIN), Ok(Level::High));
    }

    #[test]
    fn fill_rect_sets_window_and_streams_pixels() {
        let sim = SimBus::new();
        let (gpio, mut spi) = setup(&sim);
        let mut lcd = Ili9341::new(
            &mut spi,
            gpio.pin(DC_PIN).unwrap(),
            gpio.pin(RST_PIN).unwrap(),
            SystemTimer::with_bus(&sim),
        );

        lcd.fill_rect(10, 300, 2, 20, color::RED).unwrap();

        let log = sim.mosi_log();
        assert_eq!(&log[..5], &[0x2A, 0x00, 10, 0x00, 11]);
        assert_eq!(&log[5..10], &[0x2B, 0x01, 0x2C, 0x01, 0x3F]);
        assert_eq!(log[10], 0x2C);

        let pixels = &log[11..];
        assert_eq!(pixels.len(), 2 * 20 * 2);
        assert!(pixels.chunks_exact(2).all(|p| p == [0xF8, 0x00]));
        assert!(sim.mosi_tags()[11..].iter().all(|dc| *dc));
    }

    #[test]
    fn window_outside_the_panel_is_rejected_before_any_transfer() {
        let sim = SimBus::new();
        let (gpio, mut spi) = setup(&sim);
        let mut lcd = Ili9341::new(
            &mut spi,
            gpio.pin(DC_PIN).unwrap(),
            gpio.pin(RST_PIN).unwrap(),
            SystemTimer::with_bus(&sim),
        );

        assert_eq!(lcd.set_window(0, 0, WIDTH, 10), Err(DisplayError::OutOfBounds));
        assert_eq!(lcd.set_window(5, 0, 4, 10), Err(DisplayError::OutOfBounds));
        assert_eq!(lcd.fill_rect(230, 0, 20, 1, color::BLUE), Err(DisplayError::OutOfBounds));
        assert!(sim.mosi_log().is_empty());
    }
}
