//! Register transport between the driver and the sensor.
//!
//! [`RegisterBus`] is the seam the driver talks through. [`SpiTransport`]
//! implements it for a 4-wire SPI bus with a dedicated, active-low chip select.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use thiserror_no_std::Error;

use crate::regs::SPI_READ_BIT;

/// Register-addressed access to a single device.
pub trait RegisterBus {
    type Error;

    /// Writes one byte to `reg`.
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;

    /// Burst-reads `buf.len()` consecutive registers starting at `reg`.
    ///
    /// Implementations must issue a single transaction and rely on the
    /// device's address auto-increment.
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    type Error = T::Error;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        (**self).write_register(reg, value)
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read_registers(reg, buf)
    }
}

/// Errors raised by [`SpiTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError<S, P> {
    /// The SPI peripheral reported an error.
    #[error("SPI transfer failed")]
    Spi(S),
    /// Driving the chip select line failed.
    #[error("chip select pin failed")]
    Pin(P),
}

/// Settle times around a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTiming {
    /// Pause after every chip select edge.
    pub select_settle_ns: u32,
    /// Pause after a register write has been deselected.
    pub write_settle_us: u32,
    /// Pause after a burst read has been deselected.
    pub read_settle_us: u32,
}

impl Default for TransportTiming {
    fn default() -> Self {
        Self {
            select_settle_ns: 100,
            write_settle_us: 10_000,
            read_settle_us: 0,
        }
    }
}

/// SPI transport with manual chip select framing.
///
/// The SPI bus must already be configured (mode 0 or 3, at most 10 MHz) and
/// the chip select pin driven high before the transport is built.
pub struct SpiTransport<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
    timing: TransportTiming,
}

impl<SPI, CS, D> SpiTransport<SPI, CS, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, delay: D) -> Self {
        Self::with_timing(spi, cs, delay, TransportTiming::default())
    }

    pub fn with_timing(spi: SPI, cs: CS, delay: D, timing: TransportTiming) -> Self {
        Self {
            spi,
            cs,
            delay,
            timing,
        }
    }

    /// Gives back the bus, the chip select pin and the delay.
    pub fn release(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }

    fn select(&mut self) -> Result<(), TransportError<SPI::Error, CS::Error>> {
        self.cs.set_low().map_err(TransportError::Pin)?;
        self.delay.delay_ns(self.timing.select_settle_ns);
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), TransportError<SPI::Error, CS::Error>> {
        self.cs.set_high().map_err(TransportError::Pin)?;
        self.delay.delay_ns(self.timing.select_settle_ns);
        Ok(())
    }

    /// Runs `f` with the device selected.
    ///
    /// The bus is flushed before the select line is released, and the line is
    /// released even when `f` fails.
    fn framed<F>(&mut self, f: F) -> Result<(), TransportError<SPI::Error, CS::Error>>
    where
        F: FnOnce(&mut SPI) -> Result<(), SPI::Error>,
    {
        self.select()?;
        let result = f(&mut self.spi).and_then(|()| self.spi.flush());
        let deselected = self.deselect();
        result.map_err(TransportError::Spi)?;
        deselected
    }
}

impl<SPI, CS, D> RegisterBus for SpiTransport<SPI, CS, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    D: DelayNs,
{
    type Error = TransportError<SPI::Error, CS::Error>;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        let frame = [reg & !SPI_READ_BIT, value];
        self.framed(|spi| spi.write(&frame))?;
        self.delay.delay_us(self.timing.write_settle_us);
        Ok(())
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        let address = [reg | SPI_READ_BIT];
        self.framed(|spi| {
            spi.write(&address)?;
            spi.read(buf)
        })?;
        self.delay.delay_us(self.timing.read_settle_us);
        Ok(())
    }
}
