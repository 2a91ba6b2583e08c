#![cfg_attr(not(test), no_std)]

//! # BME280 Environmental Sensor Driver
//!
//! A type-safe, `no_std` SPI driver for the Bosch BME280.
//! This driver uses the typestate pattern to ensure the sensor is correctly
//! initialized and configured before measurements are taken.
//!
//! ## Features
//! - **Bit-exact Compensation**: The 32-bit fixed-point formulas of the Bosch
//!   reference code, including the pressure overflow branch and humidity clamp.
//! - **Forced or Normal Mode**: Forced mode re-arms a single conversion per
//!   measurement and waits for it with a bounded poll.
//! - **Typestate Pattern**: Prevents measuring before initialization.
//!
//! ## Units
//! - **Temperature**: °C
//! - **Pressure**: hPa
//! - **Humidity**: %RH
//! - **Altitude**: m above the 1013.25 hPa level
//!
//! ## Example
//! ```no_run
//! use bme280_driver::bus::SpiTransport;
//! use bme280_driver::{Bme280, Bme280Builder, Mode};
//! use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};
//!
//! fn sample<SPI: SpiBus, CS: OutputPin, D: DelayNs + Clone>(spi: SPI, cs: CS, mut delay: D) {
//!     let config = Bme280Builder::new().mode(Mode::Forced).build();
//!     let transport = SpiTransport::new(spi, cs, delay.clone());
//!
//!     let Ok(mut bme) = Bme280::new(transport, config).init() else {
//!         return;
//!     };
//!     if let Ok(m) = bme.measure(&mut delay) {
//!         let _ = (m.temperature, m.pressure, m.humidity, m.altitude);
//!     }
//! }
//! ```

pub mod bus;
mod calc;
pub mod regs;
mod settings;

use core::marker::PhantomData;
use embedded_hal::delay::DelayNs;
use log::{debug, error, warn};

pub use bus::RegisterBus;
pub use calc::{altitude, CalibData, SEA_LEVEL_HPA};
pub use settings::{
    Bme280Builder, Config, Filter, Mode, Oversampling, OversamplingConfig, Standby,
};

// --- Typestates ---

/// Sensor has been created but not yet initialized with calibration data.
pub struct Uninitialized;
/// Sensor is initialized, configured, and ready for measurements.
pub struct Ready;

/// Error types for the BME280 driver.
pub mod error {
    use thiserror_no_std::Error;

    /// Errors that can occur during communication or measurement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    pub enum Bme280Error<E> {
        /// The register transport failed.
        #[error("bus transaction failed")]
        Bus(E),
        /// The identity register did not read `0x60`.
        #[error("unexpected chip id {0:#04x}")]
        UnexpectedChipId(u8),
        /// A forced conversion did not finish within the configured timeout.
        #[error("measurement timed out")]
        Timeout,
    }

    /// Result type alias for BME280 operations.
    pub type Result<T, E> = core::result::Result<T, Bme280Error<E>>;
}

/// Duration wrapper for type-safety. Stored in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Milliseconds(pub u32);

/// Intermediate temperature produced by temperature compensation.
///
/// Pressure and humidity compensation of the same sample depend on it
/// (`t_fine` in the Bosch reference code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FineTemperature(pub i32);

/// Raw ADC output read in one burst from `0xF7..=0xFE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawData {
    /// 20-bit pressure.
    pub press_adc: u32,
    /// 20-bit temperature.
    pub temp_adc: u32,
    /// 16-bit humidity.
    pub hum_adc: u32,
}

impl RawData {
    /// Reconstructs the ADC values from the data registers.
    pub fn from_burst(buf: &[u8; regs::len::RAW_DATA]) -> Self {
        // msb[7:0] = x[19:12], lsb[7:0] = x[11:4], xlsb[7:4] = x[3:0]
        let press_adc = ((buf[0] as u32) << 12) | ((buf[1] as u32) << 4) | ((buf[2] as u32) >> 4);
        let temp_adc = ((buf[3] as u32) << 12) | ((buf[4] as u32) << 4) | ((buf[5] as u32) >> 4);
        let hum_adc = ((buf[6] as u32) << 8) | (buf[7] as u32);

        Self {
            press_adc,
            temp_adc,
            hum_adc,
        }
    }
}

/// Fixed-point result of the compensation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensated {
    /// Centi-degrees Celsius (2508 = 25.08 °C).
    pub temperature: i32,
    /// Pascal.
    pub pressure: u32,
    /// %RH * 1024.
    pub humidity: u32,
    /// The `t_fine` the pressure and humidity values were computed with.
    pub t_fine: FineTemperature,
}

/// Compensated measurement result in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Temperature in °C.
    pub temperature: f32,
    /// Pressure in hPa.
    pub pressure: f32,
    /// Relative humidity in %.
    pub humidity: f32,
    /// Altitude in m, derived from pressure and temperature.
    pub altitude: f32,
}

impl From<Compensated> for Measurement {
    fn from(c: Compensated) -> Self {
        let temperature = c.temperature as f32 / 100.0;
        let pressure = c.pressure as f32 / 100.0;

        Self {
            temperature,
            pressure,
            humidity: c.humidity as f32 / 1024.0,
            altitude: calc::altitude(pressure, temperature),
        }
    }
}

/// The main BME280 driver structure.
///
/// Use `Bme280::new(...)` to start. The `STATE` generic uses the Typestate pattern
/// to track initialization status at compile time.
pub struct Bme280<BUS, STATE> {
    bus: BUS,
    config: Config,
    chip_id: u8,
    calib_data: CalibData,
    last: Option<Measurement>,
    _state: PhantomData<STATE>,
}

impl<BUS> Bme280<BUS, Uninitialized>
where
    BUS: RegisterBus,
{
    /// Creates a new driver instance in the `Uninitialized` state.
    ///
    /// This does not communicate with the sensor yet. The bus and chip
    /// select line must already be brought up.
    pub fn new(bus: BUS, config: Config) -> Self {
        Bme280 {
            bus,
            config,
            chip_id: 0,
            calib_data: CalibData::default(),
            last: None,
            _state: PhantomData,
        }
    }

    /// Reads identity and calibration data, then configures the sensor.
    ///
    /// This transitions the driver state from `Uninitialized` to `Ready`.
    ///
    /// # Errors
    /// Returns [`error::Bme280Error::UnexpectedChipId`] if the identity does not
    /// match and [`Config::strict_chip_id`] is set, or a bus error.
    pub fn init(mut self) -> error::Result<Bme280<BUS, Ready>, BUS::Error> {
        let chip_id = self.read_reg_byte(regs::ADDR_ID)?;
        debug!("Got chip id: {chip_id:#04x}");

        if chip_id != regs::CHIP_ID {
            if self.config.strict_chip_id {
                return Err(error::Bme280Error::UnexpectedChipId(chip_id));
            }
            warn!(
                "Unknown chip id {:#04x}, expected {:#04x}; continuing",
                chip_id,
                regs::CHIP_ID
            );
        }

        let calib_data = self.get_calib_data()?;

        // Oversampling is latched together with a mode write, so stay asleep
        // while the rest of the configuration goes out.
        self.write_reg(regs::ADDR_CTRL_MEAS, self.config.ctrl_meas(Mode::Sleep))?;

        let config_reg = self.config.config_reg();
        if config_reg != 0 {
            self.write_reg(regs::ADDR_CONFIG, config_reg)?;
        }

        self.write_reg(regs::ADDR_CTRL_HUM, self.config.ctrl_hum())?;
        self.write_reg(regs::ADDR_CTRL_MEAS, self.config.ctrl_meas(self.config.mode))?;

        Ok(Bme280 {
            bus: self.bus,
            config: self.config,
            chip_id,
            calib_data,
            last: None,
            _state: PhantomData,
        })
    }

    /// Reads factory-fused calibration coefficients from the sensor's NVM.
    ///
    /// The BME280 stores calibration data in two non-contiguous memory blocks.
    fn get_calib_data(&mut self) -> error::Result<CalibData, BUS::Error> {
        let mut tp = [0u8; regs::len::CALIB_00];
        let mut h = [0u8; regs::len::CALIB_26];

        self.read_into(regs::ADDR_CALIB_00, &mut tp)?;
        self.read_into(regs::ADDR_CALIB_26, &mut h)?;

        let calib_data = CalibData::from_blocks(&tp, &h);
        debug!("Got calibration data: {calib_data:?}");
        Ok(calib_data)
    }
}

impl<BUS, STATE> Bme280<BUS, STATE>
where
    BUS: RegisterBus,
{
    /// Burst-reads registers starting at `reg_address` into `buffer`.
    fn read_into(&mut self, reg_address: u8, buffer: &mut [u8]) -> error::Result<(), BUS::Error> {
        self.bus
            .read_registers(reg_address, buffer)
            .map_err(error::Bme280Error::Bus)
    }

    /// Reads a single byte from a specific register address.
    fn read_reg_byte(&mut self, reg_address: u8) -> error::Result<u8, BUS::Error> {
        let mut buffer = [0];
        self.read_into(reg_address, &mut buffer)?;
        Ok(buffer[0])
    }

    fn write_reg(&mut self, reg_address: u8, value: u8) -> error::Result<(), BUS::Error> {
        debug!("Setting register {reg_address:#04x} to value {value:#010b}");
        self.bus
            .write_register(reg_address, value)
            .map_err(error::Bme280Error::Bus)
    }

    /// Gives back the underlying bus.
    pub fn release(self) -> BUS {
        self.bus
    }
}

impl<BUS> Bme280<BUS, Ready>
where
    BUS: RegisterBus,
{
    /// Takes one compensated measurement.
    ///
    /// In forced mode this triggers a conversion and blocks until the sensor
    /// reports completion, polling the status register through `delay`.
    /// In normal mode the latest free-running conversion is read.
    ///
    /// The result is also kept and available through [`Self::last_measurement`].
    ///
    /// # Errors
    /// [`error::Bme280Error::Timeout`] if a forced conversion does not finish
    /// within [`Config::poll_timeout`].
    pub fn measure(&mut self, delay: &mut impl DelayNs) -> error::Result<Measurement, BUS::Error> {
        if self.config.mode == Mode::Forced {
            self.write_reg(regs::ADDR_CTRL_MEAS, self.config.ctrl_meas(Mode::Forced))?;
            self.wait_for_conversion(delay)?;
        }

        let raw_data = self.read_raw()?;
        let measurement = Measurement::from(self.calib_data.compensate(&raw_data));

        self.last = Some(measurement);
        Ok(measurement)
    }

    /// Reads the data registers without compensating them.
    pub fn read_raw(&mut self) -> error::Result<RawData, BUS::Error> {
        let mut buffer = [0u8; regs::len::RAW_DATA];
        self.read_into(regs::ADDR_PRESS_MSB, &mut buffer)?;

        let raw_data = RawData::from_burst(&buffer);
        debug!("Got raw data: {raw_data:?}");
        Ok(raw_data)
    }

    /// Polls `status.measuring` until it clears or the timeout expires.
    fn wait_for_conversion(&mut self, delay: &mut impl DelayNs) -> error::Result<(), BUS::Error> {
        let interval = self.config.poll_interval.0.max(1);
        let timeout = self.config.poll_timeout.0;
        let mut waited = 0u32;

        loop {
            let status = self.read_reg_byte(regs::ADDR_STATUS)?;
            if status & regs::STATUS_MEASURING == 0 {
                debug!("Conversion finished after ~{waited} ms");
                return Ok(());
            }

            if waited >= timeout {
                error!("Conversion still running after {timeout} ms");
                return Err(error::Bme280Error::Timeout);
            }

            delay.delay_ms(interval);
            waited = waited.saturating_add(interval);
        }
    }

    /// Switches the operating mode, keeping the configured oversampling.
    pub fn set_mode(&mut self, mode: Mode) -> error::Result<(), BUS::Error> {
        self.write_reg(regs::ADDR_CTRL_MEAS, self.config.ctrl_meas(mode))?;
        self.config.mode = mode;
        Ok(())
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// The identity byte read during initialization (`0x60` for a BME280).
    pub fn chip_id(&self) -> u8 {
        self.chip_id
    }

    /// Calibration coefficients read during initialization.
    pub fn calibration(&self) -> &CalibData {
        &self.calib_data
    }

    /// The active configuration. `mode` follows [`Self::set_mode`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The result of the most recent successful [`Self::measure`] call.
    pub fn last_measurement(&self) -> Option<Measurement> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_burst_unpacks_20_and_16_bit_values() {
        let raw = RawData::from_burst(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]);
        assert_eq!(raw.press_adc, 415_148);
        assert_eq!(raw.temp_adc, 519_888);
        assert_eq!(raw.hum_adc, 30_000);
    }

    #[test]
    fn raw_burst_ignores_low_nibble_of_xlsb() {
        let raw = RawData::from_burst(&[0xFF, 0xFF, 0xFF, 0x80, 0x00, 0x0F, 0xFF, 0xFF]);
        assert_eq!(raw.press_adc, 0xFFFFF);
        assert_eq!(raw.temp_adc, 0x80000);
        assert_eq!(raw.hum_adc, 0xFFFF);
    }

    #[test]
    fn measurement_scales_fixed_point_results() {
        let m = Measurement::from(Compensated {
            temperature: 2508,
            pressure: 100_656,
            humidity: 56_317,
            t_fine: FineTemperature(128_422),
        });

        assert!((m.temperature - 25.08).abs() < 1e-4);
        assert!((m.pressure - 1006.56).abs() < 1e-3);
        assert!((m.humidity - 54.997_07).abs() < 1e-3);
        assert_eq!(m.altitude, altitude(m.pressure, m.temperature));
    }

    #[test]
    fn error_messages() {
        let e: error::Bme280Error<()> = error::Bme280Error::UnexpectedChipId(0x58);
        assert_eq!(format!("{e}"), "unexpected chip id 0x58");
        assert_eq!(
            format!("{}", error::Bme280Error::<()>::Timeout),
            "measurement timed out"
        );
    }
}
