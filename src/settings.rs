use crate::{regs, Milliseconds};

/// Oversampling settings for Temperature, Pressure and Humidity.
///
/// Higher rates reduce noise by averaging inside the sensor, but lengthen
/// each conversion and raise the energy spent per measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Oversampling {
    /// No measurement. The channel reads back as `0x80000` (`0x8000` for humidity).
    Skipped = 0b000,
    /// 1x Oversampling.
    #[default]
    X1 = 0b001,
    /// 2x Oversampling.
    X2 = 0b010,
    /// 4x Oversampling.
    X4 = 0b011,
    /// 8x Oversampling.
    X8 = 0b100,
    /// 16x Oversampling. Maximum precision, longest conversion.
    X16 = 0b101,
}

impl Oversampling {
    /// Decodes a 3-bit `osrs_x` field. `0b101` and above all mean x16.
    pub fn from_bits(value: u8) -> Self {
        match value & 0x07 {
            0b000 => Oversampling::Skipped,
            0b001 => Oversampling::X1,
            0b010 => Oversampling::X2,
            0b011 => Oversampling::X4,
            0b100 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Operating mode, the `mode[1:0]` field of `ctrl_meas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// No conversions, lowest power. Reset state.
    Sleep = 0b00,
    /// One conversion per trigger write, then back to sleep.
    Forced = 0b01,
    /// Continuous conversions separated by the standby time.
    #[default]
    Normal = 0b11,
}

impl Mode {
    /// Decodes `mode[1:0]`. Both `0b01` and `0b10` select forced mode.
    pub fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0b00 => Mode::Sleep,
            0b11 => Mode::Normal,
            _ => Mode::Forced,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Coefficient of the IIR filter applied to pressure and temperature.
///
/// Has no influence on humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Filter {
    /// Filter off.
    #[default]
    Off = 0b000,
    X2 = 0b001,
    X4 = 0b010,
    X8 = 0b011,
    X16 = 0b100,
}

/// Inactive duration between two conversions in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Standby {
    #[default]
    Micros500 = 0b000,
    Micros62500 = 0b001,
    Millis125 = 0b010,
    Millis250 = 0b011,
    Millis500 = 0b100,
    Millis1000 = 0b101,
    Millis10 = 0b110,
    Millis20 = 0b111,
}

/// Grouped oversampling configuration for the three channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OversamplingConfig {
    /// Temperature oversampling.
    pub temp_osrs: Oversampling,
    /// Pressure oversampling.
    pub pres_osrs: Oversampling,
    /// Humidity oversampling.
    pub hum_osrs: Oversampling,
}

impl Default for OversamplingConfig {
    /// x4 temperature, x4 pressure, x1 humidity.
    fn default() -> Self {
        Self {
            temp_osrs: Oversampling::X4,
            pres_osrs: Oversampling::X4,
            hum_osrs: Oversampling::X1,
        }
    }
}

/// Complete driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Oversampling settings for T, P and H.
    pub osrs: OversamplingConfig,
    /// Operating mode entered at the end of initialization and kept in
    /// sync with later mode changes.
    pub mode: Mode,
    /// IIR filter coefficient.
    pub filter: Filter,
    /// Standby time in normal mode.
    pub standby: Standby,
    /// Fail initialization if the chip ID is not `0x60`.
    ///
    /// When `false` a mismatch is only logged.
    pub strict_chip_id: bool,
    /// Wait between two status reads while a forced conversion runs.
    pub poll_interval: Milliseconds,
    /// Upper bound for the forced conversion wait.
    pub poll_timeout: Milliseconds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            osrs: OversamplingConfig::default(),
            mode: Mode::Normal,
            filter: Filter::Off,
            standby: Standby::Micros500,
            strict_chip_id: true,
            poll_interval: Milliseconds(1),
            poll_timeout: Milliseconds(200),
        }
    }
}

impl Config {
    /// `ctrl_meas` value with the configured oversampling and the given mode.
    pub fn ctrl_meas(&self, mode: Mode) -> u8 {
        regs::encode_ctrl_meas(
            self.osrs.temp_osrs.bits(),
            self.osrs.pres_osrs.bits(),
            mode.bits(),
        )
    }

    pub fn ctrl_hum(&self) -> u8 {
        regs::encode_ctrl_hum(self.osrs.hum_osrs.bits())
    }

    /// `config` register value. 3-wire SPI is never enabled.
    pub fn config_reg(&self) -> u8 {
        regs::encode_config(self.standby as u8, self.filter as u8, false)
    }
}

/// Builder for a [`Config`], starting from the defaults.
#[derive(Default)]
pub struct Bme280Builder {
    config: Config,
}

impl Bme280Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temperature oversampling.
    pub fn temp_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs.temp_osrs = os;
        self
    }

    /// Sets the pressure oversampling.
    pub fn pres_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs.pres_osrs = os;
        self
    }

    /// Sets the humidity oversampling.
    pub fn hum_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs.hum_osrs = os;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn standby(mut self, standby: Standby) -> Self {
        self.config.standby = standby;
        self
    }

    /// Chooses whether an unknown chip ID aborts initialization.
    pub fn strict_chip_id(mut self, strict: bool) -> Self {
        self.config.strict_chip_id = strict;
        self
    }

    pub fn poll_interval(mut self, interval: Milliseconds) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Sets how long a forced conversion may take before `measure` gives up.
    pub fn poll_timeout(mut self, timeout: Milliseconds) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Config {
        self.config
    }
}
