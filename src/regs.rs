//! Register map and bit layouts of the BME280.
//!
//! The packed control registers are handled by plain encode/decode functions
//! on `u8` instead of bit-field structs, so the layout is spelled out here once.

/// Chip identification number, expected to read [`CHIP_ID`].
pub const ADDR_ID: u8 = 0xD0;
/// First calibration block (`calib00..calib25`).
pub const ADDR_CALIB_00: u8 = 0x88;
/// Second calibration block (`calib26..calib33`).
pub const ADDR_CALIB_26: u8 = 0xE1;
/// Humidity oversampling (`osrs_h[2:0]`).
pub const ADDR_CTRL_HUM: u8 = 0xF2;
/// Device status (`measuring[3]`).
pub const ADDR_STATUS: u8 = 0xF3;
/// Temperature/pressure oversampling and operating mode.
pub const ADDR_CTRL_MEAS: u8 = 0xF4;
/// Standby time, IIR filter and 3-wire SPI enable.
pub const ADDR_CONFIG: u8 = 0xF5;
/// Start of the 8-byte data burst (`press_msb` .. `hum_lsb`).
pub const ADDR_PRESS_MSB: u8 = 0xF7;

/// Value of [`ADDR_ID`] for the BME280.
pub const CHIP_ID: u8 = 0x60;

/// Sizes of the burst reads issued by the driver.
pub mod len {
    pub const CALIB_00: usize = 26;
    pub const CALIB_26: usize = 8;
    pub const RAW_DATA: usize = 8;
}

/// Bit 7 of the address byte on SPI: set for reads, cleared for writes.
pub const SPI_READ_BIT: u8 = 0x80;

/// `status[3]`: set while a conversion is running.
pub const STATUS_MEASURING: u8 = 0x08;

const CTRL_MEAS_OSRS_T_POS: u8 = 5;
const CTRL_MEAS_OSRS_P_POS: u8 = 2;
const CTRL_MEAS_MODE_MSK: u8 = 0x03;
const OSRS_MSK: u8 = 0x07;

const CONFIG_T_SB_POS: u8 = 5;
const CONFIG_FILTER_POS: u8 = 2;
const CONFIG_SPI3W_EN_MSK: u8 = 0x01;

/// Packs `ctrl_meas` as `osrs_t[7:5] | osrs_p[4:2] | mode[1:0]`.
///
/// Bits outside each field's width are discarded.
pub const fn encode_ctrl_meas(osrs_t: u8, osrs_p: u8, mode: u8) -> u8 {
    ((osrs_t & OSRS_MSK) << CTRL_MEAS_OSRS_T_POS)
        | ((osrs_p & OSRS_MSK) << CTRL_MEAS_OSRS_P_POS)
        | (mode & CTRL_MEAS_MODE_MSK)
}

/// Splits `ctrl_meas` into `(osrs_t, osrs_p, mode)`.
pub const fn decode_ctrl_meas(value: u8) -> (u8, u8, u8) {
    (
        (value >> CTRL_MEAS_OSRS_T_POS) & OSRS_MSK,
        (value >> CTRL_MEAS_OSRS_P_POS) & OSRS_MSK,
        value & CTRL_MEAS_MODE_MSK,
    )
}

/// Packs `ctrl_hum` (`osrs_h[2:0]`, the upper bits are reserved).
pub const fn encode_ctrl_hum(osrs_h: u8) -> u8 {
    osrs_h & OSRS_MSK
}

/// Packs `config` as `t_sb[7:5] | filter[4:2] | spi3w_en[0]`.
pub const fn encode_config(t_sb: u8, filter: u8, spi3w_en: bool) -> u8 {
    ((t_sb & 0x07) << CONFIG_T_SB_POS)
        | ((filter & 0x07) << CONFIG_FILTER_POS)
        | (spi3w_en as u8 & CONFIG_SPI3W_EN_MSK)
}

/// Splits `config` into `(t_sb, filter, spi3w_en)`.
pub const fn decode_config(value: u8) -> (u8, u8, bool) {
    (
        (value >> CONFIG_T_SB_POS) & 0x07,
        (value >> CONFIG_FILTER_POS) & 0x07,
        value & CONFIG_SPI3W_EN_MSK != 0,
    )
}
