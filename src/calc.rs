use crate::{regs, Compensated, FineTemperature, RawData};

/// Sea level reference pressure for the altitude estimate, in hPa.
pub const SEA_LEVEL_HPA: f32 = 1013.25;

/// Upper saturation bound of the humidity accumulator (100 %RH in Q22.10 << 12).
const HUMIDITY_ACC_MAX: i32 = 419_430_400;

/// Factory-fused calibration coefficients read from the sensor.
/// These are unique to every individual chip and required for compensation formulas.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibData {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl CalibData {
    /// Maps the two calibration blocks onto the coefficients.
    ///
    /// `tp` is read from `0x88` (`calib00..calib25`), `h` from `0xE1`
    /// (`calib26..calib33`). See BME280 datasheet, Table 16.
    pub fn from_blocks(tp: &[u8; regs::len::CALIB_00], h: &[u8; regs::len::CALIB_26]) -> Self {
        let le_u16 = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let le_i16 = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        Self {
            dig_t1: le_u16(0),
            dig_t2: le_i16(2),
            dig_t3: le_i16(4),
            dig_p1: le_u16(6),
            dig_p2: le_i16(8),
            dig_p3: le_i16(10),
            dig_p4: le_i16(12),
            dig_p5: le_i16(14),
            dig_p6: le_i16(16),
            dig_p7: le_i16(18),
            dig_p8: le_i16(20),
            dig_p9: le_i16(22),
            // tp[24] (0xA0) is not used
            dig_h1: tp[25],
            dig_h2: i16::from_le_bytes([h[0], h[1]]),
            dig_h3: h[2],
            // 0xE4[7:0] / 0xE5[3:0] = H4[11:4] / H4[3:0]
            dig_h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            // 0xE5[7:4] / 0xE6[7:0] = H5[3:0] / H5[11:4]
            dig_h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            dig_h6: h[6] as i8,
        }
    }

    /// Runs the full compensation chain on one raw sample.
    ///
    /// Temperature goes first because its `t_fine` feeds the other two.
    pub fn compensate(&self, raw: &RawData) -> Compensated {
        let (temperature, t_fine) = self.compensate_temperature(raw.temp_adc as i32);
        let pressure = self.compensate_pressure(t_fine, raw.press_adc as i32);
        let humidity = self.compensate_humidity(t_fine, raw.hum_adc as i32);

        Compensated {
            temperature,
            pressure,
            humidity,
            t_fine,
        }
    }

    /// Converts the raw temperature ADC value to centi-degrees Celsius.
    ///
    /// Also returns `t_fine`, which pressure and humidity compensation need.
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, FineTemperature) {
        let t1 = self.dig_t1 as i32;
        let t2 = self.dig_t2 as i32;
        let t3 = self.dig_t3 as i32;

        let var1 = ((adc_t >> 3).wrapping_sub(t1 << 1)).wrapping_mul(t2) >> 11;
        let d = (adc_t >> 4).wrapping_sub(t1);
        let var2 = ((d.wrapping_mul(d) >> 12).wrapping_mul(t3)) >> 14;

        let t_fine = var1.wrapping_add(var2);
        (
            t_fine.wrapping_mul(5).wrapping_add(128) >> 8,
            FineTemperature(t_fine),
        )
    }

    /// Converts the raw pressure ADC value to Pascal.
    ///
    /// Returns 0 if the calibration yields a zero divisor.
    pub fn compensate_pressure(&self, t_fine: FineTemperature, adc_p: i32) -> u32 {
        let p1 = self.dig_p1 as i32;
        let p2 = self.dig_p2 as i32;
        let p3 = self.dig_p3 as i32;
        let p4 = self.dig_p4 as i32;
        let p5 = self.dig_p5 as i32;
        let p6 = self.dig_p6 as i32;
        let p7 = self.dig_p7 as i32;
        let p8 = self.dig_p8 as i32;
        let p9 = self.dig_p9 as i32;

        let mut var1 = (t_fine.0 >> 1).wrapping_sub(64_000);
        let sq = (var1 >> 2).wrapping_mul(var1 >> 2);
        let mut var2 = (sq >> 11).wrapping_mul(p6);
        var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 1);
        var2 = (var2 >> 2).wrapping_add(p4 << 16);
        var1 = ((p3.wrapping_mul(sq >> 13) >> 3).wrapping_add(p2.wrapping_mul(var1) >> 1)) >> 18;
        var1 = 32768i32.wrapping_add(var1).wrapping_mul(p1) >> 15;

        if var1 == 0 {
            return 0;
        }

        let mut p = (1_048_576i32.wrapping_sub(adc_p).wrapping_sub(var2 >> 12) as u32)
            .wrapping_mul(3125);
        // the two orders are not bit-identical near the boundary
        if p < 0x8000_0000 {
            p = (p << 1) / (var1 as u32);
        } else {
            p = (p / (var1 as u32)).wrapping_mul(2);
        }

        let var1 = p9.wrapping_mul(((p >> 3).wrapping_mul(p >> 3) >> 13) as i32) >> 12;
        let var2 = ((p >> 2) as i32).wrapping_mul(p8) >> 13;
        (p as i32).wrapping_add(var1.wrapping_add(var2).wrapping_add(p7) >> 4) as u32
    }

    /// Converts the raw humidity ADC value to %RH in Q22.10 (divide by 1024).
    pub fn compensate_humidity(&self, t_fine: FineTemperature, adc_h: i32) -> u32 {
        let h1 = self.dig_h1 as i32;
        let h2 = self.dig_h2 as i32;
        let h3 = self.dig_h3 as i32;
        let h4 = self.dig_h4 as i32;
        let h5 = self.dig_h5 as i32;
        let h6 = self.dig_h6 as i32;

        let v = t_fine.0.wrapping_sub(76_800);
        let offset = (adc_h << 14)
            .wrapping_sub(h4 << 20)
            .wrapping_sub(h5.wrapping_mul(v))
            .wrapping_add(16_384)
            >> 15;
        let scale = ((v.wrapping_mul(h6) >> 10)
            .wrapping_mul((v.wrapping_mul(h3) >> 11).wrapping_add(32_768))
            >> 10)
            .wrapping_add(2_097_152)
            .wrapping_mul(h2)
            .wrapping_add(8192)
            >> 14;
        let mut v = offset.wrapping_mul(scale);
        let sq = (v >> 15).wrapping_mul(v >> 15);
        v = v.wrapping_sub((sq >> 7).wrapping_mul(h1) >> 4);
        let v = v.clamp(0, HUMIDITY_ACC_MAX);

        (v >> 12) as u32
    }
}

/// Altitude in metres above the reference pressure level.
///
/// `altitude = (T + 273.15) * (1 - r) / (r * 0.0065)` with
/// `r = (p / 1013.25)^(1 / 5.255)`.
pub fn altitude(pressure_hpa: f32, temperature_c: f32) -> f32 {
    let ratio = libm::powf(pressure_hpa / SEA_LEVEL_HPA, 1.0 / 5.255);
    (temperature_c + 273.15) * (1.0 - ratio) / (ratio * 0.0065)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coefficients of the worked example in the Bosch datasheet, with
    /// humidity coefficients of a production BME280.
    fn datasheet_calib() -> CalibData {
        CalibData {
            dig_t1: 27504,
            dig_t2: 26435,
            dig_t3: -1000,
            dig_p1: 36477,
            dig_p2: -10685,
            dig_p3: 3024,
            dig_p4: 2855,
            dig_p5: 140,
            dig_p6: -7,
            dig_p7: 15500,
            dig_p8: -14600,
            dig_p9: 6000,
            dig_h1: 75,
            dig_h2: 362,
            dig_h3: 0,
            dig_h4: 313,
            dig_h5: 50,
            dig_h6: 30,
        }
    }

    const TP_BLOCK: [u8; 26] = [
        0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, // T1..T3
        0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, // P1..P3
        0x27, 0x0B, 0x8C, 0x00, 0xF9, 0xFF, // P4..P6
        0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17, // P7..P9
        0x00, 0x4B, // unused, H1
    ];
    const H_BLOCK: [u8; 8] = [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E, 0x00];

    #[test]
    fn parses_calibration_blocks() {
        assert_eq!(CalibData::from_blocks(&TP_BLOCK, &H_BLOCK), datasheet_calib());
    }

    #[test]
    fn humidity_nibbles_are_sign_extended() {
        let h = [0, 0, 0, 0xF0, 0xA5, 0xFF, 0x80, 0];
        let calib = CalibData::from_blocks(&[0; 26], &h);
        // 0xF0 << 4 | 0x5, as a signed 12-bit value
        assert_eq!(calib.dig_h4, -251);
        // 0xFF << 4 | 0xA
        assert_eq!(calib.dig_h5, -6);
        assert_eq!(calib.dig_h6, -128);
    }

    #[test]
    fn temperature_matches_datasheet_example() {
        let (t, t_fine) = datasheet_calib().compensate_temperature(519_888);
        assert_eq!(t_fine, FineTemperature(128_422));
        assert_eq!(t, 2508);
    }

    #[test]
    fn pressure_matches_datasheet_example() {
        let calib = datasheet_calib();
        let p = calib.compensate_pressure(FineTemperature(128_422), 415_148);
        assert_eq!(p, 100_656);
    }

    #[test]
    fn pressure_takes_divide_first_branch_for_large_intermediates() {
        // adc_p = 0 pushes the intermediate above 0x8000_0000
        let calib = datasheet_calib();
        assert_eq!(calib.compensate_pressure(FineTemperature(128_422), 0), 173_204);
        assert_eq!(
            calib.compensate_pressure(FineTemperature(128_422), 300_000),
            120_601
        );
    }

    #[test]
    fn pressure_is_zero_when_divisor_vanishes() {
        let calib = CalibData {
            dig_p1: 0,
            ..datasheet_calib()
        };
        assert_eq!(calib.compensate_pressure(FineTemperature(128_422), 415_148), 0);
    }

    #[test]
    fn humidity_in_range() {
        let calib = datasheet_calib();
        assert_eq!(calib.compensate_humidity(FineTemperature(128_422), 30_000), 56_317);
        assert_eq!(calib.compensate_humidity(FineTemperature(128_422), 32_768), 72_045);
    }

    #[test]
    fn humidity_saturates_at_both_ends() {
        let calib = datasheet_calib();
        // accumulator reaches 1_035_415_128 before the clamp
        assert_eq!(
            calib.compensate_humidity(FineTemperature(128_422), 0xFFFF),
            (HUMIDITY_ACC_MAX >> 12) as u32
        );
        assert_eq!(calib.compensate_humidity(FineTemperature(128_422), 0xFFFF), 102_400);
        // accumulator is -486_364_973 before the clamp
        assert_eq!(calib.compensate_humidity(FineTemperature(128_422), 0), 0);
    }

    #[test]
    fn compensate_threads_t_fine_into_pressure_and_humidity() {
        let calib = datasheet_calib();
        let raw = RawData {
            press_adc: 415_148,
            temp_adc: 519_888,
            hum_adc: 30_000,
        };

        let out = calib.compensate(&raw);
        assert_eq!(out.t_fine, FineTemperature(128_422));
        assert_eq!(out.temperature, 2508);
        assert_eq!(out.pressure, calib.compensate_pressure(out.t_fine, 415_148));
        assert_eq!(out.humidity, calib.compensate_humidity(out.t_fine, 30_000));

        // a stale t_fine would have produced different values
        let stale = FineTemperature(100_000);
        assert_ne!(out.pressure, calib.compensate_pressure(stale, 415_148));
        assert_ne!(out.humidity, calib.compensate_humidity(stale, 30_000));
    }

    #[test]
    fn stuck_bus_data_compensates_without_panicking() {
        let calibs = [
            datasheet_calib(),
            CalibData::from_blocks(&[0xFF; 26], &[0xFF; 8]),
            CalibData::from_blocks(&[0; 26], &[0; 8]),
        ];
        let bursts = [[0x00; 8], [0xFF; 8]];

        for calib in &calibs {
            for burst in &bursts {
                let out = calib.compensate(&RawData::from_burst(burst));
                assert!(out.humidity <= 102_400);
            }
        }

        // MISO held low with real coefficients: temperature stays in range,
        // the pressure intermediates wrap
        let out = datasheet_calib().compensate(&RawData::from_burst(&[0; 8]));
        assert_eq!(out.t_fine, FineTemperature(-721_301));
        assert_eq!(out.temperature, -14_088);
    }

    #[test]
    fn altitude_is_zero_at_reference_pressure() {
        assert!(altitude(SEA_LEVEL_HPA, 25.08).abs() < 1e-3);
    }

    #[test]
    fn altitude_at_900_hpa() {
        // (15 + 273.15) * (1 - r) / (r * 0.0065), r = (900 / 1013.25)^(1 / 5.255)
        let alt = altitude(900.0, 15.0);
        assert!((alt - 1011.216).abs() < 0.1, "altitude = {alt}");
        assert!((altitude(900.0, 25.0) - 1046.309).abs() < 0.1);
    }
}
