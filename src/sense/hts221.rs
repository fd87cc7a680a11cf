use embedded_hal::i2c::I2c;

use super::Registers;
use crate::Result;

pub const ADDRESS: u8 = 0x5F;

const WHO_AM_I: u8 = 0x0F;
const ID: u8 = 0xBC;
const AV_CONF: u8 = 0x10;
const CTRL_REG1: u8 = 0x20;
const HUMIDITY_OUT_L: u8 = 0x28;
const TEMP_OUT_L: u8 = 0x2A;
const CALIB_START: u8 = 0x30;

/// 32 humidity / 16 temperature samples per reading.
const AV_CONF_DEFAULT: u8 = 0x1B;
/// Powered, block data update, 12.5 Hz.
const CTRL_REG1_ACTIVE: u8 = 0x87;

/// Factory calibration: two reference points per quantity, linearly interpolated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    h0_rh: f64,
    h1_rh: f64,
    h0_t0_out: i16,
    h1_t0_out: i16,
    t0_degc: f64,
    t1_degc: f64,
    t0_out: i16,
    t1_out: i16,
}

impl Calibration {
    /// `r` is the register block 0x30..=0x3F.
    pub fn from_registers(r: &[u8; 16]) -> Self {
        let msb = r[5];
        let t0_x8 = (u16::from(msb & 0x03) << 8) | u16::from(r[2]);
        let t1_x8 = (u16::from((msb & 0x0C) >> 2) << 8) | u16::from(r[3]);
        Self {
            h0_rh: f64::from(r[0]) / 2.0,
            h1_rh: f64::from(r[1]) / 2.0,
            h0_t0_out: i16::from_le_bytes([r[6], r[7]]),
            h1_t0_out: i16::from_le_bytes([r[10], r[11]]),
            t0_degc: f64::from(t0_x8) / 8.0,
            t1_degc: f64::from(t1_x8) / 8.0,
            t0_out: i16::from_le_bytes([r[12], r[13]]),
            t1_out: i16::from_le_bytes([r[14], r[15]]),
        }
    }

    pub fn humidity(&self, raw: i16) -> f64 {
        interpolate(raw, (self.h0_t0_out, self.h0_rh), (self.h1_t0_out, self.h1_rh))
    }

    pub fn temperature(&self, raw: i16) -> f64 {
        interpolate(raw, (self.t0_out, self.t0_degc), (self.t1_out, self.t1_degc))
    }
}

fn interpolate(raw: i16, (x0, y0): (i16, f64), (x1, y1): (i16, f64)) -> f64 {
    if x0 == x1 {
        return y0;
    }
    y0 + (y1 - y0) * f64::from(i32::from(raw) - i32::from(x0)) / f64::from(i32::from(x1) - i32::from(x0))
}

pub struct Hts221<I> {
    i2c: I,
    regs: Registers,
    calibration: Calibration,
}

impl<I: I2c> Hts221<I> {
    pub fn new(mut i2c: I) -> Result<Self> {
        let regs = Registers {
            address: ADDRESS,
            auto_increment: 0x80,
        };
        regs.check_id(&mut i2c, WHO_AM_I, ID)?;
        regs.write(&mut i2c, AV_CONF, AV_CONF_DEFAULT)?;
        regs.write(&mut i2c, CTRL_REG1, CTRL_REG1_ACTIVE)?;
        let mut block = [0u8; 16];
        regs.read_many(&mut i2c, CALIB_START, &mut block)?;
        Ok(Self {
            i2c,
            regs,
            calibration: Calibration::from_registers(&block),
        })
    }

    /// Percent relative humidity.
    pub fn humidity(&mut self) -> Result<f64> {
        let raw = self.read_i16(HUMIDITY_OUT_L)?;
        Ok(self.calibration.humidity(raw))
    }

    pub fn temperature(&mut self) -> Result<f64> {
        let raw = self.read_i16(TEMP_OUT_L)?;
        Ok(self.calibration.temperature(raw))
    }

    fn read_i16(&mut self, reg: u8) -> Result<i16> {
        let mut b = [0u8; 2];
        self.regs.read_many(&mut self.i2c, reg, &mut b)?;
        Ok(i16::from_le_bytes(b))
    }
}
