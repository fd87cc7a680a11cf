use embedded_hal::i2c::I2c;

use super::Registers;
use crate::Result;

pub const ADDRESS: u8 = 0x5C;

const WHO_AM_I: u8 = 0x0F;
const ID: u8 = 0xBD;
const CTRL_REG1: u8 = 0x20;
const STATUS_REG: u8 = 0x27;
const PRESS_OUT_XL: u8 = 0x28;

/// Powered, 25 Hz, block data update.
const CTRL_REG1_ACTIVE: u8 = 0xC4;
const P_DA: u8 = 0x02;

const LSB_PER_HPA: f64 = 4096.0;

pub struct Lps25h<I> {
    i2c: I,
    regs: Registers,
}

impl<I: I2c> Lps25h<I> {
    pub fn new(mut i2c: I) -> Result<Self> {
        let regs = Registers {
            address: ADDRESS,
            auto_increment: 0x80,
        };
        regs.check_id(&mut i2c, WHO_AM_I, ID)?;
        regs.write(&mut i2c, CTRL_REG1, CTRL_REG1_ACTIVE)?;
        Ok(Self { i2c, regs })
    }

    /// hPa (= millibar), or 0 when no new sample is ready.
    pub fn pressure(&mut self) -> Result<f64> {
        if self.regs.read(&mut self.i2c, STATUS_REG)? & P_DA == 0 {
            return Ok(0.0);
        }
        let mut b = [0u8; 3];
        self.regs.read_many(&mut self.i2c, PRESS_OUT_XL, &mut b)?;
        let raw = (i32::from(b[2] as i8) << 16) | (i32::from(b[1]) << 8) | i32::from(b[0]);
        Ok(f64::from(raw) / LSB_PER_HPA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sense::fake_bus::FakeBus, Error};

    fn bus() -> FakeBus {
        let bus = FakeBus::default();
        bus.set(ADDRESS, WHO_AM_I, &[ID]);
        bus
    }

    #[test]
    fn powers_up_on_init() {
        let bus = bus();
        Lps25h::new(bus.clone()).unwrap();
        assert_eq!(bus.writes(), vec![(ADDRESS, CTRL_REG1, CTRL_REG1_ACTIVE)]);
    }

    #[test]
    fn wrong_chip_is_rejected() {
        let bus = FakeBus::default();
        bus.set(ADDRESS, WHO_AM_I, &[0x00]);
        assert!(matches!(
            Lps25h::new(bus),
            Err(Error::WrongDevice { found: 0, .. })
        ));
    }

    #[test]
    fn missing_chip_is_i2c_error() {
        assert!(matches!(
            Lps25h::new(FakeBus::default()),
            Err(Error::I2c(_))
        ));
    }

    #[test]
    fn pressure_is_zero_until_ready() {
        let bus = bus();
        let mut s = Lps25h::new(bus.clone()).unwrap();
        bus.set(ADDRESS, PRESS_OUT_XL, &[0x00, 0x50, 0x3F]);
        assert_eq!(s.pressure().unwrap(), 0.0);
        bus.set(ADDRESS, STATUS_REG, &[P_DA]);
        // 0x3F5000 / 4096 = 1013.0
        assert_eq!(s.pressure().unwrap(), 1013.0);
    }
}
