use embedded_hal::i2c::I2c;
use nalgebra::Vector3;

use super::Registers;
use crate::Result;

pub const ACCEL_GYRO_ADDRESS: u8 = 0x6A;
pub const MAGNETOMETER_ADDRESS: u8 = 0x1C;

const WHO_AM_I: u8 = 0x0F;
const AG_ID: u8 = 0x68;
const M_ID: u8 = 0x3D;

const CTRL_REG1_G: u8 = 0x10;
const CTRL_REG6_XL: u8 = 0x20;
const CTRL_REG8: u8 = 0x22;
const OUT_X_L_XL: u8 = 0x28;

const CTRL_REG1_M: u8 = 0x20;
const CTRL_REG2_M: u8 = 0x21;
const CTRL_REG3_M: u8 = 0x22;
const CTRL_REG4_M: u8 = 0x23;
const OUT_X_L_M: u8 = 0x28;

/// 119 Hz, 245 dps.
const GYRO_119HZ: u8 = 0x60;
/// 119 Hz, +-2 g.
const ACCEL_119HZ_2G: u8 = 0x60;
/// Block data update, register address auto-increment.
const BDU_IF_ADD_INC: u8 = 0x44;
/// Ultra-high performance X/Y, 10 Hz.
const MAG_XY_UHP_10HZ: u8 = 0x70;
const MAG_4_GAUSS: u8 = 0x00;
const MAG_CONTINUOUS: u8 = 0x00;
const MAG_Z_UHP: u8 = 0x0C;

const G_PER_LSB: f64 = 0.000_061;
const GAUSS_PER_LSB: f64 = 0.000_14;

pub struct Lsm9ds1<I> {
    i2c: I,
    accel_gyro: Registers,
    magnetometer: Registers,
}

impl<I: I2c> Lsm9ds1<I> {
    pub fn new(mut i2c: I) -> Result<Self> {
        let accel_gyro = Registers {
            address: ACCEL_GYRO_ADDRESS,
            // IF_ADD_INC in CTRL_REG8 handles increments
            auto_increment: 0x00,
        };
        let magnetometer = Registers {
            address: MAGNETOMETER_ADDRESS,
            auto_increment: 0x80,
        };
        accel_gyro.check_id(&mut i2c, WHO_AM_I, AG_ID)?;
        magnetometer.check_id(&mut i2c, WHO_AM_I, M_ID)?;

        accel_gyro.write(&mut i2c, CTRL_REG8, BDU_IF_ADD_INC)?;
        accel_gyro.write(&mut i2c, CTRL_REG1_G, GYRO_119HZ)?;
        accel_gyro.write(&mut i2c, CTRL_REG6_XL, ACCEL_119HZ_2G)?;

        magnetometer.write(&mut i2c, CTRL_REG1_M, MAG_XY_UHP_10HZ)?;
        magnetometer.write(&mut i2c, CTRL_REG2_M, MAG_4_GAUSS)?;
        magnetometer.write(&mut i2c, CTRL_REG3_M, MAG_CONTINUOUS)?;
        magnetometer.write(&mut i2c, CTRL_REG4_M, MAG_Z_UHP)?;

        Ok(Self {
            i2c,
            accel_gyro,
            magnetometer,
        })
    }

    /// g on each axis.
    pub fn acceleration(&mut self) -> Result<Vector3<f64>> {
        let raw = read_axes(&self.accel_gyro, &mut self.i2c, OUT_X_L_XL)?;
        Ok(raw * G_PER_LSB)
    }

    /// Gauss on each axis.
    pub fn magnetic_field(&mut self) -> Result<Vector3<f64>> {
        let raw = read_axes(&self.magnetometer, &mut self.i2c, OUT_X_L_M)?;
        Ok(raw * GAUSS_PER_LSB)
    }
}

fn read_axes<I: I2c>(regs: &Registers, i2c: &mut I, reg: u8) -> Result<Vector3<f64>> {
    let mut b = [0u8; 6];
    regs.read_many(i2c, reg, &mut b)?;
    let axis = |i: usize| f64::from(i16::from_le_bytes([b[i], b[i + 1]]));
    Ok(Vector3::new(axis(0), axis(2), axis(4)))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::sense::fake_bus::FakeBus;

    fn bus() -> FakeBus {
        let bus = FakeBus::default();
        bus.set(ACCEL_GYRO_ADDRESS, WHO_AM_I, &[AG_ID]);
        bus.set(MAGNETOMETER_ADDRESS, WHO_AM_I, &[M_ID]);
        bus
    }

    fn axes(x: i16, y: i16, z: i16) -> Vec<u8> {
        [x, y, z].iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn configures_both_chips() {
        let bus = bus();
        Lsm9ds1::new(bus.clone()).unwrap();
        let writes = bus.writes();
        assert!(writes.contains(&(ACCEL_GYRO_ADDRESS, CTRL_REG6_XL, ACCEL_119HZ_2G)));
        assert!(writes.contains(&(MAGNETOMETER_ADDRESS, CTRL_REG3_M, MAG_CONTINUOUS)));
    }

    #[test]
    fn acceleration_in_g() {
        let bus = bus();
        let mut imu = Lsm9ds1::new(bus.clone()).unwrap();
        bus.set(ACCEL_GYRO_ADDRESS, OUT_X_L_XL, &axes(0, -1000, 16393));
        let acc = imu.acceleration().unwrap();
        assert_relative_eq!(acc.x, 0.0);
        assert_relative_eq!(acc.y, -0.061, epsilon = 1e-9);
        assert_relative_eq!(acc.z, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn magnetic_field_in_gauss() {
        let bus = bus();
        let mut imu = Lsm9ds1::new(bus.clone()).unwrap();
        bus.set(MAGNETOMETER_ADDRESS, OUT_X_L_M, &axes(1000, 0, -2000));
        let mag = imu.magnetic_field().unwrap();
        assert_relative_eq!(mag.x, 0.14, epsilon = 1e-9);
        assert_relative_eq!(mag.z, -0.28, epsilon = 1e-9);
    }
}
