//! Sense HAT environment and IMU board: LPS25H pressure, HTS221 humidity/temperature and
//! LSM9DS1 accelerometer/magnetometer, all on the same I2C bus.

use std::{io, path::Path, time::Duration};

use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use nalgebra::{Rotation3, Vector3};

use crate::{
    cancel::CancelToken,
    reading::{Environment, Orientation, Reading, SensorKind},
    workers::Reader,
    Error, Result,
};

pub mod hts221;
pub mod lps25h;
pub mod lsm9ds1;

pub use hts221::Hts221;
pub use lps25h::Lps25h;
pub use lsm9ds1::Lsm9ds1;

pub const DEFAULT_BUS: &str = "/dev/i2c-1";

const PRESSURE_POLL: Duration = Duration::from_millis(10);

/// Register access for one chip. `auto_increment` is OR-ed into the sub-address of
/// multi-byte reads on chips that need it.
pub(crate) struct Registers {
    pub address: u8,
    pub auto_increment: u8,
}

impl Registers {
    pub fn read<I: I2c>(&self, i2c: &mut I, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        i2c.write_read(self.address, &[reg], &mut buf)
            .map_err(Error::i2c)?;
        Ok(buf[0])
    }

    pub fn read_many<I: I2c>(&self, i2c: &mut I, reg: u8, buf: &mut [u8]) -> Result<()> {
        i2c.write_read(self.address, &[reg | self.auto_increment], buf)
            .map_err(Error::i2c)
    }

    pub fn write<I: I2c>(&self, i2c: &mut I, reg: u8, value: u8) -> Result<()> {
        i2c.write(self.address, &[reg, value]).map_err(Error::i2c)
    }

    pub fn check_id<I: I2c>(&self, i2c: &mut I, reg: u8, expected: u8) -> Result<()> {
        let found = self.read(i2c, reg)?;
        if found != expected {
            return Err(Error::WrongDevice {
                address: self.address,
                expected,
                found,
            });
        }
        Ok(())
    }
}

pub trait SenseBoard: Send {
    /// Millibar. Zero while the sensor has no sample ready.
    fn pressure(&mut self) -> Result<f64>;
    fn humidity(&mut self) -> Result<f64>;
    fn temperature(&mut self) -> Result<f64>;
    fn orientation(&mut self) -> Result<Orientation>;
    /// g on each axis.
    fn accelerometer_raw(&mut self) -> Result<Vector3<f64>>;
}

pub struct SenseHat<I = I2cdev> {
    barometer: Lps25h<I>,
    hygrometer: Hts221<I>,
    imu: Lsm9ds1<I>,
}

impl SenseHat<I2cdev> {
    pub fn open<P: AsRef<Path>>(bus: P) -> Result<Self> {
        let open = || I2cdev::new(bus.as_ref()).map_err(io::Error::other);
        Self::new(open()?, open()?, open()?)
    }
}

impl<I: I2c> SenseHat<I> {
    pub fn new(barometer: I, hygrometer: I, imu: I) -> Result<Self> {
        Ok(Self {
            barometer: Lps25h::new(barometer)?,
            hygrometer: Hts221::new(hygrometer)?,
            imu: Lsm9ds1::new(imu)?,
        })
    }
}

impl<I: I2c + Send> SenseBoard for SenseHat<I> {
    fn pressure(&mut self) -> Result<f64> {
        self.barometer.pressure()
    }

    fn humidity(&mut self) -> Result<f64> {
        self.hygrometer.humidity()
    }

    fn temperature(&mut self) -> Result<f64> {
        self.hygrometer.temperature()
    }

    fn orientation(&mut self) -> Result<Orientation> {
        let acc = self.imu.acceleration()?;
        let mag = self.imu.magnetic_field()?;
        Ok(orientation(&acc, &mag))
    }

    fn accelerometer_raw(&mut self) -> Result<Vector3<f64>> {
        self.imu.acceleration()
    }
}

/// Pitch and roll from the gravity vector, yaw from the tilt-compensated magnetic field.
/// Degrees in `[0, 360)`.
pub fn orientation(acc: &Vector3<f64>, mag: &Vector3<f64>) -> Orientation {
    let roll = acc.y.atan2(acc.z);
    let pitch = (-acc.x).atan2((acc.y * acc.y + acc.z * acc.z).sqrt());
    let level = Rotation3::from_euler_angles(roll, pitch, 0.0) * mag;
    let yaw = (-level.y).atan2(level.x);
    Orientation {
        pitch: degrees(pitch),
        roll: degrees(roll),
        yaw: degrees(yaw),
    }
}

fn degrees(rad: f64) -> f64 {
    rad.to_degrees().rem_euclid(360.0)
}

pub struct SenseReader<B> {
    board: B,
}

impl<B: SenseBoard> SenseReader<B> {
    pub fn new(board: B) -> Self {
        Self { board }
    }

    /// Waits for a positive pressure sample, then takes one of everything else.
    pub fn get_sense(&mut self, cancel: &CancelToken) -> Result<Environment> {
        let pressure = loop {
            cancel.check()?;
            let p = self.board.pressure()?;
            if p > 0.0 {
                break p;
            }
            cancel.sleep(PRESSURE_POLL)?;
        };
        Ok(Environment {
            pressure,
            humidity: self.board.humidity()?,
            temperature: self.board.temperature()?,
            orientation: self.board.orientation()?,
            acc: self.board.accelerometer_raw()?,
        })
    }
}

impl<B: SenseBoard> Reader for SenseReader<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::Sense
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        self.get_sense(cancel).map(Reading::Sense)
    }
}


#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use approx::assert_relative_eq;

    use super::*;

    struct FakeBoard {
        pressures: VecDeque<f64>,
    }

    impl SenseBoard for FakeBoard {
        fn pressure(&mut self) -> Result<f64> {
            Ok(self.pressures.pop_front().unwrap_or(0.0))
        }

        fn humidity(&mut self) -> Result<f64> {
            Ok(40.0)
        }

        fn temperature(&mut self) -> Result<f64> {
            Ok(21.5)
        }

        fn orientation(&mut self) -> Result<Orientation> {
            Ok(Orientation {
                pitch: 1.0,
                roll: 2.0,
                yaw: 3.0,
            })
        }

        fn accelerometer_raw(&mut self) -> Result<Vector3<f64>> {
            Ok(Vector3::new(0.0, 0.0, 1.0))
        }
    }

    #[test]
    fn non_positive_pressure_is_retried() {
        let mut r = SenseReader::new(FakeBoard {
            pressures: VecDeque::from([0.0, -3.0, 0.0, 1012.5]),
        });
        let env = r.get_sense(&CancelToken::new()).unwrap();
        assert_eq!(env.pressure, 1012.5);
        assert_eq!(env.humidity, 40.0);
        assert_eq!(env.orientation.yaw, 3.0);
        assert_eq!(Reading::Sense(env).fields().len(), 9);
    }

    #[test]
    fn pressure_wait_is_cancellable() {
        let token = CancelToken::new();
        token.cancel();
        let mut r = SenseReader::new(FakeBoard {
            pressures: VecDeque::new(),
        });
        assert!(r.get_sense(&token).unwrap_err().is_cancelled());
    }

    #[test]
    fn level_board_pointing_north() {
        let o = orientation(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.3, 0.0, 0.4));
        assert_relative_eq!(o.pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(o.roll, 0.0, epsilon = 1e-9);
        assert_relative_eq!(o.yaw, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rolled_board() {
        let (s, c) = 30f64.to_radians().sin_cos();
        let o = orientation(&Vector3::new(0.0, s, c), &Vector3::new(0.3, 0.0, 0.0));
        assert_relative_eq!(o.roll, 30.0, epsilon = 1e-9);
        assert_relative_eq!(o.pitch, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn heading_east_is_ninety_degrees() {
        let o = orientation(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, -0.3, 0.4));
        assert_relative_eq!(o.yaw, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_angles_wrap() {
        let o = orientation(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, 0.3, 0.4));
        assert_relative_eq!(o.yaw, 270.0, epsilon = 1e-9);
    }
}
