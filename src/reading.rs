use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_saver::CsvRecord;

/// Header of the console text log, trailing comma included.
pub const LOG_HEADER: &str =
    "time,lat,lon,alt,speed,climb,track,pressure,rh,temp,rx,ry,rz,accx,accy,accz,volt,pi_temp,";

pub const GPS_FIELDS: usize = 7;
pub const SENSE_FIELDS: usize = 9;
pub const STATUS_FIELDS: usize = 2;
pub const ROW_FIELDS: usize = GPS_FIELDS + SENSE_FIELDS + STATUS_FIELDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Gps,
    Sense,
    Status,
}

impl SensorKind {
    /// Fixed position of each reader's fields in a row.
    pub const ORDER: [SensorKind; 3] = [SensorKind::Gps, SensorKind::Sense, SensorKind::Status];

    pub fn index(self) -> usize {
        match self {
            SensorKind::Gps => 0,
            SensorKind::Sense => 1,
            SensorKind::Status => 2,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SensorKind::Gps => "gps",
            SensorKind::Sense => "sense",
            SensorKind::Status => "status",
        })
    }
}

/// One complete TPV report from gpsd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub time: String,
    pub lon: f64,
    pub lat: f64,
    pub alt: f64,
    pub speed: f64,
    pub climb: f64,
    pub track: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Millibar, always > 0.
    pub pressure: f64,
    /// Percent relative humidity.
    pub humidity: f64,
    /// Degrees Celsius, from the humidity sensor.
    pub temperature: f64,
    pub orientation: Orientation,
    /// Raw accelerometer, in g.
    pub acc: nalgebra::Vector3<f64>,
}

/// Host values exactly as `vcgencmd` prints them, units included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    pub voltage: String,
    pub cpu_temp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Reading {
    Gps(Fix),
    Sense(Environment),
    Status(HostStatus),
}

impl Reading {
    pub fn kind(&self) -> SensorKind {
        match self {
            Reading::Gps(_) => SensorKind::Gps,
            Reading::Sense(_) => SensorKind::Sense,
            Reading::Status(_) => SensorKind::Status,
        }
    }

    /// Text fields in log order. Floats keep their shortest round-trip form with a
    /// trailing `.0` on whole numbers, which is how existing logs render them.
    pub fn fields(&self) -> Vec<String> {
        match self {
            Reading::Gps(fix) => vec![
                fix.time.clone(),
                float(fix.lon),
                float(fix.lat),
                float(fix.alt),
                float(fix.speed),
                float(fix.climb),
                float(fix.track),
            ],
            Reading::Sense(env) => vec![
                float(env.pressure),
                float(env.humidity),
                float(env.temperature),
                float(env.orientation.pitch),
                float(env.orientation.roll),
                float(env.orientation.yaw),
                float(env.acc.x),
                float(env.acc.y),
                float(env.acc.z),
            ],
            Reading::Status(status) => vec![status.voltage.clone(), status.cpu_temp.clone()],
        }
    }
}

fn float(v: f64) -> String {
    format!("{v:?}")
}

/// Flat row of the panel CSV; field names are the CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRecord {
    pub time: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub speed: f64,
    pub climb: f64,
    pub track: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub temp: f64,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub voltage: String,
    pub cpu_temp: String,
}

impl CsvRecord for PanelRecord {
    const HEADER: &'static [&'static str] = &[
        "time", "lat", "lon", "alt", "speed", "climb", "track", "pressure", "humidity", "temp",
        "pitch", "roll", "yaw", "acc_x", "acc_y", "acc_z", "voltage", "cpu_temp",
    ];
}

impl PanelRecord {
    pub fn combine(gps: &Fix, sense: &Environment, status: &HostStatus) -> Self {
        Self {
            time: gps.time.clone(),
            lat: gps.lat,
            lon: gps.lon,
            alt: gps.alt,
            speed: gps.speed,
            climb: gps.climb,
            track: gps.track,
            pressure: sense.pressure,
            humidity: sense.humidity,
            temp: sense.temperature,
            pitch: sense.orientation.pitch,
            roll: sense.orientation.roll,
            yaw: sense.orientation.yaw,
            acc_x: sense.acc.x,
            acc_y: sense.acc.y,
            acc_z: sense.acc.z,
            voltage: status.voltage.clone(),
            cpu_temp: status.cpu_temp.clone(),
        }
    }
}
