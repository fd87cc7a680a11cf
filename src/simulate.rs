//! Synthetic sensors for running without the board attached. Values drift slowly along
//! cosine curves of wall-clock time.

use std::time::{Duration, Instant, SystemTime};

use chrono::{SecondsFormat, Utc};
use nalgebra::Vector3;

use crate::{
    cancel::CancelToken,
    reading::{Environment, Fix, HostStatus, Reading, SensorKind},
    sense::orientation,
    workers::Reader,
    Result,
};

fn wave(period_secs: f64) -> f64 {
    let t = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (t * std::f64::consts::TAU / period_secs).cos()
}

/// A 1 Hz receiver circling over Zurich.
pub struct SimulatedGps {
    period: Duration,
    start: Instant,
}

impl SimulatedGps {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            start: Instant::now(),
        }
    }
}

impl Reader for SimulatedGps {
    fn kind(&self) -> SensorKind {
        SensorKind::Gps
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        cancel.sleep(self.period)?;
        let t = self.start.elapsed().as_secs_f64();
        let (s, c) = (t / 120.0).sin_cos();
        Ok(Reading::Gps(Fix {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            lon: 8.5417 + 0.01 * c,
            lat: 47.3769 + 0.01 * s,
            alt: 400.0 + 50.0 * wave(300.0),
            speed: 12.0 + wave(30.0),
            climb: 0.5 * wave(60.0),
            track: (t / 120.0).to_degrees().rem_euclid(360.0),
        }))
    }
}

#[derive(Default)]
pub struct SimulatedSense;

impl Reader for SimulatedSense {
    fn kind(&self) -> SensorKind {
        SensorKind::Sense
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        cancel.check()?;
        let acc = Vector3::new(0.02 * wave(7.0), 0.02 * wave(11.0), 1.0);
        let mag = Vector3::new(0.2 * wave(240.0), 0.2 * wave(240.0 + 60.0), 0.4);
        Ok(Reading::Sense(Environment {
            pressure: 965.0 + 2.0 * wave(300.0),
            humidity: 45.0 + 5.0 * wave(600.0),
            temperature: 22.0 + wave(600.0),
            orientation: orientation(&acc, &mag),
            acc,
        }))
    }
}

#[derive(Default)]
pub struct SimulatedStatus;

impl Reader for SimulatedStatus {
    fn kind(&self) -> SensorKind {
        SensorKind::Status
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        cancel.check()?;
        Ok(Reading::Status(HostStatus {
            voltage: format!("{:.4}V", 0.85 + 0.01 * wave(90.0)),
            cpu_temp: format!("{:.1}'C", 48.0 + 3.0 * wave(120.0)),
        }))
    }
}

/// One simulated reader per kind, in row order.
pub fn readers(gps_period: Duration) -> Vec<Box<dyn Reader>> {
    vec![
        Box::new(SimulatedGps::new(gps_period)),
        Box::new(SimulatedSense),
        Box::new(SimulatedStatus),
    ]
}
