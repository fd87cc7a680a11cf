use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;

use crate::{
    cancel::{retry_until_ok, CancelToken},
    gps::{self, GpsReader},
    pistatus::{self, StatusReader},
    reading::SensorKind,
    sense::{self, SenseHat, SenseReader},
    simulate,
    workers::{FailurePolicy, Reader},
    Result,
};

/// `RUST_LOG` filtering, `info` when unset.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Debug, Clone, Args)]
pub struct SensorArgs {
    /// gpsd address
    #[arg(long, default_value = gps::DEFAULT_ADDR)]
    pub gpsd: String,

    /// I2C bus the Sense HAT sits on
    #[arg(long, default_value = sense::DEFAULT_BUS)]
    pub i2c_bus: PathBuf,

    /// vcgencmd executable
    #[arg(long, default_value = pistatus::DEFAULT_VCGENCMD)]
    pub vcgencmd: String,

    /// Directory the log files are created in
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    /// Use synthetic sensors instead of the hardware
    #[arg(long)]
    pub simulate: bool,

    /// Delay between attempts to open a device at startup
    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,
}

impl SensorArgs {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Opens one reader, single attempt.
    pub fn open_reader(&self, kind: SensorKind) -> Result<Box<dyn Reader>> {
        if self.simulate {
            let mut all = simulate::readers(Duration::from_secs(1));
            return Ok(all.swap_remove(kind.index()));
        }
        Ok(match kind {
            SensorKind::Gps => Box::new(GpsReader::connect(self.gpsd.as_str())?),
            SensorKind::Sense => Box::new(SenseReader::new(SenseHat::open(&self.i2c_bus)?)),
            SensorKind::Status => Box::new(StatusReader::new(self.vcgencmd.clone())),
        })
    }

    /// All three readers in row order. A device that fails to open is retried until it
    /// comes up or `cancel` fires.
    pub fn open_readers(&self, cancel: &CancelToken) -> Result<Vec<Box<dyn Reader>>> {
        SensorKind::ORDER
            .iter()
            .map(|&kind| {
                retry_until_ok(&kind.to_string(), self.retry_delay(), cancel, || {
                    self.open_reader(kind)
                })
            })
            .collect()
    }
}

/// Console logger: Sense HAT joystick starts, pauses and resumes a run.
#[derive(Debug, Parser)]
#[command(version)]
pub struct LoggerArgs {
    #[command(flatten)]
    pub sensors: SensorArgs,

    /// What to write when a reader fails during an iteration
    #[arg(long, value_enum, default_value_t = FailurePolicy::Skip)]
    pub on_failure: FailurePolicy,

    /// Milliseconds per column when scrolling messages on the LED matrix
    #[arg(long, default_value_t = 50)]
    pub scroll_speed_ms: u64,

    /// LED matrix framebuffer, found by name when omitted
    #[arg(long)]
    pub framebuffer: Option<PathBuf>,

    /// Joystick input device, found by name when omitted
    #[arg(long)]
    pub joystick: Option<PathBuf>,

    /// Read start/pause/resume from stdin instead of the joystick
    #[arg(long)]
    pub stdin_controls: bool,
}

/// Monitor panel: live readings and CSV recording driven by commands on stdin.
#[derive(Debug, Parser)]
#[command(version)]
pub struct PanelArgs {
    #[command(flatten)]
    pub sensors: SensorArgs,

    /// Pause between readings of each collection loop
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,

    /// UI refresh period
    #[arg(long, default_value_t = 100)]
    pub tick_ms: u64,

    /// Do not open a CSV file automatically on start
    #[arg(long)]
    pub no_auto_save: bool,

    /// Milliseconds per column when scrolling messages on the LED matrix
    #[arg(long, default_value_t = 50)]
    pub scroll_speed_ms: u64,

    /// LED matrix framebuffer, found by name when omitted
    #[arg(long)]
    pub framebuffer: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definitions_are_valid() {
        LoggerArgs::command().debug_assert();
        PanelArgs::command().debug_assert();
    }

    #[test]
    fn defaults_need_no_arguments() {
        let args = LoggerArgs::parse_from(["airborne-logger"]);
        assert_eq!(args.sensors.gpsd, "127.0.0.1:2947");
        assert_eq!(args.sensors.i2c_bus, PathBuf::from("/dev/i2c-1"));
        assert_eq!(args.on_failure, FailurePolicy::Skip);
        assert!(!args.sensors.simulate);

        let args = PanelArgs::parse_from(["monitor-panel"]);
        assert_eq!(args.interval_ms, 500);
        assert_eq!(args.tick_ms, 100);
        assert!(!args.no_auto_save);
    }

    #[test]
    fn splice_policy_flag() {
        let args =
            LoggerArgs::parse_from(["airborne-logger", "--on-failure", "splice", "--simulate"]);
        assert_eq!(args.on_failure, FailurePolicy::Splice);
        assert!(args.sensors.simulate);
    }

    #[test]
    fn simulated_readers_in_row_order() {
        let args = LoggerArgs::parse_from(["airborne-logger", "--simulate"]);
        let readers = args.sensors.open_readers(&CancelToken::new()).unwrap();
        let kinds: Vec<_> = readers.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, SensorKind::ORDER);
    }
}
