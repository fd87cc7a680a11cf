use std::{process::Command, time::Duration};

use crate::{
    cancel::CancelToken,
    reading::{HostStatus, Reading, SensorKind},
    workers::Reader,
    Error, Result,
};

pub const DEFAULT_VCGENCMD: &str = "vcgencmd";

const EMPTY_OUTPUT_DELAY: Duration = Duration::from_millis(100);

pub trait CommandRunner: Send {
    /// Runs `command` through the shell and returns its trimmed stdout.
    fn run(&mut self, command: &str) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> Result<String> {
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        if !output.status.success() {
            return Err(Error::Command {
                command: command.to_owned(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

pub struct StatusReader<C = ShellRunner> {
    runner: C,
    vcgencmd: String,
}

impl StatusReader<ShellRunner> {
    pub fn new(vcgencmd: impl Into<String>) -> Self {
        Self::with_runner(ShellRunner, vcgencmd)
    }
}

impl<C: CommandRunner> StatusReader<C> {
    pub fn with_runner(runner: C, vcgencmd: impl Into<String>) -> Self {
        Self {
            runner,
            vcgencmd: vcgencmd.into(),
        }
    }

    pub fn get_pistatus(&mut self, cancel: &CancelToken) -> Result<HostStatus> {
        let voltage = self.call(&format!("{} measure_volts core", self.vcgencmd), cancel)?;
        let cpu_temp = self.call(&format!("{} measure_temp", self.vcgencmd), cancel)?;
        Ok(HostStatus {
            voltage: value_of(&voltage, "measure_volts")?,
            cpu_temp: value_of(&cpu_temp, "measure_temp")?,
        })
    }

    /// Repeats `command` until it prints something.
    fn call(&mut self, command: &str, cancel: &CancelToken) -> Result<String> {
        loop {
            cancel.check()?;
            let out = self.runner.run(command)?;
            if !out.is_empty() {
                return Ok(out);
            }
            tracing::trace!(command, "empty output, retrying");
            cancel.sleep(EMPTY_OUTPUT_DELAY)?;
        }
    }
}

/// `temp=45.2'C` -> `45.2'C`
fn value_of(line: &str, source_name: &'static str) -> Result<String> {
    line.split('=')
        .nth(1)
        .map(str::to_owned)
        .ok_or_else(|| Error::Parse {
            source_name,
            input: line.to_owned(),
        })
}

impl<C: CommandRunner> Reader for StatusReader<C> {
    fn kind(&self) -> SensorKind {
        SensorKind::Status
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        self.get_pistatus(cancel).map(Reading::Status)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct Canned {
        outputs: VecDeque<Result<String>>,
        calls: Vec<String>,
    }

    impl Canned {
        fn new(outputs: Vec<Result<&str>>) -> Self {
            Self {
                outputs: outputs.into_iter().map(|o| o.map(str::to_owned)).collect(),
                calls: vec![],
            }
        }
    }

    impl CommandRunner for Canned {
        fn run(&mut self, command: &str) -> Result<String> {
            self.calls.push(command.to_owned());
            self.outputs.pop_front().unwrap_or_else(|| Ok(String::new()))
        }
    }

    #[test]
    fn parses_voltage_and_temperature() {
        let mut r = StatusReader::with_runner(
            Canned::new(vec![Ok("volt=0.8500V"), Ok("temp=45.2'C")]),
            "vcgencmd",
        );
        let status = r.get_pistatus(&CancelToken::new()).unwrap();
        assert_eq!(status.voltage, "0.8500V");
        assert_eq!(status.cpu_temp, "45.2'C");
        assert_eq!(
            r.runner.calls,
            ["vcgencmd measure_volts core", "vcgencmd measure_temp"]
        );
    }

    #[test]
    fn retries_empty_output() {
        let mut r = StatusReader::with_runner(
            Canned::new(vec![Ok(""), Ok(""), Ok("volt=1.2V"), Ok("temp=50.0'C")]),
            "vcgencmd",
        );
        let status = r.get_pistatus(&CancelToken::new()).unwrap();
        assert_eq!(status.voltage, "1.2V");
        assert_eq!(r.runner.calls.len(), 4);
    }

    #[test]
    fn missing_delimiter_is_parse_error() {
        let mut r = StatusReader::with_runner(
            Canned::new(vec![Ok("VCHI initialization failed"), Ok("temp=50.0'C")]),
            "vcgencmd",
        );
        assert!(matches!(
            r.get_pistatus(&CancelToken::new()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn command_failure_propagates() {
        let mut r = StatusReader::with_runner(
            Canned::new(vec![Err(Error::DeviceNotFound("vcgencmd"))]),
            "vcgencmd",
        );
        assert!(r.get_pistatus(&CancelToken::new()).is_err());
    }

    #[test]
    fn shell_runner_reports_exit_status() {
        let mut sh = ShellRunner;
        assert_eq!(sh.run("echo temp=41.0\\'C").unwrap(), "temp=41.0'C");
        assert!(matches!(sh.run("exit 3"), Err(Error::Command { .. })));
    }

    #[test]
    fn value_stops_at_second_delimiter() {
        assert_eq!(value_of("a=b=c", "x").unwrap(), "b");
    }
}
