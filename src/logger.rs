//! Console logging loop: one row per pass while running, joystick driven.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::{
    cancel::CancelToken,
    data_saver::{DataFile, LogFile},
    display::MessageDisplay,
    joystick::{Action, Direction, Joystick},
    workers::{FailurePolicy, ReaderPool},
    Result,
};

const PAUSED_POLL: Duration = Duration::from_millis(50);
const WELCOME_EVERY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    WaitingForStart,
    Running,
    Paused,
}

pub struct Logger {
    pool: ReaderPool,
    log_dir: PathBuf,
    log: LogFile,
    display: Box<dyn MessageDisplay>,
    joystick: Joystick,
    policy: FailurePolicy,
    cancel: CancelToken,
    state: State,
    rows: u64,
}

impl Logger {
    pub fn new(
        pool: ReaderPool,
        log_dir: impl Into<PathBuf>,
        display: Box<dyn MessageDisplay>,
        joystick: Joystick,
        policy: FailurePolicy,
        cancel: CancelToken,
    ) -> Self {
        Self {
            pool,
            log_dir: log_dir.into(),
            log: LogFile::new(),
            display,
            joystick,
            policy,
            cancel,
            state: State::WaitingForStart,
            rows: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The log of this run, created when the middle button starts it.
    pub fn log_path(&self) -> Option<&Path> {
        self.log.path()
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn show(&mut self, text: &str) {
        if let Err(e) = self.display.show_message(text) {
            tracing::warn!("display: {e}");
        }
    }

    fn pressed(&self) -> Vec<Direction> {
        self.joystick
            .get_events()
            .into_iter()
            .filter(|e| e.action == Action::Pressed)
            .map(|e| e.direction)
            .collect()
    }

    /// Shows "Welcome" until the middle button is pressed, then opens the log.
    pub fn wait_for_start(&mut self) -> Result<()> {
        loop {
            self.show("Welcome");
            let shown = Instant::now();
            while shown.elapsed() < WELCOME_EVERY {
                if self.pressed().contains(&Direction::Middle) {
                    self.log = LogFile::create_now(&self.log_dir)?;
                    self.show("Start");
                    tracing::info!("logging started");
                    self.state = State::Running;
                    return Ok(());
                }
                self.cancel.sleep(PAUSED_POLL)?;
            }
        }
    }

    /// Applies queued joystick presses: up pauses, down resumes.
    pub fn poll_controls(&mut self) {
        for direction in self.pressed() {
            match (direction, self.state) {
                (Direction::Up, State::Running) => {
                    self.show("Pause");
                    tracing::info!("paused");
                    self.state = State::Paused;
                }
                (Direction::Down, State::Paused) => {
                    self.show("Resume");
                    tracing::info!("resumed");
                    self.state = State::Running;
                }
                _ => {}
            }
        }
    }

    /// One pass: read every sensor and append the row. Returns whether a row was written.
    pub fn step(&mut self) -> Result<bool> {
        if self.state != State::Running {
            return Ok(false);
        }
        let slots = self.pool.collect();
        // readers interrupted by Ctrl-C come back as failures
        self.cancel.check()?;
        let written = match slots.assemble(self.policy) {
            Some(row) => {
                self.log.record(&row)?;
                self.rows += 1;
                true
            }
            None => {
                let failures: Vec<&str> = slots.failures().collect();
                tracing::warn!(?failures, "row skipped");
                false
            }
        };
        if let Err(e) = self.display.clear() {
            tracing::warn!("display: {e}");
        }
        Ok(written)
    }

    /// Runs until the cancel token fires.
    pub fn run(&mut self) -> Result<()> {
        match self.run_loop() {
            Err(e) if e.is_cancelled() => Ok(()),
            other => other,
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        self.wait_for_start()?;
        loop {
            self.cancel.check()?;
            self.poll_controls();
            if self.state == State::Paused {
                self.cancel.sleep(PAUSED_POLL)?;
                continue;
            }
            self.step()?;
        }
    }

    /// Stops the readers and closes the log.
    pub fn finish(mut self) -> Result<()> {
        self.pool.shutdown();
        self.log.end()?;
        if let Err(e) = self.display.clear() {
            tracing::warn!("display: {e}");
        }
        tracing::info!(rows = self.rows, "logging stopped");
        Ok(())
    }
}
