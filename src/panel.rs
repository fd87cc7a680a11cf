//! Monitor panel session.
//!
//! Three collection loops push readings onto one queue while the session is collecting.
//! [`PanelSession::tick`] drains that queue on the UI thread: it refreshes the per-kind
//! labels and, when a CSV file is open and the session is not paused, folds each reading
//! into the latest-value cache and writes a combined row once every kind has reported.

use std::{
    collections::VecDeque,
    fmt::Write as _,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{sleep, Builder, JoinHandle},
    time::{Duration, Instant},
};

use chrono::Local;
use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::{
    cancel::{retry_until_ok, CancelToken},
    data_saver::{timestamped_name, CsvFile, DataFile},
    display::MessageDisplay,
    reading::{Environment, Fix, HostStatus, PanelRecord, Reading, SensorKind},
    workers::Reader,
    Error, Result,
};

pub const HISTORY_MAX: usize = 1000;
pub const HISTORY_TRIM: usize = 100;
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the reader for one kind. Called on the collection thread, retried until it works.
pub type ReaderFactory = Arc<dyn Fn(SensorKind) -> Result<Box<dyn Reader>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Toggles between paused and running.
    Pause,
    Stop,
    SaveAs(PathBuf),
    AutoSave(bool),
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, arg) = match line.split_once(char::is_whitespace) {
            Some((w, a)) => (w, a.trim()),
            None => (line, ""),
        };
        Ok(match (word, arg) {
            ("start", "") => Command::Start,
            ("pause", "") => Command::Pause,
            ("stop", "") => Command::Stop,
            ("save", path) if !path.is_empty() => Command::SaveAs(PathBuf::from(path)),
            ("autosave", "on") => Command::AutoSave(true),
            ("autosave", "off") => Command::AutoSave(false),
            ("status", "") => Command::Status,
            ("quit", "") | ("exit", "") => Command::Quit,
            _ => {
                return Err(Error::Parse {
                    source_name: "panel command",
                    input: line.to_owned(),
                })
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct PanelOptions {
    pub interval: Duration,
    pub retry_delay: Duration,
    pub auto_save: bool,
    pub log_dir: PathBuf,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            auto_save: true,
            log_dir: PathBuf::from("."),
        }
    }
}

/// State shared with the collection loops.
#[derive(Debug, Default)]
struct Flags {
    paused: AtomicBool,
    connected: [AtomicBool; 3],
}

impl Flags {
    fn set_connected(&self, kind: SensorKind, up: bool) {
        self.connected[kind.index()].store(up, Ordering::SeqCst);
    }

    fn is_connected(&self, kind: SensorKind) -> bool {
        self.connected[kind.index()].load(Ordering::SeqCst)
    }
}

/// Most recent reading of each kind since collection started.
#[derive(Debug, Default)]
pub struct LatestCache {
    gps: Option<Fix>,
    sense: Option<Environment>,
    status: Option<HostStatus>,
}

impl LatestCache {
    pub fn update(&mut self, reading: Reading) {
        match reading {
            Reading::Gps(fix) => self.gps = Some(fix),
            Reading::Sense(env) => self.sense = Some(env),
            Reading::Status(status) => self.status = Some(status),
        }
    }

    pub fn combined(&self) -> Option<PanelRecord> {
        Some(PanelRecord::combine(
            self.gps.as_ref()?,
            self.sense.as_ref()?,
            self.status.as_ref()?,
        ))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

const GPS_LABELS: [&str; 7] = [
    "Time",
    "Latitude",
    "Longitude",
    "Altitude",
    "Speed",
    "Climb",
    "Track",
];
const SENSE_LABELS: [&str; 9] = [
    "Pressure",
    "Humidity",
    "Temperature",
    "Pitch",
    "Roll",
    "Yaw",
    "Accel X",
    "Accel Y",
    "Accel Z",
];
const SYSTEM_LABELS: [&str; 2] = ["Core Voltage", "CPU Temperature"];

/// Display text for every value, `--` until the first reading arrives.
#[derive(Debug, Clone)]
pub struct PanelView {
    values: [Vec<String>; 3],
}

impl Default for PanelView {
    fn default() -> Self {
        let blank = |n: usize| vec!["--".to_owned(); n];
        Self {
            values: [
                blank(GPS_LABELS.len()),
                blank(SENSE_LABELS.len()),
                blank(SYSTEM_LABELS.len()),
            ],
        }
    }
}

impl PanelView {
    pub fn update(&mut self, reading: &Reading) {
        let values: Vec<String> = match reading {
            Reading::Gps(f) => vec![
                f.time.clone(),
                f.lat.to_string(),
                f.lon.to_string(),
                f.alt.to_string(),
                f.speed.to_string(),
                f.climb.to_string(),
                f.track.to_string(),
            ],
            Reading::Sense(e) => [
                e.pressure,
                e.humidity,
                e.temperature,
                e.orientation.pitch,
                e.orientation.roll,
                e.orientation.yaw,
                e.acc.x,
                e.acc.y,
                e.acc.z,
            ]
            .iter()
            .map(|v| format!("{v:.2}"))
            .collect(),
            Reading::Status(s) => vec![s.voltage.clone(), s.cpu_temp.clone()],
        };
        self.values[reading.kind().index()] = values;
    }

    pub fn value(&self, kind: SensorKind, label: &str) -> Option<&str> {
        let labels: &[&str] = match kind {
            SensorKind::Gps => &GPS_LABELS,
            SensorKind::Sense => &SENSE_LABELS,
            SensorKind::Status => &SYSTEM_LABELS,
        };
        let i = labels.iter().position(|l| *l == label)?;
        self.values[kind.index()].get(i).map(String::as_str)
    }

    fn render(&self, out: &mut String) {
        let sections: [(&str, &[&str]); 3] = [
            ("GPS", &GPS_LABELS),
            ("Sense HAT", &SENSE_LABELS),
            ("System", &SYSTEM_LABELS),
        ];
        for (i, (title, labels)) in sections.iter().enumerate() {
            let _ = writeln!(out, "{title}:");
            for (label, value) in labels.iter().zip(&self.values[i]) {
                let _ = writeln!(out, "  {label:<16}{value}");
            }
        }
    }
}

fn connection_name(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Gps => "GPS",
        SensorKind::Sense => "Sense HAT",
        SensorKind::Status => "System",
    }
}

fn collection_loop(
    kind: SensorKind,
    open: ReaderFactory,
    flags: Arc<Flags>,
    tx: Sender<Reading>,
    opts: (Duration, Duration),
    cancel: CancelToken,
) {
    let (interval, retry_delay) = opts;
    let Ok(mut reader) = retry_until_ok(&kind.to_string(), retry_delay, &cancel, || open(kind))
    else {
        return;
    };
    while !cancel.is_cancelled() {
        if !flags.paused.load(Ordering::SeqCst) {
            match reader.read(&cancel) {
                Ok(reading) => {
                    flags.set_connected(kind, true);
                    if tx.send(reading).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    flags.set_connected(kind, false);
                    tracing::warn!(%kind, "collection error: {e}");
                }
            }
        }
        if cancel.sleep(interval).is_err() {
            break;
        }
    }
    if let Err(e) = reader.close() {
        tracing::warn!(%kind, "closing reader: {e}");
    }
    tracing::debug!(%kind, "collection loop stopped");
}

pub struct PanelSession {
    open: ReaderFactory,
    opts: PanelOptions,
    display: Box<dyn MessageDisplay>,
    flags: Arc<Flags>,
    collecting: bool,
    cancel: Option<CancelToken>,
    loops: Vec<JoinHandle<()>>,
    tx: Sender<Reading>,
    rx: Receiver<Reading>,
    csv: CsvFile<PanelRecord>,
    latest: LatestCache,
    view: PanelView,
    history: VecDeque<String>,
}

impl PanelSession {
    pub fn new(open: ReaderFactory, display: Box<dyn MessageDisplay>, opts: PanelOptions) -> Self {
        let (tx, rx) = unbounded();
        Self {
            open,
            opts,
            display,
            flags: Arc::default(),
            collecting: false,
            cancel: None,
            loops: vec![],
            tx,
            rx,
            csv: CsvFile::new(),
            latest: LatestCache::default(),
            view: PanelView::default(),
            history: VecDeque::new(),
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self, kind: SensorKind) -> bool {
        self.flags.is_connected(kind)
    }

    pub fn auto_save(&self) -> bool {
        self.opts.auto_save
    }

    pub fn set_auto_save(&mut self, on: bool) {
        self.opts.auto_save = on;
    }

    pub fn file(&self) -> Option<&Path> {
        self.csv.path()
    }

    pub fn view(&self) -> &PanelView {
        &self.view
    }

    pub fn history(&self) -> &VecDeque<String> {
        &self.history
    }

    fn show(&mut self, text: &str) {
        if let Err(e) = self.display.show_message(text) {
            tracing::warn!("display: {e}");
        }
    }

    /// Opens `path` as the CSV target, closing any file already open. On failure the
    /// session is left with no file.
    pub fn open_log_file(&mut self, path: &Path) -> Result<()> {
        match self.csv.start_new(path) {
            Ok(()) => {
                tracing::info!("Logging to: {}", path.display());
                Ok(())
            }
            Err(e) => {
                let _ = self.csv.end();
                Err(e)
            }
        }
    }

    pub fn start_collection(&mut self) -> Result<()> {
        if self.collecting {
            return Ok(());
        }
        if self.opts.auto_save && !self.csv.is_started() {
            let name = timestamped_name(Local::now().naive_local(), "csv");
            let path = self.opts.log_dir.join(name);
            if let Err(e) = self.open_log_file(&path) {
                tracing::error!("failed to open log file: {e}");
            }
        }
        if !self.csv.is_started() {
            tracing::warn!("no log file is open, data will be displayed but not saved");
        }

        let cancel = CancelToken::new();
        self.flags.paused.store(false, Ordering::SeqCst);
        for kind in SensorKind::ORDER {
            let open = self.open.clone();
            let flags = self.flags.clone();
            let tx = self.tx.clone();
            let opts = (self.opts.interval, self.opts.retry_delay);
            let token = cancel.clone();
            let handle = Builder::new()
                .name(format!("{kind}-loop"))
                .spawn(move || collection_loop(kind, open, flags, tx, opts, token))?;
            self.loops.push(handle);
        }
        self.cancel = Some(cancel);
        self.collecting = true;
        tracing::info!("collection started");
        self.show("Started");
        Ok(())
    }

    /// Stops the loops, waiting up to [`JOIN_TIMEOUT`] for each, and closes the file.
    pub fn stop_collection(&mut self) {
        if !self.collecting {
            return;
        }
        self.collecting = false;
        self.flags.paused.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        for handle in self.loops.drain(..) {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                sleep(Duration::from_millis(10));
            }
            if !handle.is_finished() {
                tracing::warn!(
                    thread = handle.thread().name().unwrap_or("?"),
                    "collection loop still busy, leaving it behind"
                );
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("collection loop panicked");
            }
        }
        if let Err(e) = self.csv.end() {
            tracing::error!("closing log file: {e}");
        }
        self.latest.clear();
        self.flags.set_connected(SensorKind::Gps, false);
        self.flags.set_connected(SensorKind::Status, false);
        tracing::info!("collection stopped");
        self.show("Stopped");
    }

    pub fn toggle_pause(&mut self) {
        if !self.collecting {
            return;
        }
        let paused = !self.flags.paused.fetch_xor(true, Ordering::SeqCst);
        if paused {
            tracing::info!("paused");
            self.show("Paused");
        } else {
            tracing::info!("resumed");
            self.show("Resumed");
        }
    }

    /// Drains queued readings. Returns how many rows were written.
    pub fn tick(&mut self) -> usize {
        let mut written = 0;
        while let Ok(reading) = self.rx.try_recv() {
            self.view.update(&reading);
            if !self.csv.is_started() || self.is_paused() {
                continue;
            }
            self.latest.update(reading);
            let Some(record) = self.latest.combined() else {
                continue;
            };
            match self.csv.record(&record) {
                Ok(()) => {
                    written += 1;
                    self.push_history(&record);
                }
                Err(e) => {
                    tracing::error!("writing log file: {e}");
                    let _ = self.csv.end();
                }
            }
        }
        written
    }

    fn push_history(&mut self, r: &PanelRecord) {
        self.history.push_back(format!(
            "[{}] GPS: {}, {} | Temp: {}°C | Alt: {}m",
            Local::now().format("%H:%M:%S"),
            r.lat,
            r.lon,
            r.temp,
            r.alt
        ));
        if self.history.len() > HISTORY_MAX {
            self.history.drain(..HISTORY_TRIM);
        }
    }

    /// Applies one command. Returns `false` once the panel should exit.
    pub fn handle(&mut self, cmd: Command) -> Result<bool> {
        match cmd {
            Command::Start => self.start_collection()?,
            Command::Pause => self.toggle_pause(),
            Command::Stop => self.stop_collection(),
            Command::SaveAs(path) => {
                if let Err(e) = self.open_log_file(&path) {
                    tracing::error!("failed to open log file: {e}");
                }
            }
            Command::AutoSave(on) => {
                self.set_auto_save(on);
                tracing::info!(auto_save = on);
            }
            Command::Status => println!("{}", self.render()),
            Command::Quit => {
                self.stop_collection();
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let state = match (self.collecting, self.is_paused()) {
            (false, _) => "stopped",
            (true, true) => "paused",
            (true, false) => "collecting",
        };
        let _ = writeln!(out, "State: {state}");
        match self.file() {
            Some(p) => {
                let _ = writeln!(out, "File: {}", p.display());
            }
            None => out.push_str("File: none\n"),
        }
        for kind in SensorKind::ORDER {
            let up = if self.is_connected(kind) {
                "Connected"
            } else {
                "Disconnected"
            };
            let _ = writeln!(out, "{}: {up}", connection_name(kind));
        }
        self.view.render(&mut out);
        for line in self.history.iter().rev().take(5).rev() {
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

impl Drop for PanelSession {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::reading::fixtures;

    struct Silent;

    impl MessageDisplay for Silent {
        fn show_message(&mut self, _: &str) -> Result<()> {
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn session(dir: &Path) -> PanelSession {
        let open: ReaderFactory = Arc::new(|_: SensorKind| -> Result<Box<dyn Reader>> {
            Err(Error::DeviceNotFound("sensor"))
        });
        PanelSession::new(
            open,
            Box::new(Silent),
            PanelOptions {
                log_dir: dir.to_owned(),
                retry_delay: Duration::from_millis(10),
                ..PanelOptions::default()
            },
        )
    }

    #[test]
    fn parses_commands() {
        assert_eq!("start".parse::<Command>().unwrap(), Command::Start);
        assert_eq!(" pause\n".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!(
            "save /tmp/run 1.csv".parse::<Command>().unwrap(),
            Command::SaveAs(PathBuf::from("/tmp/run 1.csv"))
        );
        assert_eq!(
            "autosave off".parse::<Command>().unwrap(),
            Command::AutoSave(false)
        );
        assert!("save".parse::<Command>().is_err());
        assert!("autosave maybe".parse::<Command>().is_err());
        assert!("launch".parse::<Command>().is_err());
    }

    #[test]
    fn one_row_once_all_kinds_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let path = dir.path().join("run.csv");
        s.open_log_file(&path).unwrap();

        s.tx.send(Reading::Gps(fixtures::fix())).unwrap();
        s.tx.send(Reading::Sense(fixtures::environment())).unwrap();
        assert_eq!(s.tick(), 0);
        s.tx.send(Reading::Status(fixtures::host_status())).unwrap();
        assert_eq!(s.tick(), 1);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields.len(), 18);
        assert_eq!(fields[0], "2024-05-01T10:00:00.000Z");
        assert_eq!(fields[1], "47.3769");
        assert_eq!(fields[2], "8.5417");
        assert_eq!(fields[16], "0.8500V");
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn every_reading_after_the_first_full_set_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.open_log_file(&dir.path().join("run.csv")).unwrap();
        s.latest.update(Reading::Gps(fixtures::fix()));
        s.latest.update(Reading::Sense(fixtures::environment()));
        s.tx.send(Reading::Status(fixtures::host_status())).unwrap();
        s.tx.send(Reading::Gps(fixtures::fix())).unwrap();
        assert_eq!(s.tick(), 2);
    }

    #[test]
    fn no_file_means_display_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.tx.send(Reading::Gps(fixtures::fix())).unwrap();
        s.tx.send(Reading::Sense(fixtures::environment())).unwrap();
        s.tx.send(Reading::Status(fixtures::host_status())).unwrap();
        assert_eq!(s.tick(), 0);
        assert_eq!(
            s.view().value(SensorKind::Status, "Core Voltage"),
            Some("0.8500V")
        );
        assert_eq!(s.view().value(SensorKind::Sense, "Pressure"), Some("1013.25"));
        assert!(s.latest.combined().is_none());
    }

    #[test]
    fn paused_readings_update_view_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.open_log_file(&dir.path().join("run.csv")).unwrap();
        s.flags.paused.store(true, Ordering::SeqCst);
        s.tx.send(Reading::Gps(fixtures::fix())).unwrap();
        s.tx.send(Reading::Sense(fixtures::environment())).unwrap();
        s.tx.send(Reading::Status(fixtures::host_status())).unwrap();
        assert_eq!(s.tick(), 0);
        assert_eq!(s.view().value(SensorKind::Gps, "Track"), Some("271.3"));
    }

    #[test]
    fn unwritable_path_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.open_log_file(&dir.path().join("first.csv")).unwrap();
        assert!(s
            .open_log_file(&dir.path().join("missing/dir/x.csv"))
            .is_err());
        assert!(s.file().is_none());
    }

    #[test]
    fn history_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let record = PanelRecord::combine(
            &fixtures::fix(),
            &fixtures::environment(),
            &fixtures::host_status(),
        );
        for _ in 0..=HISTORY_MAX {
            s.push_history(&record);
        }
        assert_eq!(s.history().len(), HISTORY_MAX + 1 - HISTORY_TRIM);
    }

    #[test]
    fn start_and_stop_with_unavailable_sensors() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.start_collection().unwrap();
        assert!(s.is_collecting());
        let file = s.file().unwrap().to_owned();
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("logger_") && name.ends_with(".csv"), "{name}");

        s.toggle_pause();
        assert!(s.is_paused());
        s.toggle_pause();
        assert!(!s.is_paused());

        let started = Instant::now();
        s.stop_collection();
        assert!(started.elapsed() < JOIN_TIMEOUT);
        assert!(!s.is_collecting());
        assert!(s.file().is_none());
        assert!(!s.is_connected(SensorKind::Gps));
        assert_eq!(fs::read_to_string(file).unwrap().lines().count(), 1);
    }

    #[test]
    fn quit_stops_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.set_auto_save(false);
        assert!(s.handle(Command::Start).unwrap());
        assert!(s.file().is_none());
        assert!(!s.handle(Command::Quit).unwrap());
        assert!(!s.is_collecting());
    }

    /// Blocks in a call that never looks at the cancel token.
    struct Stuck;

    impl Reader for Stuck {
        fn kind(&self) -> SensorKind {
            SensorKind::Gps
        }

        fn read(&mut self, _: &CancelToken) -> Result<Reading> {
            sleep(JOIN_TIMEOUT * 3);
            Ok(Reading::Gps(fixtures::fix()))
        }
    }

    #[test]
    fn stuck_loop_is_left_behind_after_join_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let open: ReaderFactory = Arc::new(|kind: SensorKind| -> Result<Box<dyn Reader>> {
            match kind {
                SensorKind::Gps => Ok(Box::new(Stuck)),
                _ => Err(Error::DeviceNotFound("sensor")),
            }
        });
        let mut s = PanelSession::new(
            open,
            Box::new(Silent),
            PanelOptions {
                log_dir: dir.path().to_owned(),
                retry_delay: Duration::from_millis(10),
                ..PanelOptions::default()
            },
        );
        s.start_collection().unwrap();
        assert!(s.file().is_some());
        sleep(Duration::from_millis(100));

        let started = Instant::now();
        s.stop_collection();
        let took = started.elapsed();
        assert!(took >= JOIN_TIMEOUT, "{took:?}");
        assert!(took < JOIN_TIMEOUT * 2, "{took:?}");
        assert!(!s.is_collecting());
        assert!(s.file().is_none());
    }
}
