use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::{reading::LOG_HEADER, Result};

pub trait CsvRecord: Serialize {
    const HEADER: &'static [&'static str];
}

pub trait DataFile {
    type Data: ?Sized;
    fn is_started(&self) -> bool;
    fn start_new(&mut self, path: &Path) -> Result<()>;
    fn record(&mut self, data: &Self::Data) -> Result<()>;
    fn end(&mut self) -> Result<()>;
}

/// `logger_YYYY-MM-DD_HH-MM-SS.<ext>`
pub fn timestamped_name(now: NaiveDateTime, ext: &str) -> String {
    format!("{}.{ext}", now.format("logger_%Y-%m-%d_%H-%M-%S"))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(BufWriter::new(f))
}

/// Plain comma-terminated text log. Every field is followed by `,`, nothing is quoted.
#[derive(Default)]
pub struct LogFile {
    wtr: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl LogFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `logger_<now>.log` in `dir` with the header line.
    pub fn create_in(dir: &Path, now: NaiveDateTime) -> Result<Self> {
        let mut f = Self::new();
        f.start_new(&dir.join(timestamped_name(now, "log")))?;
        Ok(f)
    }

    pub fn create_now(dir: &Path) -> Result<Self> {
        Self::create_in(dir, Local::now().naive_local())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl DataFile for LogFile {
    type Data = [String];

    fn is_started(&self) -> bool {
        self.wtr.is_some()
    }

    fn start_new(&mut self, path: &Path) -> Result<()> {
        let mut wtr = create(path)?;
        writeln!(wtr, "{LOG_HEADER}")?;
        wtr.flush()?;
        tracing::info!("Start Logging at {}", path.display());
        self.wtr = Some(wtr);
        self.path = Some(path.to_owned());
        Ok(())
    }

    fn record(&mut self, fields: &[String]) -> Result<()> {
        if let Some(wtr) = self.wtr.as_mut() {
            for field in fields {
                write!(wtr, "{field},")?;
            }
            writeln!(wtr)?;
            wtr.flush()?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if let Some(mut wtr) = self.wtr.take() {
            wtr.flush()?;
        }
        self.path = None;
        Ok(())
    }
}

pub struct CsvFile<R> {
    csv_wtr: Option<csv::Writer<BufWriter<File>>>,
    path: Option<PathBuf>,
    _p: std::marker::PhantomData<R>,
}

impl<R> Default for CsvFile<R> {
    fn default() -> Self {
        Self {
            csv_wtr: None,
            path: None,
            _p: std::marker::PhantomData,
        }
    }
}

impl<R: CsvRecord> CsvFile<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<R: CsvRecord> DataFile for CsvFile<R> {
    type Data = R;

    fn is_started(&self) -> bool {
        self.csv_wtr.is_some()
    }

    /// Any file already open is closed first.
    fn start_new(&mut self, path: &Path) -> Result<()> {
        self.end()?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(create(path)?);
        wtr.write_record(R::HEADER)?;
        wtr.flush()?;
        self.csv_wtr = Some(wtr);
        self.path = Some(path.to_owned());
        Ok(())
    }

    fn record(&mut self, data: &R) -> Result<()> {
        if let Some(wtr) = self.csv_wtr.as_mut() {
            wtr.serialize(data)?;
            wtr.flush()?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.path = None;
        if let Some(mut wtr) = self.csv_wtr.take() {
            wtr.flush()?;
        }
        Ok(())
    }
}
