mod errors;
pub use errors::{Error, Result};

pub mod cancel;
pub mod config;
pub mod reading;
mod sysfs;

pub mod gps;
pub mod pistatus;
pub mod sense;
pub mod simulate;

pub mod workers;
pub use workers::{FailurePolicy, Reader, ReaderPool, Slot};

pub mod data_saver;
pub use data_saver::{CsvFile, DataFile, LogFile};

pub mod display;
pub mod joystick;

pub mod logger;
pub mod panel;
