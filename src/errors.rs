use std::{io, process::ExitStatus};

use crossbeam::channel::{RecvError, SendError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("i2c bus: {0}")]
    I2c(embedded_hal::i2c::ErrorKind),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("device at {address:#04x} answered id {found:#04x}, expected {expected:#04x}")]
    WrongDevice { address: u8, expected: u8, found: u8 },
    #[error("no {0} device found")]
    DeviceNotFound(&'static str),
    #[error("`{command}` exited with {status}")]
    Command { command: String, status: ExitStatus },
    #[error("cannot parse `{input}` from {source_name}")]
    Parse {
        source_name: &'static str,
        input: String,
    },
    #[error("gpsd closed the connection")]
    GpsdClosed,
    #[error("cancelled")]
    Cancelled,
    #[error("channel send")]
    ChannelSend,
    #[error("channel recv")]
    ChannelRecv,
}

impl Error {
    pub fn i2c<E: embedded_hal::i2c::Error>(err: E) -> Self {
        Error::I2c(err.kind())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl<T> From<SendError<T>> for Error {
    fn from(_: SendError<T>) -> Self {
        Error::ChannelSend
    }
}

impl From<RecvError> for Error {
    fn from(_: RecvError) -> Self {
        Error::ChannelRecv
    }
}
