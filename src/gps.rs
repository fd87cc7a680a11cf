//! gpsd client: enable JSON watch mode on port 2947, fold TPV reports into a running
//! state and hand out a fix once every field is present.

use std::{
    io::{ErrorKind, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use serde_json::{Map, Value};

use crate::{
    cancel::CancelToken,
    reading::{Fix, Reading, SensorKind},
    workers::Reader,
    Error, Result,
};

pub const DEFAULT_ADDR: &str = "127.0.0.1:2947";
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const WATCH_ENABLE: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";
const WATCH_DISABLE: &[u8] = b"?WATCH={\"enable\":false}\n";

const TPV_KEYS: [&str; 7] = ["time", "lon", "lat", "alt", "speed", "climb", "track"];
const SENTINEL: &str = "n/a";

pub struct GpsdSocket<S> {
    stream: S,
    pending: Vec<u8>,
}

impl GpsdSocket<TcpStream> {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        Self::watch(stream)
    }
}

impl<S: Read + Write> GpsdSocket<S> {
    pub fn watch(mut stream: S) -> Result<Self> {
        stream.write_all(WATCH_ENABLE)?;
        stream.flush()?;
        Ok(Self {
            stream,
            pending: Vec::new(),
        })
    }

    /// Next complete report line, or `None` when nothing arrived within the read timeout.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(Some(String::from_utf8_lossy(&line).trim().to_owned()));
            }
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(Error::GpsdClosed),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Turns the watch off. The connection closes when the socket is dropped.
    pub fn unwatch(&mut self) -> Result<()> {
        self.stream.write_all(WATCH_DISABLE)?;
        self.stream.flush()?;
        Ok(())
    }
}

/// TPV keys of the latest report. Every TPV replaces the whole state, so a key the
/// report leaves out reads as absent.
#[derive(Debug, Default)]
pub struct DataStream {
    tpv: Map<String, Value>,
}

impl DataStream {
    pub fn unpack(&mut self, line: &str) -> Result<()> {
        let report: Value = serde_json::from_str(line)?;
        let Value::Object(report) = report else {
            return Ok(());
        };
        if report.get("class").and_then(Value::as_str) != Some("TPV") {
            return Ok(());
        }
        self.tpv.clear();
        for key in TPV_KEYS {
            if let Some(v) = report.get(key) {
                self.tpv.insert(key.to_owned(), v.clone());
            }
        }
        // gpsd >= 3.20 dropped `alt` in favour of altMSL/altHAE
        if !report.contains_key("alt") {
            if let Some(v) = report.get("altMSL").or_else(|| report.get("altHAE")) {
                self.tpv.insert("alt".to_owned(), v.clone());
            }
        }
        Ok(())
    }

    /// `Some` only when all seven fields are present and none is null or `"n/a"`.
    pub fn fix(&self) -> Option<Fix> {
        let time = match self.field("time")? {
            Value::String(s) => s.clone(),
            _ => return None,
        };
        let num = |key: &str| self.field(key).and_then(Value::as_f64);
        Some(Fix {
            time,
            lon: num("lon")?,
            lat: num("lat")?,
            alt: num("alt")?,
            speed: num("speed")?,
            climb: num("climb")?,
            track: num("track")?,
        })
    }

    fn field(&self, key: &str) -> Option<&Value> {
        match self.tpv.get(key)? {
            Value::Null => None,
            Value::String(s) if s == SENTINEL => None,
            v => Some(v),
        }
    }
}

pub struct GpsReader<S = TcpStream> {
    socket: GpsdSocket<S>,
    stream: DataStream,
}

impl<S: Read + Write> GpsReader<S> {
    pub fn new(socket: GpsdSocket<S>) -> Self {
        Self {
            socket,
            stream: DataStream::default(),
        }
    }

    /// Blocks until a complete fix is available. There is no upper bound on the wait.
    pub fn get_gps(&mut self, cancel: &CancelToken) -> Result<Fix> {
        loop {
            cancel.check()?;
            let Some(line) = self.socket.next_line()? else {
                continue;
            };
            if let Err(e) = self.stream.unpack(&line) {
                tracing::warn!("skipping gpsd report: {e}");
            }
            match self.stream.fix() {
                Some(fix) => return Ok(fix),
                None => tracing::trace!("no fix yet"),
            }
        }
    }
}

impl GpsReader<TcpStream> {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Ok(Self::new(GpsdSocket::connect(addr)?))
    }
}

impl<S: Read + Write + Send> Reader for GpsReader<S> {
    fn kind(&self) -> SensorKind {
        SensorKind::Gps
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        self.get_gps(cancel).map(Reading::Gps)
    }

    fn close(&mut self) -> Result<()> {
        self.socket.unwatch()
    }
}
