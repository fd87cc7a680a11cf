use std::{
    fmt,
    thread::{Builder, JoinHandle},
};

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::{
    cancel::CancelToken,
    reading::{Reading, SensorKind, ROW_FIELDS},
    Result,
};

/// A blocking source of one sensor's data for one iteration.
pub trait Reader: Send {
    fn kind(&self) -> SensorKind;

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading>;

    /// Releases the underlying device. Called once when the owning worker exits.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn kind(&self) -> SensorKind {
        (**self).kind()
    }

    fn read(&mut self, cancel: &CancelToken) -> Result<Reading> {
        (**self).read(cancel)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Filled(Reading),
    /// `Error: <message>`
    Failed(String),
}

impl Slot {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Slot::Filled(r) => Some(r),
            Slot::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Slot::Failed(_))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Filled(r) => write!(f, "{}", r.fields().join(",")),
            Slot::Failed(msg) => f.write_str(msg),
        }
    }
}

/// Runs `reader` once. An error never escapes: it becomes a failed slot.
pub fn host<R: Reader + ?Sized>(reader: &mut R, cancel: &CancelToken) -> Slot {
    match reader.read(cancel) {
        Ok(reading) => Slot::Filled(reading),
        Err(e) => {
            tracing::warn!(kind = %reader.kind(), "reader failed: {e}");
            Slot::Failed(format!("Error: {e}"))
        }
    }
}

/// What to write when a reader failed during an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Drop the whole row.
    #[default]
    Skip,
    /// Write the `Error: ...` text in place of that reader's fields.
    Splice,
}

/// Results of one iteration, indexed by reader position.
#[derive(Debug, Clone, PartialEq)]
pub struct Slots(Vec<Option<Slot>>);

impl Slots {
    pub fn with_len(len: usize) -> Self {
        Self(vec![None; len])
    }

    pub fn put(&mut self, index: usize, slot: Slot) {
        self.0[index] = Some(slot);
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.0.get(index).and_then(Option::as_ref)
    }

    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|s| match s {
            Some(Slot::Failed(msg)) => Some(msg.as_str()),
            _ => None,
        })
    }

    /// Concatenates the slots into row fields, or `None` if the row must not be written.
    pub fn assemble(&self, policy: FailurePolicy) -> Option<Vec<String>> {
        let mut fields = Vec::with_capacity(ROW_FIELDS);
        for slot in &self.0 {
            match slot {
                Some(Slot::Filled(reading)) => fields.extend(reading.fields()),
                Some(Slot::Failed(msg)) if policy == FailurePolicy::Splice => {
                    fields.push(msg.clone())
                }
                _ => return None,
            }
        }
        Some(fields)
    }
}

struct Worker {
    kind: SensorKind,
    request_tx: Sender<()>,
    slot_rx: Receiver<Slot>,
    handle: JoinHandle<()>,
}

/// One long-lived thread per reader. [`collect`](ReaderPool::collect) fans a request out to
/// every worker and returns once all of them have answered.
pub struct ReaderPool {
    workers: Vec<Worker>,
}

impl ReaderPool {
    /// Readers are expected in row order; reader `i` fills slot `i`.
    pub fn spawn(readers: Vec<Box<dyn Reader>>, cancel: &CancelToken) -> Result<Self> {
        let mut workers = Vec::with_capacity(readers.len());
        for mut reader in readers {
            let kind = reader.kind();
            let (request_tx, request_rx) = bounded::<()>(1);
            let (slot_tx, slot_rx) = bounded(1);
            let cancel = cancel.clone();
            let handle = Builder::new()
                .name(format!("{kind}-reader"))
                .spawn(move || {
                    while request_rx.recv().is_ok() {
                        let slot = host(reader.as_mut(), &cancel);
                        if slot_tx.send(slot).is_err() {
                            break;
                        }
                    }
                    if let Err(e) = reader.close() {
                        tracing::warn!(%kind, "closing reader: {e}");
                    }
                })?;
            workers.push(Worker {
                kind,
                request_tx,
                slot_rx,
                handle,
            });
        }
        Ok(Self { workers })
    }

    pub fn collect(&self) -> Slots {
        for w in &self.workers {
            // a dead worker shows up as a recv error below
            let _ = w.request_tx.send(());
        }
        let mut slots = Slots::with_len(self.workers.len());
        for (i, w) in self.workers.iter().enumerate() {
            let slot = w
                .slot_rx
                .recv()
                .unwrap_or_else(|_| Slot::Failed(format!("Error: {} worker stopped", w.kind)));
            slots.put(i, slot);
        }
        slots
    }

    /// Stops every worker after its current read and waits for it to close its device.
    pub fn shutdown(self) {
        for w in self.workers {
            drop(w.request_tx);
            if w.handle.join().is_err() {
                tracing::error!(kind = %w.kind, "reader worker panicked");
            }
        }
    }
}
