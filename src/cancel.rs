//! Cooperative cancellation for the blocking sensor loops.
//!
//! Every retry loop in the readers polls a [`CancelToken`] at its poll boundary, so a stop
//! request or Ctrl-C unblocks a reader waiting on a fix that never arrives. A syscall that
//! is already in flight (one I2C transfer, one `vcgencmd` spawn) still runs to completion.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::sleep,
    time::{Duration, Instant},
};

use crate::{Error, Result};

const SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `dur`, waking early with `Err(Error::Cancelled)` if cancelled meanwhile.
    pub fn sleep(&self, dur: Duration) -> Result<()> {
        let deadline = Instant::now() + dur;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            sleep(SLICE.min(deadline - now));
        }
    }

    /// Cancels this token on SIGINT/SIGTERM.
    pub fn cancel_on_ctrlc(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("termination requested");
            token.cancel();
        })
        .map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

/// Retries `open` until it succeeds, waiting `delay` between attempts.
///
/// Device initialisation at startup blocks here indefinitely unless `cancel` fires.
pub fn retry_until_ok<T>(
    what: &str,
    delay: Duration,
    cancel: &CancelToken,
    mut open: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        cancel.check()?;
        attempt += 1;
        match open() {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(attempt, "{what} not ready: {e}");
                cancel.sleep(delay)?;
            }
        }
    }
}
