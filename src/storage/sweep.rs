//! Cancellable periodic task used for the storage expiry sweep.
//!
//! The task runs on its own thread, waking every `interval`. `trigger` runs the
//! body immediately and blocks until that run completes, which lets tests drive the
//! sweep deterministically. Dropping the handle stops and joins the thread.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

use crate::storage::SharedStorage;

enum Signal {
    RunNow(Sender<()>),
    Stop,
}

pub struct PeriodicTask {
    name: String,
    tx: Sender<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: &str, interval: Duration, mut body: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Signal>();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(Signal::RunNow(done)) => {
                        body();
                        let _ = done.send(());
                    }
                    Err(RecvTimeoutError::Timeout) => body(),
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self {
            name: name.to_string(),
            tx,
            handle: Some(handle),
        })
    }

    /// Run the body now and wait for it to finish. Returns false if the task has stopped.
    pub fn trigger(&self) -> bool {
        let (done_tx, done_rx) = mpsc::channel();
        if self.tx.send(Signal::RunNow(done_tx)).is_err() {
            return false;
        }
        done_rx.recv().is_ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(task = %self.name, "periodic task panicked");
            }
        }
    }
}

/// Start the expiry sweep for `storage` on the given interval.
pub fn spawn_expiry_sweep(storage: SharedStorage, interval: Duration) -> std::io::Result<PeriodicTask> {
    let backend = storage.backend_name();
    PeriodicTask::spawn("storage-sweep", interval, move || {
        match storage.purge_expired() {
            Ok(0) => {}
            Ok(removed) => debug!(backend, removed, "expired records purged"),
            Err(e) => warn!(backend, error = %e, "expiry sweep failed"),
        }
    })
}
