//! Dispatch thread shared by the simulated controller and its links

use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, trace, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// Errors raised by the simulated controller
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs posted jobs one at a time, in post order, on its own thread
pub(crate) struct Dispatcher {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub(crate) fn start(name: &str) -> Result<Self, SimError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                debug!("Dispatch thread exiting");
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a job. Returns `false` once stopped.
    pub(crate) fn post(&self, job: Job) -> bool {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) if tx.send(job).is_ok() => {
                trace!("Job queued");
                true
            }
            _ => {
                warn!("Dispatcher stopped, dropping job");
                false
            }
        }
    }

    /// Stop accepting jobs, let queued ones finish, and join the thread
    pub(crate) fn stop(&self) {
        self.tx.lock().take();
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            // Stopped from a job; the loop ends on its own
            return;
        }
        if worker.join().is_err() {
            warn!("Dispatch thread panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
