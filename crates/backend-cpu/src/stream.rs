//! Ordered command streams and cross-stream events.
//!
//! A stream is a worker thread draining a command queue, so work on one
//! stream runs in submission order while different streams run
//! concurrently. A command that fails or panics faults its stream: the
//! worker stops, queued work is dropped, and later submissions report the
//! fault. Events carry faults across streams, so a stream waiting on a
//! faulted producer faults as well.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::error::CpuDeviceError;

type Command = Box<dyn FnOnce() -> Result<(), String> + Send + 'static>;

pub struct CpuStream {
    name: String,
    sender: Option<Sender<Command>>,
    fault: Arc<Mutex<Option<String>>>,
    worker: Option<JoinHandle<()>>,
}

impl CpuStream {
    pub(crate) fn spawn(name: String) -> Result<Self, CpuDeviceError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Command>();
        let fault = Arc::new(Mutex::new(None));
        let worker_fault = Arc::clone(&fault);
        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || drain(&worker_name, receiver, &worker_fault))?;
        debug!("stream {name} started");
        Ok(Self {
            name,
            sender: Some(sender),
            fault,
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fault that stopped this stream, if any.
    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }

    pub(crate) fn submit<F>(&self, command: F) -> Result<(), CpuDeviceError>
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        if let Some(message) = self.fault() {
            return Err(CpuDeviceError::Faulted {
                stream: self.name.clone(),
                message,
            });
        }
        let sender = self.sender.as_ref().ok_or_else(|| self.stopped())?;
        sender.send(Box::new(command)).map_err(|_| self.stopped())
    }

    /// Blocks until every command submitted so far has run.
    pub(crate) fn synchronize(&self) -> Result<(), CpuDeviceError> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.submit(move || {
            let _ = done_tx.send(());
            Ok(())
        })?;
        done_rx.recv().map_err(|_| self.stopped())
    }

    /// Error describing why the stream no longer runs work.
    pub(crate) fn stopped(&self) -> CpuDeviceError {
        match self.fault() {
            Some(message) => CpuDeviceError::Faulted {
                stream: self.name.clone(),
                message,
            },
            None => CpuDeviceError::StreamClosed(self.name.clone()),
        }
    }
}

impl Drop for CpuStream {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("stream {} worker did not shut down cleanly", self.name);
            }
        }
    }
}

fn drain(name: &str, receiver: Receiver<Command>, fault: &Mutex<Option<String>>) {
    for command in receiver {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(command)) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        if let Err(message) = outcome {
            error!("stream {name} faulted: {message}");
            *fault.lock() = Some(message);
            return;
        }
    }
    debug!("stream {name} stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("command panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("command panicked: {text}")
    } else {
        "command panicked".to_string()
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Default)]
struct Progress {
    completed: u64,
    fault: Option<String>,
}

#[derive(Default)]
struct EventState {
    issued: AtomicU64,
    progress: Mutex<Progress>,
    changed: Condvar,
}

/// A point in a stream other streams can wait for.
///
/// Each record issues a ticket; a wait enqueued afterwards blocks its
/// stream until that ticket (or a later one) completes.
#[derive(Clone, Default)]
pub struct CpuEvent {
    state: Arc<EventState>,
}

impl CpuEvent {
    pub(crate) fn record_on(&self, stream: &CpuStream) -> Result<(), CpuDeviceError> {
        let ticket = self.state.issued.fetch_add(1, Ordering::AcqRel) + 1;
        let signal = Signal {
            state: Arc::clone(&self.state),
            ticket,
            delivered: false,
        };
        stream.submit(move || {
            signal.deliver();
            Ok(())
        })
    }

    pub(crate) fn wait_on(&self, stream: &CpuStream) -> Result<(), CpuDeviceError> {
        let target = self.state.issued.load(Ordering::Acquire);
        if target == 0 {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        stream.submit(move || {
            let mut progress = state.progress.lock();
            while progress.completed < target && progress.fault.is_none() {
                state.changed.wait(&mut progress);
            }
            match &progress.fault {
                Some(message) => Err(format!("awaited event faulted: {message}")),
                None => Ok(()),
            }
        })
    }

    /// Number of records that have completed.
    pub fn completed(&self) -> u64 {
        self.state.progress.lock().completed
    }
}

/// Completes a ticket when run; faults the event if dropped unrun.
struct Signal {
    state: Arc<EventState>,
    ticket: u64,
    delivered: bool,
}

impl Signal {
    fn deliver(mut self) {
        self.delivered = true;
        let mut progress = self.state.progress.lock();
        progress.completed = progress.completed.max(self.ticket);
        self.state.changed.notify_all();
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        if !self.delivered {
            let mut progress = self.state.progress.lock();
            progress
                .fault
                .get_or_insert_with(|| "recording stream stopped before the event".to_string());
            self.state.changed.notify_all();
        }
    }
}
