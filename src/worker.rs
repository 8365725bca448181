//! Background tracking thread.
//!
//! The network side never touches `HandTracker` directly. It queues inputs
//! into a bounded channel; the worker drains them strictly in arrival order,
//! so settings always land between two frames. When the queue is full new
//! frames are dropped and counted. Settings and resets are never dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::pipeline::{Frame, HandTracker};
use crate::protocol::ServerMessage;

#[derive(Debug)]
pub enum WorkerInput {
    Frame(Frame),
    Setting {
        section: String,
        key: String,
        value: String,
    },
    ResetSlot(usize),
    ResetAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tracking worker has stopped")]
pub struct WorkerStopped;

/// Cloneable sender side of the worker queue.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: SyncSender<WorkerInput>,
    dropped_frames: Arc<AtomicU64>,
}

impl WorkerHandle {
    /// Queue a frame without blocking. Returns false if it was dropped.
    pub fn submit_frame(&self, frame: Frame) -> Result<bool, WorkerStopped> {
        match self.tx.try_send(WorkerInput::Frame(frame)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(WorkerStopped),
        }
    }

    /// Blocks while the queue is full.
    pub fn apply_setting(&self, section: &str, key: &str, value: &str) -> Result<(), WorkerStopped> {
        self.send(WorkerInput::Setting {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Queue a setting or reset without blocking. A full queue hands the
    /// input back so the caller can retry without losing its place.
    pub fn try_submit(&self, input: WorkerInput) -> Result<Option<WorkerInput>, WorkerStopped> {
        match self.tx.try_send(input) {
            Ok(()) => Ok(None),
            Err(TrySendError::Full(input)) => Ok(Some(input)),
            Err(TrySendError::Disconnected(_)) => Err(WorkerStopped),
        }
    }

    pub fn reset_slot(&self, slot: usize) -> Result<(), WorkerStopped> {
        self.send(WorkerInput::ResetSlot(slot))
    }

    pub fn reset_all(&self) -> Result<(), WorkerStopped> {
        self.send(WorkerInput::ResetAll)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    fn send(&self, input: WorkerInput) -> Result<(), WorkerStopped> {
        self.tx.send(input).map_err(|_| WorkerStopped)
    }
}

pub struct TrackingWorker {
    handle: WorkerHandle,
    thread: JoinHandle<HandTracker>,
}

impl TrackingWorker {
    /// Spawn the worker thread. Reports go out through `out_tx`.
    pub fn start(
        tracker: HandTracker,
        out_tx: Sender<ServerMessage>,
        capacity: usize,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let dropped_frames = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped_frames);
        let thread = std::thread::Builder::new()
            .name("tracking".to_string())
            .spawn(move || run_tracking_loop(tracker, rx, out_tx, counter))?;
        Ok(Self {
            handle: WorkerHandle { tx, dropped_frames },
            thread,
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stop accepting input and wait for the queue to drain.
    ///
    /// Only returns once every other `WorkerHandle` clone is gone too.
    pub fn join(self) -> Option<HandTracker> {
        drop(self.handle);
        self.thread.join().ok()
    }
}

fn run_tracking_loop(
    mut tracker: HandTracker,
    rx: Receiver<WorkerInput>,
    out_tx: Sender<ServerMessage>,
    dropped_frames: Arc<AtomicU64>,
) -> HandTracker {
    info!("tracking worker started");
    let mut reported_drops = 0;

    while let Ok(input) = rx.recv() {
        match input {
            WorkerInput::Frame(frame) => {
                let dropped = dropped_frames.load(Ordering::Relaxed);
                if dropped > reported_drops {
                    warn!(dropped, "frame queue overflow, frames dropped");
                    reported_drops = dropped;
                }
                let report = tracker.process(&frame);
                if out_tx.blocking_send(ServerMessage::Report(report)).is_err() {
                    debug!("report receiver closed");
                }
            }
            WorkerInput::Setting { section, key, value } => {
                let msg = match tracker.apply_setting(&section, &key, &value) {
                    Ok(()) => {
                        info!(%section, %key, %value, "setting applied");
                        ServerMessage::SettingAccepted { section, key }
                    }
                    Err(e) => {
                        warn!(%section, %key, %value, "setting rejected: {}", e);
                        ServerMessage::SettingRejected {
                            section,
                            key,
                            reason: e.to_string(),
                        }
                    }
                };
                if out_tx.blocking_send(msg).is_err() {
                    debug!("report receiver closed");
                }
            }
            WorkerInput::ResetSlot(slot) => tracker.reset_slot(slot),
            WorkerInput::ResetAll => {
                tracker.reset_all();
                debug!("all hand slots reset");
            }
        }
    }

    info!("tracking worker stopped");
    tracker
}
