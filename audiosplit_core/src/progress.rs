//! Ordered progress events flowing from a split worker to its observer, and
//! the flag the observer uses to ask the worker to stop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::debug;

/// Percent reported when the source starts loading.
pub const LOADING_PERCENT: u8 = 10;
/// Percent reported once the chunk windows are known.
pub const PLANNED_PERCENT: u8 = 20;
/// Share of the bar covered by chunk encoding.
pub const ENCODING_SPAN: u8 = 70;
pub const DONE_PERCENT: u8 = 100;

/// Event emitted by a split job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress { percent: u8, message: String },
    /// Terminal: every chunk was written.
    Completed {
        message: String,
        files: Vec<PathBuf>,
    },
    /// Terminal: the job failed or was cancelled.
    Failed { message: String },
}

impl ProgressEvent {
    /// Whether this event ends the job's event stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProgressEvent::Progress { message, .. }
            | ProgressEvent::Completed { message, .. }
            | ProgressEvent::Failed { message } => message,
        }
    }
}

/// Percent reported after `done` of `total` chunks were encoded.
pub fn encoding_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PLANNED_PERCENT + ENCODING_SPAN;
    }
    let done = done.min(total);
    PLANNED_PERCENT + (ENCODING_SPAN as usize * done / total) as u8
}

/// Shared stop request, set by the observer and polled by the worker.
///
/// Cloning shares the flag. Cancelling more than once has no further effect.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Create a connected sender/receiver pair for one job.
pub(crate) fn channel() -> (ProgressSender, ProgressChannel) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        ProgressSender {
            tx,
            finished: Arc::new(AtomicBool::new(false)),
        },
        ProgressChannel { rx },
    )
}

/// Producer half. Never blocks, and drops everything sent after a terminal event.
#[derive(Debug)]
pub(crate) struct ProgressSender {
    tx: Sender<ProgressEvent>,
    /// Shared by every fork, so the channel carries at most one terminal event.
    finished: Arc<AtomicBool>,
}

impl ProgressSender {
    /// Second producer on the same channel.
    pub(crate) fn fork(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            finished: Arc::clone(&self.finished),
        }
    }

    pub(crate) fn progress<S: Into<String>>(&mut self, percent: u8, message: S) {
        self.send(ProgressEvent::Progress {
            percent,
            message: message.into(),
        });
    }

    pub(crate) fn completed<S: Into<String>>(&mut self, message: S, files: Vec<PathBuf>) {
        self.send(ProgressEvent::Completed {
            message: message.into(),
            files,
        });
    }

    pub(crate) fn failed<S: Into<String>>(&mut self, message: S) {
        self.send(ProgressEvent::Failed {
            message: message.into(),
        });
    }

    fn send(&mut self, event: ProgressEvent) {
        let already_finished = if event.is_terminal() {
            self.finished.swap(true, Ordering::SeqCst)
        } else {
            self.finished.load(Ordering::SeqCst)
        };
        if already_finished {
            debug!("dropping event after terminal event: {event:?}");
            return;
        }

        // The observer may have gone away; the job still runs to completion.
        if self.tx.send(event).is_err() {
            debug!("progress observer disconnected");
        }
    }
}

/// Consumer half of a job's event stream.
///
/// Events stay queued until drained, in the order they were produced.
#[derive(Debug)]
pub struct ProgressChannel {
    rx: Receiver<ProgressEvent>,
}

impl ProgressChannel {
    /// Take the next queued event without waiting.
    pub fn try_next(&self) -> Option<ProgressEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ProgressEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take every event queued right now.
    pub fn drain(&self) -> Vec<ProgressEvent> {
        self.rx.try_iter().collect()
    }

    /// Blocking iterator over the remaining events; ends once the job is done.
    pub fn iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.rx.iter()
    }
}
