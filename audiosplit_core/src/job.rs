//! The split job: one background worker that decodes the source once, plans
//! the chunk windows and encodes them in order, reporting through a
//! [`ProgressChannel`] and stopping at chunk boundaries when cancelled.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use parking_lot::RwLock;

use crate::config::SplitJobConfig;
use crate::encoder::ChunkEncoder;
use crate::error::SplitError;
use crate::planner;
use crate::probe::MediaProbe;
use crate::progress::{
    self, encoding_percent, CancellationToken, ProgressChannel, ProgressEvent, ProgressSender,
    DONE_PERCENT, LOADING_PERCENT, PLANNED_PERCENT,
};
use crate::toolchain::MediaToolchain;

/// Lifecycle of a split job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Decoding,
    Planning,
    Encoding,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    /// Terminal states are final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

/// Final outcome of a split job.
#[derive(Debug)]
pub enum SplitJobResult {
    Completed {
        file_count: usize,
        file_paths: Vec<PathBuf>,
    },
    Cancelled,
    Failed {
        reason: SplitError,
    },
}

impl SplitJobResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, SplitJobResult::Completed { .. })
    }
}

#[derive(Clone, Debug)]
struct SharedState(Arc<RwLock<JobState>>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(JobState::Pending)))
    }

    fn get(&self) -> JobState {
        *self.0.read()
    }

    /// Move to `next` unless a terminal state was already reached.
    fn set(&self, next: JobState) {
        let mut state = self.0.write();
        if state.is_terminal() {
            debug!("ignoring transition {:?} -> {next:?}", *state);
            return;
        }
        debug!("job state {:?} -> {next:?}", *state);
        *state = next;
    }
}

/// Worker side of a split job.
pub struct SplitJob {
    config: SplitJobConfig,
    toolchain: Arc<dyn MediaToolchain>,
    state: SharedState,
    cancel: CancellationToken,
    events: ProgressSender,
}

impl SplitJob {
    /// Validate `config` and start splitting on a background thread.
    ///
    /// Returns immediately. An invalid configuration fails the job before
    /// anything touches the filesystem: the handle is already in
    /// [`JobState::Failed`] and the channel holds a single failure event.
    pub fn start(
        config: SplitJobConfig,
        toolchain: Arc<dyn MediaToolchain>,
    ) -> (SplitHandle, ProgressChannel) {
        Self::start_with_token(config, toolchain, CancellationToken::new())
    }

    /// Like [`SplitJob::start`], observing a caller-provided cancellation token.
    pub fn start_with_token(
        config: SplitJobConfig,
        toolchain: Arc<dyn MediaToolchain>,
        cancel: CancellationToken,
    ) -> (SplitHandle, ProgressChannel) {
        let (events, channel) = progress::channel();
        let state = SharedState::new();

        let mut job = SplitJob {
            config,
            toolchain,
            state: state.clone(),
            cancel: cancel.clone(),
            events,
        };

        let handle = |worker| SplitHandle {
            state: state.clone(),
            cancel: cancel.clone(),
            worker,
        };

        if let Err(err) = job.config.validate() {
            let result = fail(&state, &mut job.events, SplitError::from(err));
            return (handle(Worker::Finished(result)), channel);
        }

        info!(
            "splitting '{}' into '{}' every {:?}",
            job.config.source_path.display(),
            job.config.output_dir.display(),
            job.config.chunk_length
        );

        // Kept outside the worker so a failed spawn can still report.
        let mut fallback = job.events.fork();
        let mut on_panic = job.events.fork();
        let worker_state = state.clone();
        let spawned = thread::Builder::new()
            .name("audiosplit-worker".into())
            .spawn(move || {
                panic::catch_unwind(AssertUnwindSafe(|| job.run())).unwrap_or_else(|payload| {
                    let reason = panic_message(payload.as_ref()).to_owned();
                    fail(&worker_state, &mut on_panic, SplitError::Worker(reason))
                })
            });

        match spawned {
            Ok(join) => (handle(Worker::Running(join)), channel),
            Err(err) => {
                let result = fail(&state, &mut fallback, SplitError::Worker(err.to_string()));
                (handle(Worker::Finished(result)), channel)
            }
        }
    }

    fn run(mut self) -> SplitJobResult {
        let outcome = self.execute();
        self.finish(outcome)
    }

    fn execute(&mut self) -> Result<Vec<PathBuf>, SplitError> {
        let config = &self.config;

        fs::create_dir_all(&config.output_dir).map_err(|source| SplitError::OutputDirectory {
            path: config.output_dir.clone(),
            source,
        })?;

        self.state.set(JobState::Decoding);
        self.events.progress(LOADING_PERCENT, "loading source audio");
        let (info, source) = MediaProbe::new(self.toolchain.as_ref())
            .temp_dir(config.temp_dir.as_ref())
            .decode(&config.source_path)?;
        info!(
            "decoded '{}': {} ({} Hz, {} channel(s), {:.1} MB)",
            config.source_path.display(),
            info.duration_label(),
            info.sample_rate,
            info.channels,
            info.size_megabytes()
        );

        self.state.set(JobState::Planning);
        planner::check_resolution(config.chunk_length, source.sample_rate())?;
        let windows = planner::plan(source.duration(), config.chunk_length)?;
        let planned = windows.len();
        let outputs = planner::output_paths(config, planned);
        if !config.overwrite {
            if let Some(existing) = outputs.iter().find(|path| path.exists()) {
                return Err(SplitError::OutputExists(existing.clone()));
            }
        }
        self.events
            .progress(PLANNED_PERCENT, format!("{planned} chunks planned"));

        self.state.set(JobState::Encoding);
        let encoder = ChunkEncoder::new(
            self.toolchain.as_ref(),
            config.output_format,
            config.preserve_quality,
        );
        debug!("encoding {planned} chunk(s) with {:?}", encoder.settings());
        let mut written = Vec::with_capacity(planned);

        for (window, path) in windows.iter().zip(outputs) {
            if self.cancel.is_cancelled() {
                info!("cancellation requested after {} of {planned} chunks", written.len());
                return Err(SplitError::Cancelled {
                    completed: written.len(),
                    planned,
                });
            }

            encoder
                .encode(&source, window, &path)
                .map_err(|err| SplitError::Encode {
                    number: window.number(),
                    source: err,
                })?;
            written.push(path);

            self.events.progress(
                encoding_percent(window.number(), planned),
                format!("encoding {}/{planned}", window.number()),
            );
        }

        Ok(written)
    }

    /// Record the terminal state and emit the single terminal event.
    fn finish(&mut self, outcome: Result<Vec<PathBuf>, SplitError>) -> SplitJobResult {
        match outcome {
            Ok(files) => {
                self.events.progress(DONE_PERCENT, "done");
                self.state.set(JobState::Completed);
                info!("split complete: {} file(s)", files.len());
                self.events.completed(
                    format!("split complete: {} file(s) created", files.len()),
                    files.clone(),
                );
                SplitJobResult::Completed {
                    file_count: files.len(),
                    file_paths: files,
                }
            }
            Err(err @ SplitError::Cancelled { .. }) => {
                self.state.set(JobState::Cancelled);
                self.events.failed(err.to_string());
                SplitJobResult::Cancelled
            }
            Err(err) => fail(&self.state, &mut self.events, err),
        }
    }
}

fn fail(state: &SharedState, events: &mut ProgressSender, err: SplitError) -> SplitJobResult {
    error!("split failed: {err}");
    state.set(JobState::Failed);
    events.failed(err.to_string());
    SplitJobResult::Failed { reason: err }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}

#[derive(Debug)]
enum Worker {
    Running(JoinHandle<SplitJobResult>),
    Finished(SplitJobResult),
}

/// Observer side of a running split job.
#[derive(Debug)]
pub struct SplitHandle {
    state: SharedState,
    cancel: CancellationToken,
    worker: Worker,
}

impl SplitHandle {
    /// Ask the job to stop before the next chunk. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> JobState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        match &self.worker {
            Worker::Running(join) => join.is_finished(),
            Worker::Finished(_) => true,
        }
    }

    /// Wait for the job to end and return its outcome.
    pub fn join(self) -> SplitJobResult {
        match self.worker {
            Worker::Finished(result) => result,
            Worker::Running(join) => join.join().unwrap_or_else(|_| {
                self.state.set(JobState::Failed);
                SplitJobResult::Failed {
                    reason: SplitError::Worker("worker thread panicked".to_owned()),
                }
            }),
        }
    }
}

/// Run a job to completion on a background worker, handing every event to `observer`.
pub fn run_to_completion<F>(
    config: SplitJobConfig,
    toolchain: Arc<dyn MediaToolchain>,
    mut observer: F,
) -> SplitJobResult
where
    F: FnMut(&ProgressEvent),
{
    let (handle, channel) = SplitJob::start(config, toolchain);
    for event in channel.iter() {
        observer(&event);
    }
    handle.join()
}
