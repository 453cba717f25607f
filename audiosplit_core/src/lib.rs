//! Split a single audio recording into consecutive fixed-length files.
//!
//! A [`SplitJob`] decodes the source once through an external
//! [`MediaToolchain`] (normally [`Ffmpeg`]), partitions its duration into
//! [`ChunkWindow`]s and re-encodes each window as its own file named
//! `<stem>_part<NN>.mp3`. The job runs on a background thread and reports
//! through an ordered [`ProgressChannel`]; the observer may stop it through a
//! [`CancellationToken`], which takes effect between chunks.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use audiosplit_core::{Ffmpeg, ProgressEvent, SplitJob, SplitJobConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ffmpeg = Arc::new(Ffmpeg::locate()?);
//! let config = SplitJobConfig::builder("lecture.m4a", "chunks", Duration::from_secs(90 * 60))
//!     .preserve_quality(true)
//!     .build();
//!
//! let (handle, progress) = SplitJob::start(config, ffmpeg);
//! for event in progress.iter() {
//!     if let ProgressEvent::Progress { percent, message } = &event {
//!         println!("{percent:>3}% {message}");
//!     }
//! }
//! println!("{:?}", handle.join());
//! # Ok(())
//! # }
//! ```

mod config;
mod encoder;
mod error;
mod job;
mod planner;
mod probe;
mod progress;
mod toolchain;

pub use config::{
    OutputFormat, SplitJobConfig, SplitJobConfigBuilder, DEFAULT_POSTFIX,
    PRESERVE_QUALITY_BITRATE_KBPS,
};
pub use encoder::{partial_path, ChunkEncoder};
pub use error::{
    ConfigError, EncodeError, ErrorKind, PlanError, ProbeError, SplitError, ToolchainError,
};
pub use job::{run_to_completion, JobState, SplitHandle, SplitJob, SplitJobResult};
pub use planner::{
    check_resolution, chunk_count, chunk_file_name, index_width, output_paths, plan, plan_outputs,
    ChunkWindow, MAX_CHUNKS,
};
pub use probe::{MediaProbe, ProbeInfo, SourceAudio};
pub use progress::{encoding_percent, CancellationToken, ProgressChannel, ProgressEvent};
pub use toolchain::{EncodeSettings, Ffmpeg, MediaToolchain, PcmSlice};
