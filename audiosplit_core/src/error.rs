use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Problems with a [`SplitJobConfig`](crate::SplitJobConfig) detected before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No source file was supplied.
    #[error("no source file was given")]
    EmptySourcePath,

    /// The source file does not exist.
    #[error("source file does not exist: {0}")]
    MissingSource(PathBuf),

    /// The source path exists but is not a regular file.
    #[error("source path is not a file: {0}")]
    SourceNotAFile(PathBuf),

    /// A base name for the output files cannot be derived from the source path.
    #[error("failed to derive a base name from '{0}'")]
    InvalidSourceName(PathBuf),

    /// No output directory was supplied.
    #[error("no output directory was given")]
    EmptyOutputDirectory,

    /// The output path exists but is not a directory.
    #[error("output path is not a directory: {0}")]
    OutputNotADirectory(PathBuf),

    /// The chunk length is zero.
    #[error("chunk length must be greater than zero")]
    InvalidChunkLength,

    /// The postfix would escape the output directory.
    #[error("postfix '{0}' must not contain path separators")]
    InvalidPostfix(String),
}

/// Failures reported by the external media toolchain.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The toolchain binary cannot be located or executed.
    #[error(
        "{program} could not be executed ({reason}); install FFmpeg and make sure it is on PATH"
    )]
    Unavailable { program: String, reason: String },

    /// The toolchain does not provide the requested encoder.
    #[error("the media toolchain has no '{encoder}' encoder")]
    UnknownEncoder { encoder: String },

    /// The toolchain ran but exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Pipe or filesystem failure while driving the toolchain.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors produced while probing or decoding a source file.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The decode capability cannot be located or executed.
    #[error("media toolchain unavailable: {0}")]
    ToolchainUnavailable(#[source] ToolchainError),

    /// The toolchain, or the reader of its output, rejected the input.
    #[error("failed to decode '{path}': {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    /// Creating, reading or removing the temporary decode artifact failed.
    #[error("I/O failure while decoding: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced by the chunk planner.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The chunk length is zero.
    #[error("chunk length must be greater than zero")]
    InvalidChunkLength,

    /// The requested chunk length would produce an unreasonable number of files.
    #[error("splitting would produce {count} chunks, more than the limit of {limit}")]
    TooManyChunks { count: u128, limit: usize },

    /// The chunk length is shorter than one sample period, so chunks would be empty.
    #[error("chunk length {chunk_length:?} is shorter than one frame at {sample_rate} Hz")]
    ChunkShorterThanFrame {
        chunk_length: Duration,
        sample_rate: u32,
    },
}

/// Errors produced while encoding a single chunk.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The toolchain cannot encode the configured output format.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// The destination file cannot be written.
    #[error("cannot write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The underlying encode step failed.
    #[error("encoder failed: {0}")]
    ToolchainFailure(#[source] ToolchainError),
}

/// Broad classification of a [`SplitError`], suitable for branching in observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input detected before work started.
    Config,
    /// The external decode/encode capability is missing or failed.
    Toolchain,
    /// A filesystem operation failed.
    Io,
    /// The user asked the job to stop.
    Cancelled,
    /// The worker itself could not run to completion.
    Internal,
}

/// Terminal failure of a split job.
#[derive(Debug, Error)]
pub enum SplitError {
    /// The configuration was rejected before any work started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The source could not be decoded.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The source could not be partitioned with the configured chunk length.
    #[error("cannot plan chunks: {0}")]
    Plan(#[from] PlanError),

    /// Encoding the chunk with the given 1-based number failed.
    #[error("failed to encode chunk {number}: {source}")]
    Encode {
        number: usize,
        #[source]
        source: EncodeError,
    },

    /// The output directory could not be created.
    #[error("failed to create output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A planned chunk file already exists and overwriting is disabled.
    #[error("output file already exists: {0} (enable overwrite to replace it)")]
    OutputExists(PathBuf),

    /// The observer cancelled the job between chunks.
    #[error("cancelled by user after {completed} of {planned} chunks")]
    Cancelled { completed: usize, planned: usize },

    /// The worker thread could not be started or panicked.
    #[error("split worker terminated unexpectedly: {0}")]
    Worker(String),
}

impl SplitError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::Config(_) | SplitError::Plan(_) => ErrorKind::Config,
            SplitError::Probe(ProbeError::Io(_)) => ErrorKind::Io,
            SplitError::Probe(_) => ErrorKind::Toolchain,
            SplitError::Encode {
                source: EncodeError::Io { .. },
                ..
            } => ErrorKind::Io,
            SplitError::Encode { .. } => ErrorKind::Toolchain,
            SplitError::OutputDirectory { .. } | SplitError::OutputExists(_) => ErrorKind::Io,
            SplitError::Cancelled { .. } => ErrorKind::Cancelled,
            SplitError::Worker(_) => ErrorKind::Internal,
        }
    }
}
