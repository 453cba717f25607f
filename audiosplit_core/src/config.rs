use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Postfix inserted between the source stem and the chunk number.
pub const DEFAULT_POSTFIX: &str = "part";

/// Constant bitrate used when `preserve_quality` is enabled.
pub const PRESERVE_QUALITY_BITRATE_KBPS: u32 = 320;

/// Codec every chunk is encoded with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Mp3,
}

impl OutputFormat {
    /// File extension of produced chunks, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
        }
    }

    /// Encoder name understood by the media toolchain.
    pub fn encoder(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "libmp3lame",
        }
    }

    /// Container/muxer name understood by the media toolchain.
    pub fn muxer(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
        }
    }
}

/// Configuration of a single split job. Immutable once the job starts.
#[derive(Clone, Debug)]
pub struct SplitJobConfig {
    /// Audio file to split.
    pub source_path: PathBuf,
    /// Directory receiving the chunk files; created if missing.
    pub output_dir: PathBuf,
    /// Length of every chunk except possibly the last.
    pub chunk_length: Duration,
    /// Encode at [`PRESERVE_QUALITY_BITRATE_KBPS`] instead of the encoder default.
    pub preserve_quality: bool,
    pub output_format: OutputFormat,
    /// Inserted into file names as `<stem>_<postfix><NN>.<ext>`.
    pub postfix: String,
    /// Replace chunk files left over from an earlier run.
    pub overwrite: bool,
    /// Where the temporary decode artifact is created. `None` uses the system default.
    pub temp_dir: Option<PathBuf>,
}

impl SplitJobConfig {
    /// Start building a configuration with the required fields.
    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>>(
        source: P,
        output_dir: Q,
        chunk_length: Duration,
    ) -> SplitJobConfigBuilder {
        SplitJobConfigBuilder::new(source, output_dir, chunk_length)
    }

    /// Check the configuration without touching the filesystem beyond metadata lookups.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySourcePath);
        }
        if !self.source_path.exists() {
            return Err(ConfigError::MissingSource(self.source_path.clone()));
        }
        if !self.source_path.is_file() {
            return Err(ConfigError::SourceNotAFile(self.source_path.clone()));
        }
        if self.source_path.file_stem().is_none() {
            return Err(ConfigError::InvalidSourceName(self.source_path.clone()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDirectory);
        }
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(ConfigError::OutputNotADirectory(self.output_dir.clone()));
        }
        if self.chunk_length.is_zero() {
            return Err(ConfigError::InvalidChunkLength);
        }
        if self.postfix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidPostfix(self.postfix.clone()));
        }
        Ok(())
    }

    /// Base name shared by all chunk files.
    pub fn source_stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Builder for [`SplitJobConfig`].
#[derive(Clone, Debug)]
pub struct SplitJobConfigBuilder {
    config: SplitJobConfig,
}

impl SplitJobConfigBuilder {
    fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        source: P,
        output_dir: Q,
        chunk_length: Duration,
    ) -> Self {
        Self {
            config: SplitJobConfig {
                source_path: source.as_ref().to_path_buf(),
                output_dir: output_dir.as_ref().to_path_buf(),
                chunk_length,
                preserve_quality: true,
                output_format: OutputFormat::default(),
                postfix: DEFAULT_POSTFIX.to_owned(),
                overwrite: false,
                temp_dir: None,
            },
        }
    }

    pub fn preserve_quality(mut self, preserve: bool) -> Self {
        self.config.preserve_quality = preserve;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn postfix<S: Into<String>>(mut self, postfix: S) -> Self {
        self.config.postfix = postfix.into();
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    /// Finish building. Validation happens when the job starts, see [`SplitJobConfig::validate`].
    pub fn build(self) -> SplitJobConfig {
        self.config
    }
}
