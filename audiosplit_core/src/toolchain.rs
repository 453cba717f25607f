//! The external decode/encode capability.
//!
//! The split engine never touches codecs itself. It asks a [`MediaToolchain`]
//! to turn an arbitrary input into a 16-bit PCM WAV file, and to encode a
//! range of interleaved PCM samples into the configured output format.
//! [`Ffmpeg`] drives the `ffmpeg` command-line tool.

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use log::{debug, info};

use crate::config::{OutputFormat, PRESERVE_QUALITY_BITRATE_KBPS};
use crate::error::ToolchainError;

/// Interleaved signed 16-bit samples with their layout.
#[derive(Clone, Copy, Debug)]
pub struct PcmSlice<'a> {
    pub samples: &'a [i16],
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmSlice<'_> {
    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// How a chunk is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSettings {
    pub format: OutputFormat,
    /// Constant bitrate in kbit/s; `None` keeps the encoder default.
    pub bitrate_kbps: Option<u32>,
}

impl EncodeSettings {
    pub fn new(format: OutputFormat, preserve_quality: bool) -> Self {
        Self {
            format,
            bitrate_kbps: preserve_quality.then_some(PRESERVE_QUALITY_BITRATE_KBPS),
        }
    }
}

/// Capability to decode arbitrary audio and encode PCM into the output format.
pub trait MediaToolchain: Send + Sync {
    /// Human-readable version of the toolchain; fails if it cannot be executed.
    fn version(&self) -> Result<String, ToolchainError>;

    /// Transcode `input` into a 16-bit PCM WAV file at `dest`, overwriting it.
    fn decode_to_wav(&self, input: &Path, dest: &Path) -> Result<(), ToolchainError>;

    /// Encode `pcm` into `dest` using `settings`, overwriting it.
    fn encode(
        &self,
        pcm: PcmSlice<'_>,
        settings: &EncodeSettings,
        dest: &Path,
    ) -> Result<(), ToolchainError>;
}

const FFMPEG: &str = "ffmpeg";

/// Samples written to the encoder's stdin per write call.
const PIPE_BLOCK_SAMPLES: usize = 16 * 1024;

/// [`MediaToolchain`] backed by the `ffmpeg` executable.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    program: PathBuf,
    version: String,
}

impl Ffmpeg {
    /// Find `ffmpeg` on `PATH` and make sure it runs.
    pub fn locate() -> Result<Self, ToolchainError> {
        let program = which::which(FFMPEG).map_err(|err| ToolchainError::Unavailable {
            program: FFMPEG.to_owned(),
            reason: err.to_string(),
        })?;
        Self::with_program(program)
    }

    /// Use the given `ffmpeg` binary and make sure it runs.
    pub fn with_program<P: Into<PathBuf>>(program: P) -> Result<Self, ToolchainError> {
        let program = program.into();
        let output = Command::new(&program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|err| unavailable(&program, &err))?;

        if !output.status.success() {
            return Err(ToolchainError::Unavailable {
                program: program.display().to_string(),
                reason: format!("'-version' exited with {}", describe(output.status)),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned();
        info!("using {} ({version})", program.display());

        Ok(Self { program, version })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]);
        command
    }

    fn failure(&self, status: ExitStatus, stderr: &str) -> ToolchainError {
        ToolchainError::Failed {
            program: self.program.display().to_string(),
            status: describe(status),
            stderr: stderr.trim().to_owned(),
        }
    }
}

impl MediaToolchain for Ffmpeg {
    fn version(&self) -> Result<String, ToolchainError> {
        Ok(self.version.clone())
    }

    fn decode_to_wav(&self, input: &Path, dest: &Path) -> Result<(), ToolchainError> {
        let mut command = self.command();
        command
            .arg("-i")
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-f", "wav"])
            .arg(dest);
        log_command(&command);

        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|err| spawn_error(&self.program, err))?;

        if !output.status.success() {
            return Err(self.failure(output.status, &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(())
    }

    fn encode(
        &self,
        pcm: PcmSlice<'_>,
        settings: &EncodeSettings,
        dest: &Path,
    ) -> Result<(), ToolchainError> {
        let mut command = self.command();
        command
            .args(["-f", "s16le", "-ar"])
            .arg(pcm.sample_rate.to_string())
            .arg("-ac")
            .arg(pcm.channels.to_string())
            .args(["-i", "pipe:0", "-c:a", settings.format.encoder()]);
        if let Some(kbps) = settings.bitrate_kbps {
            command.arg("-b:a").arg(format!("{kbps}k"));
        }
        command.args(["-f", settings.format.muxer()]).arg(dest);
        log_command(&command);

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(&self.program, err))?;

        // Drain stderr concurrently so a chatty encoder cannot block on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let written = match child.stdin.take() {
            Some(mut stdin) => write_pcm(&mut stdin, pcm.samples),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "encoder stdin is not available",
            )),
        };

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let encoder = settings.format.encoder();
            if stderr.contains("Unknown encoder") || stderr.contains("Encoder not found") {
                return Err(ToolchainError::UnknownEncoder {
                    encoder: encoder.to_owned(),
                });
            }
            return Err(self.failure(status, &stderr));
        }

        // An early exit shows up as a broken pipe; the exit status above is the real verdict.
        written?;
        Ok(())
    }
}

fn write_pcm<W: Write>(writer: &mut W, samples: &[i16]) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(PIPE_BLOCK_SAMPLES.min(samples.len()) * 2);
    for block in samples.chunks(PIPE_BLOCK_SAMPLES) {
        bytes.clear();
        for sample in block {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        writer.write_all(&bytes)?;
    }
    writer.flush()
}

fn log_command(command: &Command) {
    let args: Vec<_> = command.get_args().map(OsStr::to_string_lossy).collect();
    debug!(
        "running {} {}",
        command.get_program().to_string_lossy(),
        args.join(" ")
    );
}

fn spawn_error(program: &Path, err: io::Error) -> ToolchainError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => unavailable(program, &err),
        _ => ToolchainError::Io(err),
    }
}

fn unavailable(program: &Path, err: &io::Error) -> ToolchainError {
    ToolchainError::Unavailable {
        program: program.display().to_string(),
        reason: err.to_string(),
    }
}

fn describe(status: ExitStatus) -> String {
    status
        .code()
        .map(|code| format!("exit code {code}"))
        .unwrap_or_else(|| "a signal".to_owned())
}
