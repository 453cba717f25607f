//! Duration discovery and full decoding of a source file.
//!
//! Both go through a temporary 16-bit PCM WAV produced by the media
//! toolchain, which gives a reliable frame count even for containers whose
//! headers lack one. The temporary file is removed before returning.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tempfile::TempPath;

use crate::error::{ProbeError, ToolchainError};
use crate::planner::ChunkWindow;
use crate::toolchain::{MediaToolchain, PcmSlice};

/// Facts about a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeInfo {
    pub duration: Duration,
    /// Size of the source file on disk.
    pub size_bytes: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl ProbeInfo {
    /// Duration formatted as `1h 05m` or `3m 07s`.
    pub fn duration_label(&self) -> String {
        let seconds = self.duration.as_secs();
        let (hours, minutes) = (seconds / 3_600, seconds / 60 % 60);
        if hours > 0 {
            format!("{hours}h {minutes:02}m")
        } else {
            format!("{minutes}m {:02}s", seconds % 60)
        }
    }

    pub fn size_megabytes(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Decoded interleaved samples of a whole source file.
#[derive(Clone, Debug)]
pub struct SourceAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl SourceAudio {
    /// Wrap interleaved samples. Trailing samples that do not fill a frame are dropped.
    pub fn new(mut samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % usize::from(channels);
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> u64 {
        (self.samples.len() / usize::from(self.channels)) as u64
    }

    /// Total duration, rounded up to whole nanoseconds so the last frame is covered.
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames(), self.sample_rate)
    }

    /// Index of the frame playing at `time`, clamped to the end of the source.
    pub fn frame_at(&self, time: Duration) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let frame = time.as_nanos() * u128::from(self.sample_rate) / 1_000_000_000;
        frame.min(u128::from(self.frames())) as u64
    }

    /// Samples covering `[window.start, window.end)`.
    ///
    /// Adjacent windows map to adjacent, non-overlapping sample ranges.
    pub fn slice(&self, window: &ChunkWindow) -> PcmSlice<'_> {
        let channels = usize::from(self.channels);
        let start = self.frame_at(window.start) as usize * channels;
        let end = (self.frame_at(window.end) as usize * channels).max(start);
        PcmSlice {
            samples: &self.samples[start..end],
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn as_pcm(&self) -> PcmSlice<'_> {
        PcmSlice {
            samples: &self.samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = (u128::from(frames) * 1_000_000_000).div_ceil(u128::from(sample_rate));
    Duration::new(
        (nanos / 1_000_000_000) as u64,
        (nanos % 1_000_000_000) as u32,
    )
}

/// Probes and decodes source files through a [`MediaToolchain`].
pub struct MediaProbe<'a> {
    toolchain: &'a dyn MediaToolchain,
    temp_dir: Option<PathBuf>,
}

impl<'a> MediaProbe<'a> {
    pub fn new(toolchain: &'a dyn MediaToolchain) -> Self {
        Self {
            toolchain,
            temp_dir: None,
        }
    }

    /// Create temporary artifacts in `dir` instead of the system temp directory.
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.temp_dir = dir.map(Into::into);
        self
    }

    /// Determine duration and stream layout without keeping decoded samples in memory.
    pub fn probe(&self, path: &Path) -> Result<ProbeInfo, ProbeError> {
        let size_bytes = fs::metadata(path)?.len();
        let artifact = self.transcode(path)?;

        let result = read_wav(&artifact, false).map_err(|err| decode_failed(path, err));
        release(artifact);

        let (layout, _) = result?;
        debug!(
            "probed '{}': {} frames at {} Hz",
            path.display(),
            layout.frames,
            layout.sample_rate
        );
        Ok(layout.info(size_bytes))
    }

    /// Decode the whole source into memory.
    pub fn decode(&self, path: &Path) -> Result<(ProbeInfo, SourceAudio), ProbeError> {
        let size_bytes = fs::metadata(path)?.len();
        let artifact = self.transcode(path)?;

        let result = read_wav(&artifact, true).map_err(|err| decode_failed(path, err));
        release(artifact);

        let (layout, samples) = result?;
        let source = SourceAudio::new(samples, layout.sample_rate, layout.channels);
        if source.frames() == 0 {
            return Err(ProbeError::DecodeFailed {
                path: path.to_path_buf(),
                reason: "source contains no audio samples".to_owned(),
            });
        }

        let info = ProbeInfo {
            duration: source.duration(),
            ..layout.info(size_bytes)
        };
        Ok((info, source))
    }

    fn transcode(&self, path: &Path) -> Result<TempPath, ProbeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("audiosplit-").suffix(".wav");
        let artifact = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        }
        .into_temp_path();

        debug!(
            "transcoding '{}' to '{}'",
            path.display(),
            artifact.display()
        );

        match self.toolchain.decode_to_wav(path, &artifact) {
            Ok(()) => Ok(artifact),
            // `artifact` is dropped here, which removes it.
            Err(err @ ToolchainError::Unavailable { .. }) => {
                Err(ProbeError::ToolchainUnavailable(err))
            }
            Err(ToolchainError::Io(err)) => Err(ProbeError::Io(err)),
            Err(err) => Err(decode_failed(path, err)),
        }
    }
}

fn release(artifact: TempPath) {
    let display = artifact.display().to_string();
    if let Err(err) = artifact.close() {
        warn!("failed to remove temporary file '{display}': {err}");
    }
}

fn decode_failed<E: std::fmt::Display>(path: &Path, err: E) -> ProbeError {
    ProbeError::DecodeFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

struct WavLayout {
    frames: u64,
    sample_rate: u32,
    channels: u16,
}

impl WavLayout {
    fn info(&self, size_bytes: u64) -> ProbeInfo {
        ProbeInfo {
            duration: frames_to_duration(self.frames, self.sample_rate),
            size_bytes,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum WavError {
    #[error(transparent)]
    Symphonia(#[from] SymphoniaError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("decoded stream does not provide a default track")]
    MissingDefaultTrack,
    #[error("decoded stream does not advertise {0}")]
    MissingParameter(&'static str),
    #[error("unsupported codec in decoded stream")]
    UnsupportedCodec,
    #[error("WAV file has no data chunk")]
    MissingDataChunk,
    #[error("decoded {decoded} of the {stored} frames stored in the file")]
    Truncated { decoded: u64, stored: u64 },
}

/// Largest file whose length a classic RIFF header can state; past it the
/// size fields are saturated or wrapped and the header frame count is wrong.
const RIFF_SIZE_LIMIT: u64 = u32::MAX as u64;

/// Frames held in the `data` chunk, assuming it runs to the end of the file.
fn frames_in_data_chunk<R: Read + Seek>(
    reader: &mut R,
    file_len: u64,
    block_align: u64,
) -> Result<u64, WavError> {
    let mut position = reader.seek(SeekFrom::Start(12))?;
    let mut header = [0u8; 8];
    loop {
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(WavError::MissingDataChunk)
            }
            Err(err) => return Err(err.into()),
        }
        position += 8;
        if &header[..4] == b"data" {
            return Ok(file_len.saturating_sub(position) / block_align.max(1));
        }
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        // Chunks are padded to an even length.
        let skip = u64::from(size) + u64::from(size & 1);
        position = reader.seek(SeekFrom::Current(skip as i64))?;
    }
}

/// Read the layout of a WAV file and, if `keep_samples`, its interleaved samples.
///
/// Without `keep_samples` the frame count comes from the header when present,
/// otherwise frames are counted while decoding and then discarded. Files over
/// 4 GiB have their frames counted from the file length instead.
fn read_wav(path: &Path, keep_samples: bool) -> Result<(WavLayout, Vec<i16>), WavError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut reader = probed.format;

    let track = reader.default_track().ok_or(WavError::MissingDefaultTrack)?;
    if track.codec_params.codec == CODEC_TYPE_NULL {
        return Err(WavError::UnsupportedCodec);
    }
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or(WavError::MissingParameter("a sample rate"))?;
    let channels = params
        .channels
        .map(|channels| channels.count() as u16)
        .ok_or(WavError::MissingParameter("a channel layout"))?;

    let block_align =
        u64::from(channels) * u64::from(params.bits_per_sample.unwrap_or(16).div_ceil(8));
    let stored_frames = if file_len > RIFF_SIZE_LIMIT {
        let frames = frames_in_data_chunk(&mut File::open(path)?, file_len, block_align)?;
        debug!(
            "'{}' is {file_len} bytes; header reports {:?} frames, file holds {frames}",
            path.display(),
            params.n_frames
        );
        Some(frames)
    } else {
        None
    };

    if !keep_samples {
        if let Some(frames) = stored_frames.or(params.n_frames) {
            return Ok((
                WavLayout {
                    frames,
                    sample_rate,
                    channels,
                },
                Vec::new(),
            ));
        }
    }

    let mut decoder = get_codecs().make(&params, &DecoderOptions::default())?;
    let expected = params.n_frames.unwrap_or(0) as usize * usize::from(channels);
    let mut samples = Vec::with_capacity(if keep_samples { expected } else { 0 });
    let mut frames = 0u64;
    let mut buffer: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match next_packet(reader.as_mut())? {
            Some(packet) => packet,
            None => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                frames += decoded.frames() as u64;
                if !keep_samples {
                    continue;
                }

                let needed = decoded.capacity() * decoded.spec().channels.count();
                if buffer.as_ref().is_none_or(|buf| buf.capacity() < needed) {
                    buffer = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
                }
                if let Some(buf) = buffer.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(err)) => {
                warn!("skipping undecodable packet: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(stored) = stored_frames.filter(|&stored| frames < stored) {
        return Err(WavError::Truncated {
            decoded: frames,
            stored,
        });
    }

    Ok((
        WavLayout {
            frames,
            sample_rate,
            channels,
        },
        samples,
    ))
}

fn next_packet(
    reader: &mut dyn FormatReader,
) -> Result<Option<symphonia::core::formats::Packet>, SymphoniaError> {
    match reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
