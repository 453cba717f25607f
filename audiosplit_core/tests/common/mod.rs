#![allow(dead_code)]

use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use audiosplit_core::{
    CancellationToken, EncodeSettings, MediaToolchain, PcmSlice, ProgressEvent, ToolchainError,
};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

/// Write interleaved 16-bit samples as a PCM RIFF file.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> io::Result<()> {
    let mut file = File::create(path)?;
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = (samples.len() * 2) as u32;

    file.write_all(b"RIFF")?;
    file.write_all(&(36u32 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?; // PCM header size
    file.write_all(&1u16.to_le_bytes())?; // audio format = PCM
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?; // bits per sample
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;

    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    file.write_all(&bytes)?;
    Ok(())
}

/// Generate a 440 Hz sine fixture so no binary assets live in the repository.
pub fn write_test_tone<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
) -> Result<(), Box<dyn Error>> {
    let frames = (sample_rate as u64 * duration_ms).div_ceil(1_000);
    let mut samples = Vec::with_capacity(frames as usize * channels as usize);

    for n in 0..frames {
        let theta = (n as f32 / sample_rate as f32) * 2.0 * std::f32::consts::PI * 440.0;
        let sample = (theta.sin() * i16::MAX as f32 * 0.5) as i16;
        for _ in 0..channels {
            samples.push(sample);
        }
    }

    write_wav(path.as_ref(), sample_rate, channels, &samples)?;
    Ok(())
}

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    Ok(names)
}

/// Paths of the files in `dir`, sorted.
pub fn files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    paths.sort();
    Ok(paths)
}

/// Assert the stream is non-decreasing progress followed by exactly one terminal event.
pub fn assert_well_formed(events: &[ProgressEvent]) {
    let (terminal, progress) = events.split_last().expect("at least one event");
    assert!(terminal.is_terminal(), "last event must be terminal: {terminal:?}");

    let mut last = 0;
    for event in progress {
        let percent = event
            .percent()
            .unwrap_or_else(|| panic!("terminal event before the end: {event:?}"));
        assert!(percent >= last, "percent went backwards: {events:?}");
        assert!(percent <= 100);
        last = percent;
    }
}

/// Scriptable stand-in for the external media toolchain.
///
/// Decoding copies the input verbatim, so fixtures must already be WAV files.
/// Encoding writes the received samples as a WAV file.
#[derive(Default)]
pub struct FakeToolchain {
    unavailable: bool,
    reject_input: bool,
    fail_on_encode: Option<usize>,
    panic_on_encode: Option<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
    gate: Option<Receiver<()>>,
    encodes: AtomicUsize,
    settings: Mutex<Vec<EncodeSettings>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behave as if the toolchain binary is missing.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Refuse to decode any input.
    pub fn rejecting() -> Self {
        Self {
            reject_input: true,
            ..Self::default()
        }
    }

    /// Fail the `call`-th encode (1-based).
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_encode = Some(call);
        self
    }

    /// Panic inside the `call`-th encode (1-based).
    pub fn panicking_on(mut self, call: usize) -> Self {
        self.panic_on_encode = Some(call);
        self
    }

    /// Cancel `token` once `call` encodes have finished.
    pub fn cancelling_after(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((call, token));
        self
    }

    /// Block every encode until a message arrives or the sender is dropped.
    pub fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn encode_count(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> Vec<EncodeSettings> {
        self.settings.lock().clone()
    }

    fn missing() -> ToolchainError {
        ToolchainError::Unavailable {
            program: "ffmpeg".into(),
            reason: "No such file or directory (os error 2)".into(),
        }
    }
}

impl MediaToolchain for FakeToolchain {
    fn version(&self) -> Result<String, ToolchainError> {
        if self.unavailable {
            return Err(Self::missing());
        }
        Ok("fake 1.0".into())
    }

    fn decode_to_wav(&self, input: &Path, dest: &Path) -> Result<(), ToolchainError> {
        if self.unavailable {
            return Err(Self::missing());
        }
        if self.reject_input {
            return Err(ToolchainError::Failed {
                program: "ffmpeg".into(),
                status: "exit code 1".into(),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        fs::copy(input, dest)?;
        Ok(())
    }

    fn encode(
        &self,
        pcm: PcmSlice<'_>,
        settings: &EncodeSettings,
        dest: &Path,
    ) -> Result<(), ToolchainError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }

        let call = self.encodes.fetch_add(1, Ordering::SeqCst) + 1;
        self.settings.lock().push(*settings);

        if self.panic_on_encode == Some(call) {
            panic!("encoder crashed on call {call}");
        }
        if self.fail_on_encode == Some(call) {
            fs::write(dest, b"truncated")?;
            return Err(ToolchainError::Failed {
                program: "ffmpeg".into(),
                status: "exit code 1".into(),
                stderr: "No space left on device".into(),
            });
        }

        write_wav(dest, pcm.sample_rate, pcm.channels, pcm.samples)?;

        if let Some((after, token)) = &self.cancel_after {
            if *after == call {
                token.cancel();
            }
        }
        Ok(())
    }
}
