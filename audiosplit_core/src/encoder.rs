use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::OutputFormat;
use crate::error::{EncodeError, ToolchainError};
use crate::planner::ChunkWindow;
use crate::probe::SourceAudio;
use crate::toolchain::{EncodeSettings, MediaToolchain};

/// Writes one chunk window of a decoded source as an output file.
///
/// The chunk is encoded into a hidden `.partial` sibling of the destination
/// and renamed into place only once the encoder succeeded, so a destination
/// path either holds a complete chunk or does not exist.
pub struct ChunkEncoder<'a> {
    toolchain: &'a dyn MediaToolchain,
    settings: EncodeSettings,
}

impl<'a> ChunkEncoder<'a> {
    pub fn new(
        toolchain: &'a dyn MediaToolchain,
        format: OutputFormat,
        preserve_quality: bool,
    ) -> Self {
        Self {
            toolchain,
            settings: EncodeSettings::new(format, preserve_quality),
        }
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Encode `[window.start, window.end)` of `source` into `destination`.
    pub fn encode(
        &self,
        source: &SourceAudio,
        window: &ChunkWindow,
        destination: &Path,
    ) -> Result<(), EncodeError> {
        let pcm = source.slice(window);
        let partial = partial_path(destination);
        debug!(
            "encoding chunk {} ({:?}..{:?}, {} frames) to '{}'",
            window.number(),
            window.start,
            window.end,
            pcm.frames(),
            destination.display()
        );

        if let Err(err) = self.toolchain.encode(pcm, &self.settings, &partial) {
            discard(&partial);
            return Err(match err {
                ToolchainError::UnknownEncoder { encoder } => EncodeError::UnsupportedFormat(encoder),
                ToolchainError::Io(source) => EncodeError::Io {
                    path: destination.to_path_buf(),
                    source,
                },
                other => EncodeError::ToolchainFailure(other),
            });
        }

        fs::rename(&partial, destination).map_err(|source| {
            discard(&partial);
            EncodeError::Io {
                path: destination.to_path_buf(),
                source,
            }
        })
    }
}

/// Hidden sibling the encoder writes to before the chunk is complete.
pub fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.partial"))
}

fn discard(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            "failed to remove incomplete chunk '{}': {err}",
            partial.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::PcmSlice;
    use parking_lot::Mutex;
    use std::error::Error;
    use std::time::Duration;
    use tempfile::tempdir;

    enum Behaviour {
        Write,
        WriteThenFail,
        UnknownEncoder,
    }

    struct StubToolchain {
        behaviour: Behaviour,
        frames_seen: Mutex<Vec<usize>>,
        settings_seen: Mutex<Vec<EncodeSettings>>,
    }

    impl StubToolchain {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                frames_seen: Mutex::new(Vec::new()),
                settings_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MediaToolchain for StubToolchain {
        fn version(&self) -> Result<String, ToolchainError> {
            Ok("stub".into())
        }

        fn decode_to_wav(&self, _input: &Path, _dest: &Path) -> Result<(), ToolchainError> {
            unreachable!("the encoder never decodes")
        }

        fn encode(
            &self,
            pcm: PcmSlice<'_>,
            settings: &EncodeSettings,
            dest: &Path,
        ) -> Result<(), ToolchainError> {
            self.frames_seen.lock().push(pcm.frames());
            self.settings_seen.lock().push(*settings);
            match self.behaviour {
                Behaviour::Write => {
                    fs::write(dest, vec![0u8; pcm.samples.len()])?;
                    Ok(())
                }
                Behaviour::WriteThenFail => {
                    fs::write(dest, b"half")?;
                    Err(ToolchainError::Failed {
                        program: "stub".into(),
                        status: "exit code 1".into(),
                        stderr: "No space left on device".into(),
                    })
                }
                Behaviour::UnknownEncoder => Err(ToolchainError::UnknownEncoder {
                    encoder: settings.format.encoder().into(),
                }),
            }
        }
    }

    fn source() -> SourceAudio {
        SourceAudio::new(vec![0; 8_000], 1_000, 2)
    }

    fn window(index: usize, start_ms: u64, end_ms: u64) -> ChunkWindow {
        ChunkWindow {
            index,
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
        }
    }

    #[test]
    fn writes_only_the_window_and_renames_into_place() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let destination = dir.path().join("talk_part02.mp3");
        let toolchain = StubToolchain::new(Behaviour::Write);

        let encoder = ChunkEncoder::new(&toolchain, OutputFormat::Mp3, true);
        encoder.encode(&source(), &window(1, 1_000, 2_500), &destination)?;

        assert_eq!(*toolchain.frames_seen.lock(), vec![1_500]);
        assert_eq!(fs::metadata(&destination)?.len(), 3_000);
        assert!(!partial_path(&destination).exists());
        assert_eq!(toolchain.settings_seen.lock()[0].bitrate_kbps, Some(320));
        Ok(())
    }

    #[test]
    fn failed_encode_leaves_nothing_behind() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let destination = dir.path().join("talk_part01.mp3");
        let toolchain = StubToolchain::new(Behaviour::WriteThenFail);

        let encoder = ChunkEncoder::new(&toolchain, OutputFormat::Mp3, false);
        let err = encoder
            .encode(&source(), &window(0, 0, 1_000), &destination)
            .unwrap_err();

        assert!(matches!(err, EncodeError::ToolchainFailure(_)));
        assert!(err.to_string().contains("No space left"));
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
        assert_eq!(toolchain.settings_seen.lock()[0].bitrate_kbps, None);
        Ok(())
    }

    #[test]
    fn missing_encoder_is_unsupported_format() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let toolchain = StubToolchain::new(Behaviour::UnknownEncoder);
        let encoder = ChunkEncoder::new(&toolchain, OutputFormat::Mp3, true);

        let err = encoder
            .encode(&source(), &window(0, 0, 500), &dir.path().join("a_part01.mp3"))
            .unwrap_err();
        assert!(matches!(err, EncodeError::UnsupportedFormat(name) if name == "libmp3lame"));
        Ok(())
    }

    #[test]
    fn unwritable_destination_is_io_failure() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let destination = dir.path().join("missing").join("a_part01.mp3");
        let toolchain = StubToolchain::new(Behaviour::Write);
        let encoder = ChunkEncoder::new(&toolchain, OutputFormat::Mp3, true);

        let err = encoder
            .encode(&source(), &window(0, 0, 500), &destination)
            .unwrap_err();
        assert!(matches!(err, EncodeError::Io { path, .. } if path == destination));
        Ok(())
    }

    #[test]
    fn partial_path_is_a_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/talk_part01.mp3")),
            PathBuf::from("/out/.talk_part01.mp3.partial")
        );
    }
}
