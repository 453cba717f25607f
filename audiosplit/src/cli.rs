mod duration;

use std::path::PathBuf;
use std::time::Duration;

use audiosplit_core::DEFAULT_POSTFIX;
use clap::{builder::ValueParser, value_parser, Arg, ArgAction, ArgMatches, Command};

pub use self::duration::parse_duration;

pub const DEFAULT_LENGTH: &str = "90m";
pub const FFMPEG_ENV: &str = "AUDIOSPLIT_FFMPEG";

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Split an audio recording into consecutive fixed-length MP3 files")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("length")
                .short('l')
                .long("length")
                .value_name("DURATION")
                .help("Length of each chunk: minutes (90), units (1h30m, 45s) or a clock (1:30:00)")
                .default_value(DEFAULT_LENGTH)
                .value_parser(ValueParser::new(parse_duration)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Directory for the chunks [default: the input file's directory]")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("postfix")
                .short('p')
                .long("postfix")
                .value_name("POSTFIX")
                .help("Text between the file stem and the chunk number")
                .default_value(DEFAULT_POSTFIX),
        )
        .arg(
            Arg::new("no-preserve-quality")
                .long("no-preserve-quality")
                .help("Let the encoder pick its default bitrate instead of 320 kbps")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Replace chunk files that already exist in the output directory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print the files that would be written without encoding anything")
                .action(ArgAction::SetTrue)
                .conflicts_with("info"),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .help("Print the duration and size of the input file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ffmpeg")
                .long("ffmpeg")
                .value_name("PATH")
                .env(FFMPEG_ENV)
                .help("ffmpeg binary to use instead of the one on PATH")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("file_path")
                .value_name("FILE_PATH")
                .help("Path to the input audio file")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}

/// What the user asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Split,
    DryRun,
    Info,
}

/// Parsed command line.
#[derive(Clone, Debug)]
pub struct Options {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub length: Duration,
    pub postfix: String,
    pub preserve_quality: bool,
    pub overwrite: bool,
    pub ffmpeg: Option<PathBuf>,
    pub mode: Mode,
}

impl Options {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let mode = if matches.get_flag("info") {
            Mode::Info
        } else if matches.get_flag("dry-run") {
            Mode::DryRun
        } else {
            Mode::Split
        };

        Options {
            input: matches
                .get_one::<PathBuf>("file_path")
                .cloned()
                .unwrap_or_default(),
            output: matches.get_one::<PathBuf>("output").cloned(),
            length: matches
                .get_one::<Duration>("length")
                .copied()
                .unwrap_or(Duration::from_secs(90 * 60)),
            postfix: matches
                .get_one::<String>("postfix")
                .cloned()
                .unwrap_or_else(|| DEFAULT_POSTFIX.to_owned()),
            preserve_quality: !matches.get_flag("no-preserve-quality"),
            overwrite: matches.get_flag("overwrite"),
            ffmpeg: matches.get_one::<PathBuf>("ffmpeg").cloned(),
            mode,
        }
    }

    /// Output directory, falling back to the directory holding the input.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output {
            Some(dir) => dir.clone(),
            None => match self.input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }
}
