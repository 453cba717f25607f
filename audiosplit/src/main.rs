mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use audiosplit_core::{
    check_resolution, plan_outputs, Ffmpeg, MediaProbe, MediaToolchain, SplitJob, SplitJobConfig,
    SplitJobResult,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;

use crate::cli::{build_cli, Mode, Options};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();
    let options = Options::from_matches(&matches);

    if !options.input.is_file() {
        return Err(anyhow!(
            "input file does not exist: {}",
            options.input.display()
        ));
    }

    let toolchain = toolchain(options.ffmpeg.as_ref())?;
    debug!("media toolchain: {}", toolchain.version()?);

    match options.mode {
        Mode::Info => print_info(&options, toolchain.as_ref()),
        Mode::DryRun => dry_run(&options, toolchain.as_ref()),
        Mode::Split => split(&options, toolchain),
    }
}

fn toolchain(program: Option<&PathBuf>) -> anyhow::Result<Arc<dyn MediaToolchain>> {
    let ffmpeg = match program {
        Some(program) => Ffmpeg::with_program(program)
            .with_context(|| format!("cannot use ffmpeg at '{}'", program.display()))?,
        None => Ffmpeg::locate().context("ffmpeg is required to split audio")?,
    };
    debug!("using ffmpeg at '{}'", ffmpeg.program().display());
    Ok(Arc::new(ffmpeg))
}

fn job_config(options: &Options) -> SplitJobConfig {
    SplitJobConfig::builder(&options.input, options.output_dir(), options.length)
        .postfix(options.postfix.clone())
        .preserve_quality(options.preserve_quality)
        .overwrite(options.overwrite)
        .build()
}

fn print_info(options: &Options, toolchain: &dyn MediaToolchain) -> anyhow::Result<()> {
    let info = MediaProbe::new(toolchain)
        .probe(&options.input)
        .with_context(|| format!("failed to read '{}'", options.input.display()))?;

    println!("File:      {}", options.input.display());
    println!("Duration:  {}", info.duration_label());
    println!("Size:      {:.1} MB", info.size_megabytes());
    println!("Layout:    {} Hz, {} channel(s)", info.sample_rate, info.channels);
    Ok(())
}

fn dry_run(options: &Options, toolchain: &dyn MediaToolchain) -> anyhow::Result<()> {
    let config = job_config(options);
    config
        .validate()
        .with_context(|| format!("invalid settings for '{}'", options.input.display()))?;

    let info = MediaProbe::new(toolchain)
        .probe(&options.input)
        .with_context(|| format!("failed to read '{}'", options.input.display()))?;
    check_resolution(config.chunk_length, info.sample_rate)
        .with_context(|| format!("failed to plan chunks for '{}'", options.input.display()))?;
    let plan = plan_outputs(&config, info.duration)
        .with_context(|| format!("failed to plan chunks for '{}'", options.input.display()))?;

    if plan.is_empty() {
        println!("Dry run: no segments would be generated.");
    } else {
        println!("Dry run: would generate {} segment(s):", plan.len());
        for path in plan {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

fn split(options: &Options, toolchain: Arc<dyn MediaToolchain>) -> anyhow::Result<()> {
    let (handle, events) = SplitJob::start(job_config(options), toolchain);

    let progress = ProgressBar::new(100);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.enable_steady_tick(POLL_INTERVAL);

    loop {
        let event = match events.next_timeout(POLL_INTERVAL) {
            Some(event) => event,
            None if handle.is_finished() => match events.try_next() {
                Some(event) => event,
                None => break,
            },
            None => continue,
        };

        if let Some(percent) = event.percent() {
            progress.set_position(u64::from(percent));
        }
        progress.set_message(event.message().to_owned());
        if event.is_terminal() {
            break;
        }
    }
    progress.finish_and_clear();

    match handle.join() {
        SplitJobResult::Completed {
            file_count,
            file_paths,
        } => {
            println!("Created {file_count} file(s):");
            for path in file_paths {
                println!("  {}", path.display());
            }
            Ok(())
        }
        SplitJobResult::Cancelled => bail!("split of '{}' was cancelled", options.input.display()),
        SplitJobResult::Failed { reason } => Err(anyhow::Error::new(reason))
            .with_context(|| format!("failed to split '{}'", options.input.display())),
    }
}
