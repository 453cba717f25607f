//! Partitioning of a total duration into consecutive chunk windows, and the
//! file names those windows are written to.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::SplitJobConfig;
use crate::error::PlanError;

/// Upper bound on the number of chunks a single job may produce.
pub const MAX_CHUNKS: usize = 50_000;

/// Minimum number of digits used for the chunk number in file names.
pub const MIN_INDEX_WIDTH: usize = 2;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// One contiguous time range of the source, mapped to one output file.
///
/// The range is half-open: `start` is included, `end` is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkWindow {
    /// Zero-based position of the window.
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
}

impl ChunkWindow {
    /// One-based chunk number, as used in file names and progress messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// Number of windows needed to cover `total` with windows of `chunk_length`.
pub fn chunk_count(total: Duration, chunk_length: Duration) -> Result<usize, PlanError> {
    if chunk_length.is_zero() {
        return Err(PlanError::InvalidChunkLength);
    }

    let count = total.as_nanos().div_ceil(chunk_length.as_nanos());
    if count > MAX_CHUNKS as u128 {
        return Err(PlanError::TooManyChunks {
            count,
            limit: MAX_CHUNKS,
        });
    }

    Ok(count as usize)
}

/// Partition `[0, total)` into consecutive windows of `chunk_length`.
///
/// The last window is truncated at `total`. A zero `total` yields no windows.
pub fn plan(total: Duration, chunk_length: Duration) -> Result<Vec<ChunkWindow>, PlanError> {
    let count = chunk_count(total, chunk_length)?;

    let windows = (0..count)
        .map(|index| {
            // index < MAX_CHUNKS, and index * chunk_length < total, so neither overflows.
            let start = chunk_length * index as u32;
            let end = start
                .checked_add(chunk_length)
                .map_or(total, |end| end.min(total));
            ChunkWindow { index, start, end }
        })
        .collect();

    Ok(windows)
}

/// Make sure every window of `chunk_length` holds at least one frame at `sample_rate`.
pub fn check_resolution(chunk_length: Duration, sample_rate: u32) -> Result<(), PlanError> {
    if chunk_length.as_nanos() * u128::from(sample_rate) < NANOS_PER_SEC {
        return Err(PlanError::ChunkShorterThanFrame {
            chunk_length,
            sample_rate,
        });
    }
    Ok(())
}

/// Width of the zero-padded chunk number for a job producing `count` chunks.
pub fn index_width(count: usize) -> usize {
    num_width(count as u64).max(MIN_INDEX_WIDTH)
}

fn num_width(mut value: u64) -> usize {
    if value == 0 {
        return 1;
    }

    let mut width = 0;
    while value > 0 {
        value /= 10;
        width += 1;
    }
    width
}

/// File name of the chunk with the given 1-based `number` out of `count`.
pub fn chunk_file_name(
    stem: &str,
    postfix: &str,
    number: usize,
    count: usize,
    extension: &str,
) -> String {
    let width = index_width(count);
    format!("{stem}_{postfix}{number:0width$}.{extension}")
}

/// Output paths a job with this configuration writes for `count` chunks, in chunk order.
pub fn output_paths(config: &SplitJobConfig, count: usize) -> Vec<PathBuf> {
    let stem = config.source_stem();
    let extension = config.output_format.extension();

    (1..=count)
        .map(|number| {
            config
                .output_dir
                .join(chunk_file_name(&stem, &config.postfix, number, count, extension))
        })
        .collect()
}

/// Preview the files a job would produce for a source of `total` duration.
pub fn plan_outputs(config: &SplitJobConfig, total: Duration) -> Result<Vec<PathBuf>, PlanError> {
    let count = chunk_count(total, config.chunk_length)?;
    Ok(output_paths(config, count))
}
