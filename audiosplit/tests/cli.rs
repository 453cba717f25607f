use assert_cmd::Command;
use std::error::Error;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::tempdir;

/// Write `duration_ms` of a mono 440 Hz tone as 16-bit PCM WAV.
fn write_tone(path: &Path, sample_rate: u32, duration_ms: u64) -> io::Result<()> {
    let frames = (u64::from(sample_rate) * duration_ms).div_ceil(1_000) as u32;
    let step = std::f32::consts::TAU * 440.0 / sample_rate as f32;
    let pcm: Vec<u8> = (0..frames)
        .map(|n| ((n as f32 * step).sin() * 16_000.0) as i16)
        .flat_map(i16::to_le_bytes)
        .collect();

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    for field in [16u32, 1 | (1 << 16), sample_rate, sample_rate * 2, 2 | (16 << 16)] {
        header.extend_from_slice(&field.to_le_bytes());
    }
    header.extend_from_slice(b"data");
    header.extend_from_slice(&(pcm.len() as u32).to_le_bytes());

    fs::write(path, [header, pcm].concat())
}

fn audiosplit() -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("audiosplit")?;
    cmd.env_remove("AUDIOSPLIT_FFMPEG");
    Ok(cmd)
}

/// End-to-end runs need a real ffmpeg build.
fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn stderr_of(cmd: &mut Command) -> String {
    let assert = cmd.assert().failure();
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}

#[test]
fn cli_reports_missing_input_file() -> Result<(), Box<dyn Error>> {
    let output_dir = tempdir()?;

    let mut cmd = audiosplit()?;
    cmd.args(["--length", "400ms", "--output"])
        .arg(output_dir.path())
        .arg("missing.wav");

    let stderr = stderr_of(&mut cmd);
    assert!(stderr.contains("input file does not exist"), "{stderr}");
    assert!(fs::read_dir(output_dir.path())?.next().is_none());
    Ok(())
}

#[test]
fn cli_reports_unusable_ffmpeg() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_tone(&input_path, 8_000, 200)?;
    let bogus = work_dir.path().join("no-such-ffmpeg");

    let mut cmd = audiosplit()?;
    cmd.arg("--ffmpeg").arg(&bogus).arg(&input_path);

    let stderr = stderr_of(&mut cmd);
    assert!(stderr.contains("could not be executed"), "{stderr}");
    assert!(stderr.contains("install FFmpeg"), "{stderr}");
    Ok(())
}

#[test]
fn cli_reads_ffmpeg_from_environment() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_tone(&input_path, 8_000, 200)?;

    let mut cmd = audiosplit()?;
    cmd.env("AUDIOSPLIT_FFMPEG", work_dir.path().join("missing-ffmpeg"))
        .arg(&input_path);

    let stderr = stderr_of(&mut cmd);
    assert!(stderr.contains("missing-ffmpeg"), "{stderr}");
    Ok(())
}

#[test]
fn cli_rejects_invalid_lengths() -> Result<(), Box<dyn Error>> {
    for (length, expected) in [
        ("5x", "unknown unit"),
        ("0", "greater than zero"),
        ("1:75", "invalid clock value"),
    ] {
        let mut cmd = audiosplit()?;
        cmd.args(["--length", length, "input.wav"]);
        let stderr = stderr_of(&mut cmd);
        assert!(stderr.contains(expected), "{length}: {stderr}");
    }
    Ok(())
}

#[test]
fn cli_help_lists_options() -> Result<(), Box<dyn Error>> {
    let assert = audiosplit()?.arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for flag in [
        "--length",
        "--output",
        "--postfix",
        "--no-preserve-quality",
        "--dry-run",
        "--info",
    ] {
        assert!(stdout.contains(flag), "missing {flag} in help");
    }
    Ok(())
}

#[test]
fn cli_dry_run_prints_plan_without_creating_files() -> Result<(), Box<dyn Error>> {
    if !ffmpeg_available() {
        eprintln!("skipping: ffmpeg not found");
        return Ok(());
    }

    let input_dir = tempdir()?;
    let input_path = input_dir.path().join("input.wav");
    write_tone(&input_path, 44_100, 1_100)?;
    let output_dir = tempdir()?;

    let assert = audiosplit()?
        .args(["--length", "400ms", "--dry-run", "--output"])
        .arg(output_dir.path())
        .arg(&input_path)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("Dry run: would generate 3 segment(s):"), "{stdout}");
    for name in ["input_part01.mp3", "input_part02.mp3", "input_part03.mp3"] {
        let needle = format!("  {}", output_dir.path().join(name).display());
        assert!(stdout.contains(&needle), "missing dry-run entry for {needle}");
    }
    assert!(fs::read_dir(output_dir.path())?.next().is_none());
    Ok(())
}

#[test]
fn cli_splits_audio_into_chunks_with_remainder() -> Result<(), Box<dyn Error>> {
    if !ffmpeg_available() {
        eprintln!("skipping: ffmpeg not found");
        return Ok(());
    }

    let input_dir = tempdir()?;
    let input_path = input_dir.path().join("input.wav");
    write_tone(&input_path, 44_100, 1_100)?;
    let output_dir = tempdir()?;

    audiosplit()?
        .args(["--length", "400ms", "--output"])
        .arg(output_dir.path())
        .arg(&input_path)
        .assert()
        .success();

    let mut names: Vec<String> = fs::read_dir(output_dir.path())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert_eq!(
        names,
        ["input_part01.mp3", "input_part02.mp3", "input_part03.mp3"]
    );

    let second = audiosplit()?
        .args(["--length", "400ms", "--output"])
        .arg(output_dir.path())
        .arg(&input_path)
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&second.get_output().stderr).into_owned();
    assert!(stderr.contains("already exists"), "{stderr}");
    Ok(())
}
