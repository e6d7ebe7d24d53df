//! FFmpeg Detection
//!
//! Resolves the `ffmpeg`/`ffprobe` binaries. Search order: an explicit
//! directory (argument or `DUALSUB_FFMPEG_DIR`), common install locations for
//! the platform, then `which`/`where`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::{FFmpegError, FFmpegResult};

/// Environment variable naming a directory that holds both binaries
pub const FFMPEG_DIR_ENV: &str = "DUALSUB_FFMPEG_DIR";

/// Information about a detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Version string, e.g. "6.1.1"
    pub version: String,
}

/// Detects FFmpeg, preferring `preferred_dir` when given
pub fn detect_ffmpeg(preferred_dir: Option<&Path>) -> FFmpegResult<FFmpegInfo> {
    let mut search = Vec::new();
    if let Some(dir) = preferred_dir {
        search.push(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(FFMPEG_DIR_ENV) {
        search.push(PathBuf::from(dir));
    }
    search.extend(get_common_ffmpeg_paths());

    let ffmpeg_path = find_binary("ffmpeg", &search)?;
    let ffprobe_path = find_binary("ffprobe", &search)?;
    let version = get_ffmpeg_version(&ffmpeg_path)?;

    debug!(
        "Using FFmpeg {} at {}",
        version,
        ffmpeg_path.display()
    );

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
    })
}

/// Detects FFmpeg from the environment and system locations only
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    detect_ffmpeg(None)
}

fn binary_file_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

fn find_binary(name: &str, search: &[PathBuf]) -> FFmpegResult<PathBuf> {
    let file_name = binary_file_name(name);
    if let Some(found) = search
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
    {
        return Ok(found);
    }

    let locator = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };
    let output = Command::new(locator)
        .arg(name)
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            return Ok(PathBuf::from(first_line));
        }
    }

    Err(FFmpegError::NotFound)
}

/// Common FFmpeg installation directories for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        // Chocolatey
        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }

        // Scoop
        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(userprofile).join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin")); // MacPorts
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "FFmpeg binary is not functional".to_string(),
        ));
    }

    parse_version_line(&String::from_utf8_lossy(&output.stdout))
}

/// Extracts the version from `ffmpeg -version` output
fn parse_version_line(output: &str) -> FFmpegResult<String> {
    let first_line = output
        .lines()
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| FFmpegError::ParseError("Empty FFmpeg version output".to_string()))?;

    Ok(first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(first_line)
        .to_string())
}
