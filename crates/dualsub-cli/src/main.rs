//! dualsub command line
//!
//! Headless front end for the caption engine: normalize transcripts, write
//! caption files, query the active caption at given times and burn captions
//! into a video.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use dualsub_lib::core::captions::{
    export_bilingual_vtt, export_srt, load_transcript, parse_bilingual_srt, CaptionSegment,
    PlaybackSessions, SegmentStore, SharedSegmentStore, ViewMode,
};
use dualsub_lib::core::ffmpeg::create_ffmpeg_state;
use dualsub_lib::core::fs::{atomic_write_bytes, prepare_output_path, validate_input_file};
use dualsub_lib::core::render::{
    CaptionRenderer, CaptureGraphBuilder, ExportFormat, ExportProgress, ExportRequest,
    ExportResponse, ExportService, FontSet,
};
use dualsub_lib::core::settings::{AppSettings, SettingsManager};

#[derive(Parser, Debug)]
#[command(name = "dualsub", author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write daily-rolling logs into this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Settings directory (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse and normalize a transcript, printing the segment list as JSON
    Normalize {
        /// Transcript JSON or bilingual SRT
        transcript: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a bilingual caption file
    Srt {
        transcript: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write WebVTT instead of SRT
        #[arg(long)]
        vtt: bool,
    },

    /// Print the caption active at each time (seconds)
    Locate {
        transcript: PathBuf,
        #[arg(required = true, allow_negative_numbers = true)]
        times: Vec<f64>,
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Burn captions into a video
    Burn(BurnArgs),
}

#[derive(Args, Debug)]
struct BurnArgs {
    video: PathBuf,
    transcript: PathBuf,

    /// Output file, or a directory to receive `{name}_captioned.{ext}`
    #[arg(short, long)]
    output: PathBuf,

    /// mp4 or webm
    #[arg(long)]
    format: Option<ExportFormat>,

    /// dual, primary-only, secondary-only or off
    #[arg(long)]
    view_mode: Option<ViewMode>,

    #[arg(long, value_name = "PX")]
    primary_size: Option<f32>,

    #[arg(long, value_name = "PX")]
    secondary_size: Option<f32>,

    /// Caption anchor height as a percentage of the frame, from the bottom
    #[arg(long, value_name = "PERCENT")]
    position: Option<f32>,

    #[arg(long, value_name = "FILE")]
    primary_font: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    secondary_font: Option<PathBuf>,

    /// Directory containing ffmpeg and ffprobe
    #[arg(long, value_name = "DIR")]
    ffmpeg_dir: Option<PathBuf>,

    /// Pace the export at the capture frame rate
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    dualsub_lib::init_logging(level, cli.log_dir.as_deref());

    match cli.command {
        Commands::Normalize { transcript, output } => {
            let store = load_segments(&transcript)?;
            let mut json = serde_json::to_string_pretty(store.segments())?;
            json.push('\n');
            emit(output.as_deref(), json.as_bytes())
        }
        Commands::Srt {
            transcript,
            output,
            vtt,
        } => {
            let store = load_segments(&transcript)?;
            let text = if vtt {
                export_bilingual_vtt(store.segments())
            } else {
                export_srt(store.segments())
            };
            emit(output.as_deref(), text.as_bytes())
        }
        Commands::Locate {
            transcript,
            times,
            json,
        } => locate(&transcript, &times, json),
        Commands::Burn(args) => {
            let settings = load_settings(cli.config_dir);
            burn(args, &settings).await
        }
    }
}

/// Loads a transcript (JSON, or SRT by extension) into a normalized store
fn load_segments(path: &Path) -> anyhow::Result<SegmentStore> {
    let path = validate_input_file(path, "transcript")?;
    let is_srt = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"));

    let raw = if is_srt {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        parse_bilingual_srt(&content)?
    } else {
        load_transcript(&path)?
    };

    let store = SegmentStore::from_raw(raw);
    info!("Loaded {} segments from {}", store.len(), path.display());
    Ok(store)
}

fn emit(output: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let path = prepare_output_path(path, "output")?;
            atomic_write_bytes(&path, bytes)?;
            info!("Wrote {}", path.display());
        }
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocateRow {
    time: f64,
    segment: Option<CaptionSegment>,
}

fn locate(transcript: &Path, times: &[f64], json: bool) -> anyhow::Result<()> {
    let shared = SharedSegmentStore::new(load_segments(transcript)?);
    let rows = locate_all(&shared, times)?;

    let mut stdout = std::io::stdout().lock();
    for row in &rows {
        if json {
            writeln!(stdout, "{}", serde_json::to_string(row)?)?;
        } else {
            writeln!(stdout, "{}", describe(row.time, row.segment.as_ref()))?;
        }
    }
    Ok(())
}

/// Runs one playback session over the current generation, in the given time order
fn locate_all(shared: &SharedSegmentStore, times: &[f64]) -> anyhow::Result<Vec<LocateRow>> {
    let mut sessions = PlaybackSessions::new();
    let session = sessions.open(shared.snapshot());

    let rows = times
        .iter()
        .map(|&time| {
            let segment = sessions.locate(&session, time)?;
            Ok(LocateRow { time, segment })
        })
        .collect::<anyhow::Result<Vec<_>>>();

    sessions.close(&session)?;
    rows
}

fn describe(time: f64, segment: Option<&CaptionSegment>) -> String {
    match segment {
        Some(s) => format!(
            "{:>9.3}  [{:.3} → {:.3}]  {} | {}",
            time, s.start_time, s.end_time, s.primary_text, s.secondary_text
        ),
        None => format!("{:>9.3}  -", time),
    }
}

fn load_settings(config_dir: Option<PathBuf>) -> AppSettings {
    config_dir
        .map(SettingsManager::new)
        .or_else(SettingsManager::default_location)
        .map(|manager| manager.load())
        .unwrap_or_default()
}

async fn burn(args: BurnArgs, settings: &AppSettings) -> anyhow::Result<()> {
    let video = validate_input_file(&args.video, "video")?;
    let segments = Arc::new(load_segments(&args.transcript)?);

    let mut style = settings.style.to_style_config();
    if let Some(px) = args.primary_size {
        style.primary_size_px = px;
    }
    if let Some(px) = args.secondary_size {
        style.secondary_size_px = px;
    }
    if let Some(percent) = args.position {
        style.vertical_position_percent = percent.clamp(0.0, 90.0);
    }

    let primary_font = args.primary_font.or_else(|| settings.fonts.primary_font.clone());
    let secondary_font = args
        .secondary_font
        .or_else(|| settings.fonts.secondary_font.clone());
    let fonts = FontSet::discover(primary_font.as_deref(), secondary_font.as_deref())?;

    let mut limits = settings.export.limits();
    limits.realtime |= args.realtime;

    let state = create_ffmpeg_state();
    let backend = CaptureGraphBuilder::from_state(&state, args.ffmpeg_dir.as_deref()).await?;
    let service = Arc::new(ExportService::new(
        backend,
        CaptionRenderer::new(fonts),
        limits,
    ));

    let request = ExportRequest {
        source: video.clone(),
        segments,
        style,
        view_mode: args.view_mode.unwrap_or_else(|| settings.playback.view_mode()),
        format: args.format.unwrap_or_else(|| settings.export.format()),
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel::<ExportProgress>(64);
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            eprint!("\r{}", progress_line(&progress));
        }
        eprintln!();
    });

    let interrupt = {
        let service = service.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                service.cancel_active();
            }
        })
    };

    let response = service.export(&request, Some(tx)).await;
    interrupt.abort();
    let _ = printer.await;

    match response? {
        ExportResponse::Ready { entry, from_cache } => {
            let path = resolve_output_path(&args.output, &entry.suggested_file_name)?;
            atomic_write_bytes(&path, &entry.artifact_bytes)?;
            println!(
                "{} ({} bytes, {}){}",
                path.display(),
                entry.artifact_bytes.len(),
                entry.mime,
                if from_cache { " [cached]" } else { "" }
            );
            Ok(())
        }
        ExportResponse::Cancelled => bail!("export cancelled"),
    }
}

fn progress_line(progress: &ExportProgress) -> String {
    let eta = progress
        .eta_seconds
        .map(|s| format!("ETA {:.0}s", s.max(0.0)))
        .unwrap_or_else(|| "ETA --".to_string());
    format!(
        "{:<10} {:>5.1}%  frame {:<6} {}",
        progress.status, progress.percent, progress.frame, eta
    )
}

/// Where the artifact goes
///
/// A directory receives the suggested file name. A file path keeps its name
/// but takes the extension of the container actually produced.
fn resolve_output_path(output: &Path, suggested: &str) -> anyhow::Result<PathBuf> {
    if output.is_dir() {
        return Ok(output.join(suggested));
    }

    let produced = Path::new(suggested).extension().unwrap_or_default();
    let mut path = output.to_path_buf();
    if path.extension() != Some(produced) {
        if path.extension().is_some() {
            warn!(
                "Output container is {}, renaming {}",
                produced.to_string_lossy(),
                path.display()
            );
        }
        path.set_extension(produced);
    }
    Ok(prepare_output_path(&path, "output")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualsub_lib::core::render::ExportStatus;

    // -------------------------------------------------------------------------
    // Argument Parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_burn_arguments_parse() {
        let cli = Cli::try_parse_from([
            "dualsub",
            "burn",
            "talk.mp4",
            "talk.json",
            "-o",
            "out.mp4",
            "--format",
            "webm",
            "--view-mode",
            "primary-only",
            "--primary-size",
            "40",
        ])
        .unwrap();

        let Commands::Burn(args) = cli.command else {
            panic!("expected burn");
        };
        assert_eq!(args.format, Some(ExportFormat::Webm));
        assert_eq!(args.view_mode, Some(ViewMode::PrimaryOnly));
        assert_eq!(args.primary_size, Some(40.0));
        assert!(!args.realtime);
    }

    #[test]
    fn test_locate_requires_times() {
        assert!(Cli::try_parse_from(["dualsub", "locate", "t.json"]).is_err());
        assert!(Cli::try_parse_from(["dualsub", "locate", "t.json", "1.5", "-2"]).is_ok());
        assert!(Cli::try_parse_from(["dualsub", "burn", "a.mp4", "t.json", "-o", "x", "--format", "gif"]).is_err());
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_load_segments_normalizes_json_and_srt() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("talk.json");
        std::fs::write(
            &json,
            r#"[{"startTime":1.5,"endTime":3,"primaryText":"B","secondaryText":"乙"},
                {"startTime":0,"endTime":2,"primaryText":"A","secondaryText":"甲"}]"#,
        )
        .unwrap();

        let store = load_segments(&json).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.segments()[0].end_time, 1.5);

        let srt = dir.path().join("talk.SRT");
        std::fs::write(&srt, export_srt(store.segments())).unwrap();
        let reloaded = load_segments(&srt).unwrap();
        assert_eq!(reloaded.segments(), store.segments());
    }

    #[test]
    fn test_locate_all_handles_backward_seeks() {
        let shared = SharedSegmentStore::new(SegmentStore::from_raw(vec![
            CaptionSegment::new(0.0, 1.0, "A", "甲"),
            CaptionSegment::new(2.0, 3.0, "B", "乙"),
        ]));

        let rows = locate_all(&shared, &[2.5, 0.5, 1.5, 2.0]).unwrap();
        let texts: Vec<Option<&str>> = rows
            .iter()
            .map(|r| r.segment.as_ref().map(|s| s.primary_text.as_str()))
            .collect();
        assert_eq!(texts, vec![Some("B"), Some("A"), None, Some("B")]);
    }

    #[test]
    fn test_resolve_output_path() {
        let dir = tempfile::tempdir().unwrap();

        let into_dir = resolve_output_path(dir.path(), "talk_captioned.webm").unwrap();
        assert_eq!(into_dir, dir.path().join("talk_captioned.webm"));

        let renamed = resolve_output_path(&dir.path().join("out.mp4"), "talk_captioned.webm").unwrap();
        assert_eq!(renamed, dir.path().join("out.webm"));

        let kept = resolve_output_path(&dir.path().join("out.mp4"), "talk_captioned.mp4").unwrap();
        assert_eq!(kept, dir.path().join("out.mp4"));
    }

    #[test]
    fn test_describe_and_progress_line() {
        let seg = CaptionSegment::new(1.0, 2.5, "Hello", "你好");
        assert!(describe(1.25, Some(&seg)).ends_with("Hello | 你好"));
        assert!(describe(9.0, None).ends_with('-'));

        let line = progress_line(&ExportProgress {
            job_id: "job".to_string(),
            status: ExportStatus::Recording,
            frame: 12,
            percent: 42.0,
            eta_seconds: None,
        });
        assert!(line.starts_with("recording   42.0%"), "{line:?}");
        assert!(line.contains("ETA --"));
    }
}
