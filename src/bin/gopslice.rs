use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use gopslice::{
    FfmpegLogLevel, MediaBackend, ProgressCallback, ProgressInfo, SegmentService,
    ServerConfiguration,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  gopslice --input-dir videos keyframes CoolVideo.mp4 --json\n  gopslice --input-dir videos --output-dir segments groups CoolVideo.mp4 --progress\n  gopslice --backend command fetch CoolVideo.mp4 3\n  gopslice --output-dir segments purge --older-than 600\n  gopslice completions zsh > _gopslice";

#[derive(Debug, Parser)]
#[command(
    name = "gopslice",
    version,
    about = "Slice videos into standalone groups of pictures at keyframe boundaries",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Linked FFmpeg libraries.
    #[default]
    Library,
    /// `ffprobe` and `ffmpeg` executables from PATH.
    Command,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Directory holding the source videos.
    #[arg(long, global = true, default_value = ".")]
    input_dir: PathBuf,

    /// Directory extracted segments are written to.
    #[arg(long, global = true, default_value = "segments")]
    output_dir: PathBuf,

    /// Media backend to probe and copy with.
    #[arg(long, global = true, value_enum, default_value_t = BackendKind::Library)]
    backend: BackendKind,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Time limit in seconds for each probe or copy (0 disables the limit).
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Force the container extension of extracted segments.
    #[arg(long, global = true)]
    extension: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract every group of pictures of a video.
    #[command(
        about = "Extract all groups of pictures",
        after_help = "Examples:\n  gopslice groups CoolVideo.mp4\n  gopslice groups CoolVideo.mp4 --json"
    )]
    Groups {
        /// Video file name inside the input directory.
        video: String,

        /// Output the groups as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the keyframes of a video.
    #[command(about = "List keyframes", visible_alias = "iframes")]
    Keyframes {
        /// Video file name inside the input directory.
        video: String,

        /// Output the keyframes as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract a single group of pictures.
    #[command(
        about = "Extract one group of pictures",
        after_help = "Examples:\n  gopslice fetch CoolVideo.mp4 0"
    )]
    Fetch {
        /// Video file name inside the input directory.
        video: String,

        /// Zero-based segment index.
        index: usize,

        /// Output the segment as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print group-size statistics.
    #[command(about = "Print group-of-pictures statistics")]
    Stats {
        /// Video file name inside the input directory.
        video: String,

        /// Output the statistics as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete extracted segments past their retention.
    #[command(about = "Purge expired segments")]
    Purge {
        /// Retention in seconds (default one hour).
        #[arg(long)]
        older_than: Option<u64>,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Forwards progress reports to an indicatif bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(segment) = info.current_segment {
            self.bar.set_message(format!("group {}", segment + 1));
        }
        if info.total.is_some_and(|total| info.current >= total) {
            self.bar.finish_with_message("done");
        }
    }
}

fn parse_log_level(value: &str) -> Result<FfmpegLogLevel, Box<dyn std::error::Error>> {
    value
        .parse::<FfmpegLogLevel>()
        .map_err(|_| format!("unsupported --log-level: {value}").into())
}

fn timeout_from_seconds(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

fn build_configuration(
    global: &GlobalOptions,
) -> Result<ServerConfiguration, Box<dyn std::error::Error>> {
    let mut configuration = ServerConfiguration::new(&global.input_dir, &global.output_dir);

    if let Some(level) = &global.log_level {
        let level = parse_log_level(level)?;
        gopslice::set_ffmpeg_log_level(level);
        configuration = configuration.with_ffmpeg_log_level(level);
    }
    if let Some(seconds) = global.timeout {
        configuration = configuration
            .with_probe_timeout(timeout_from_seconds(seconds))
            .with_extraction_timeout(timeout_from_seconds(seconds));
    }
    if let Some(extension) = &global.extension {
        configuration = configuration.with_output_extension(extension);
    }
    if global.progress {
        configuration = configuration.with_progress(Arc::new(BarProgress::new()?));
    }

    Ok(configuration)
}

fn execute<B: MediaBackend>(
    service: &SegmentService<B>,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Groups { video, json } => {
            let groups = service.list_groups(&video)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!(
                        "{:>4}  {:>12} - {:<12} frames {}..={}  {}",
                        group.display_index,
                        group.timestamp_begin.to_string(),
                        group.timestamp_end.to_string(),
                        group.span.start_frame,
                        group.span.end_frame,
                        group.output_path.display()
                    );
                }
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!("Extracted {} group(s) of {video}", groups.len()).green()
                );
            }
        }

        Commands::Keyframes { video, json } => {
            let index = service.keyframe_detail(&video)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&index)?);
            } else if index.is_empty() {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("no keyframes found in {video}").yellow()
                );
            } else {
                for record in &index {
                    println!(
                        "{:>8}  {:>12}  {}",
                        record.decode_index,
                        record.presentation_time.to_string(),
                        record.picture_type
                    );
                }
            }
        }

        Commands::Fetch { video, index, json } => {
            let segment = service.fetch_group(&video, index)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&segment)?);
            } else {
                println!(
                    "{} {} ({} frame(s), {} - {})",
                    "saved".green().bold(),
                    segment.path.display(),
                    segment.span.frame_count,
                    segment.timestamp_begin,
                    segment.timestamp_end
                );
            }
        }

        Commands::Stats { video, json } => {
            let statistics = service.statistics(&video)?;
            if json {
                let payload = json!({
                    "groups": statistics.group_sizes.len(),
                    "total_frames": statistics.total_frames,
                    "average_group_size": statistics.average_group_size,
                    "min_group_size": statistics.min_group_size,
                    "max_group_size": statistics.max_group_size,
                    "group_sizes": statistics.group_sizes,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Groups: {}", statistics.group_sizes.len());
                println!("Frames: {}", statistics.total_frames);
                println!(
                    "Group size: avg {:.2}, min {}, max {}",
                    statistics.average_group_size,
                    statistics.min_group_size,
                    statistics.max_group_size
                );
            }
        }

        Commands::Purge { .. } => {
            let removed = service.purge_expired()?;
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Removed {removed} expired segment(s)").green()
            );
        }

        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "gopslice", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut configuration = build_configuration(&cli.global)?;
    if let Commands::Purge {
        older_than: Some(seconds),
    } = cli.command
    {
        configuration = configuration.with_retention(Duration::from_secs(seconds));
    }

    match cli.global.backend {
        BackendKind::Library => execute(
            &SegmentService::with_library_backend(configuration),
            cli.command,
        ),
        BackendKind::Command => execute(
            &SegmentService::with_command_backend(configuration),
            cli.command,
        ),
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_level_aliases() {
        assert_eq!(parse_log_level("warn").unwrap(), FfmpegLogLevel::Warning);
        assert_eq!(parse_log_level("QUIET").unwrap(), FfmpegLogLevel::Quiet);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn zero_timeout_disables_the_limit() {
        assert_eq!(timeout_from_seconds(0), None);
        assert_eq!(timeout_from_seconds(30), Some(Duration::from_secs(30)));
    }

    #[test]
    fn parses_fetch_with_global_flags() {
        let cli = Cli::try_parse_from([
            "gopslice",
            "--input-dir",
            "videos",
            "fetch",
            "CoolVideo.mp4",
            "3",
            "--backend",
            "command",
        ])
        .unwrap();
        assert_eq!(cli.global.backend, BackendKind::Command);
        assert_eq!(cli.global.input_dir, PathBuf::from("videos"));
        assert!(matches!(
            cli.command,
            Commands::Fetch { index: 3, json: false, .. }
        ));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
