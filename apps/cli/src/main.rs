use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tracing_subscriber::EnvFilter;

use framespeak_core::{
    BatchOutcome, BatchSummary, DescriptionProvider, FfmpegDecoder, FrameCapture, FsStore,
    HttpProvider, ProviderConfig, ProviderKind, SamplingPlan, VideoLibrary,
    capture::SamplingSchedule, export_markdown, format_timestamp, is_unparsed,
    types::DEFAULT_MAX_FRAMES,
};

use crate::{
    config::{ConfigUpdate, load_config, redacted, save_config},
    paths::{get_config_path, get_db_dir, get_frame_file_name, get_root_data_dir},
};

mod config;
mod paths;

type Library = VideoLibrary<FfmpegDecoder, FsStore>;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for ProviderKind (needed for clap ValueEnum)
#[derive(Clone, ValueEnum)]
enum CliProvider {
    Ollama,
    Openai,
    Lmstudio,
    Custom,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Ollama => ProviderKind::Ollama,
            CliProvider::Openai => ProviderKind::Openai,
            CliProvider::Lmstudio => ProviderKind::Lmstudio,
            CliProvider::Custom => ProviderKind::Custom,
        }
    }
}

#[derive(Parser)]
#[command(name = "framespeak")]
#[command(about = "Sample video frames and describe them as bilingual image-generation prompts")]
struct Cli {
    /// Where videos and frames are kept
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Provider configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample frames from a video file
    Extract {
        video: PathBuf,

        /// Seconds between frames (3, 5 or 10)
        #[arg(short, long, default_value_t = 5)]
        interval: u32,

        #[arg(short, long, default_value_t = DEFAULT_MAX_FRAMES)]
        max_frames: usize,

        /// Also write each frame as a JPEG into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Describe every frame right after extraction
        #[arg(short, long)]
        analyze: bool,

        /// Write the markdown export here after analysis
        #[arg(long, requires = "analyze")]
        export: Option<PathBuf>,
    },

    /// Describe the frames of a stored video
    Analyze {
        video_id: String,

        /// Analyze a single frame, even if it already has a description
        #[arg(short, long)]
        frame: Option<String>,
    },

    /// Print or save the descriptions of a stored video as markdown
    Export {
        video_id: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored videos
    List,

    /// Delete a stored video and its frames
    Delete { video_id: String },

    /// Delete every stored video
    Clear,

    /// Check that the configured provider is reachable
    TestConnection,

    /// Show or change the provider configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(short, long)]
        provider: Option<CliProvider>,

        #[arg(short, long)]
        endpoint: Option<String>,

        #[arg(short, long)]
        model: Option<String>,

        /// Empty string clears the key
        #[arg(long)]
        api_key: Option<String>,

        #[arg(short, long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Custom analysis prompt, empty string restores the default
        #[arg(long)]
        prompt: Option<String>,
    },
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .expect("valid spinner template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn create_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:30.cyan/blue}] {pos}/{len}")
            .expect("valid bar template")
            .progress_chars("=> "),
    );
    pb.set_message(msg.to_string());
    pb
}

fn open_library(data_dir: &Path) -> Library {
    VideoLibrary::new(
        FrameCapture::new(FfmpegDecoder::new()),
        FsStore::new(get_db_dir(data_dir)),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(get_root_data_dir);
    let config_path = cli.config.unwrap_or_else(get_config_path);

    let result = match cli.command {
        Command::Extract {
            video,
            interval,
            max_frames,
            output_dir,
            analyze,
            export,
        } => {
            let plan = SamplingPlan::new(interval, max_frames)?;
            let config = if analyze {
                Some(load_config(&config_path).await?)
            } else {
                None
            };
            extract(
                &data_dir,
                &video,
                &plan,
                output_dir.as_deref(),
                config.as_ref(),
                export.as_deref(),
            )
            .await
        }
        Command::Analyze { video_id, frame } => {
            let config = load_config(&config_path).await?;
            analyze(&data_dir, &video_id, frame.as_deref(), &config).await
        }
        Command::Export { video_id, output } => {
            export_video(&data_dir, &video_id, output.as_deref()).await
        }
        Command::List => list(&data_dir).await,
        Command::Delete { video_id } => delete(&data_dir, &video_id).await,
        Command::Clear => clear(&data_dir).await,
        Command::TestConnection => {
            let config = load_config(&config_path).await?;
            test_connection(&config).await
        }
        Command::Config { action } => configure(&config_path, action).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn extract(
    data_dir: &Path,
    video: &Path,
    plan: &SamplingPlan,
    output_dir: Option<&Path>,
    analyze_with: Option<&ProviderConfig>,
    export: Option<&Path>,
) -> Result<()> {
    let start = Instant::now();
    let mut library = open_library(data_dir);

    println!(
        "\n{}  {}\n",
        style("framespeak").cyan().bold(),
        style("Frame Extractor").dim()
    );

    let spinner = create_spinner("Reading video...");
    let info = library.load_video(video).await?;
    spinner.finish_with_message(format!(
        "{} Loaded: {} ({}, {}x{})",
        style("✓").green().bold(),
        style(&info.name).dim(),
        format_timestamp(info.duration),
        info.width,
        info.height
    ));

    let total = SamplingSchedule::new(info.duration, plan).remaining();
    let bar = create_bar(total as u64, "Extracting frames");
    let frames = library
        .extract_frames(plan, |_, _| bar.inc(1))
        .await?;
    bar.finish_and_clear();
    println!(
        "{} Extracted {} frames every {}s",
        style("✓").green().bold(),
        frames.len(),
        plan.interval_seconds()
    );

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir).await?;
        for (index, frame) in frames.iter().enumerate() {
            if let Some(image) = &frame.image {
                fs::write(dir.join(get_frame_file_name(index, frame.timestamp)), image).await?;
            }
        }
        println!(
            "{} Frames written to {}",
            style("✓").green().bold(),
            style(dir.display()).dim()
        );
    }

    if let Some(config) = analyze_with {
        run_analysis(&mut library, config).await?;
        if let Some(path) = export {
            write_export(&library, Some(path)).await?;
        }
    }

    let video_id = library
        .current_video()
        .map(|v| v.id.clone())
        .unwrap_or_default();
    println!(
        "\n{} {}  {}\n",
        style("Video id:").bold(),
        style(video_id).yellow(),
        style(format_duration(start.elapsed())).dim()
    );
    Ok(())
}

async fn run_analysis(library: &mut Library, config: &ProviderConfig) -> Result<BatchSummary> {
    let pending = library.frames().iter().filter(|f| f.is_pending()).count();
    let bar = create_bar(
        pending as u64,
        &format!("Analyzing with {} ({})", config.kind.name(), config.model),
    );
    let provider = HttpProvider::new();
    let summary = library
        .analyze_all(&provider, config, |progress| bar.set_position(progress.completed as u64))
        .await?;
    bar.finish_and_clear();

    match summary.outcome() {
        BatchOutcome::Empty => println!("{} Nothing to analyze", style("•").dim()),
        BatchOutcome::AllSucceeded => println!(
            "{} Analyzed {} frames",
            style("✓").green().bold(),
            summary.success_count
        ),
        BatchOutcome::AllFailed => println!(
            "{} All {} frames failed, run with RUST_LOG=warn for details",
            style("✗").red().bold(),
            summary.failure_count
        ),
        BatchOutcome::Mixed => println!(
            "{} {} analyzed, {} failed",
            style("!").yellow().bold(),
            summary.success_count,
            summary.failure_count
        ),
    }

    let degraded = library
        .frames()
        .iter()
        .filter_map(|f| f.description())
        .filter(|d| is_unparsed(d))
        .count();
    if degraded > 0 {
        println!(
            "{} {} descriptions could not be split into English and Chinese",
            style("!").yellow().bold(),
            degraded
        );
    }
    Ok(summary)
}

async fn analyze(
    data_dir: &Path,
    video_id: &str,
    frame_id: Option<&str>,
    config: &ProviderConfig,
) -> Result<()> {
    let mut library = open_library(data_dir);
    library.open_video(video_id).await?;

    let Some(frame_id) = frame_id else {
        run_analysis(&mut library, config).await?;
        return Ok(());
    };

    let timestamp = library
        .frame(frame_id)
        .map(|f| f.timestamp)
        .with_context(|| format!("Frame {frame_id} not found in video {video_id}"))?;
    let spinner = create_spinner(&format!("Analyzing frame at {}...", format_timestamp(timestamp)));
    match library.analyze_frame(frame_id, &HttpProvider::new(), config).await {
        Ok(description) => {
            spinner.finish_with_message(format!("{} Frame analyzed", style("✓").green().bold()));
            println!("\n{}\n{}\n", style("English:").bold(), description.en);
            println!("{}\n{}\n", style("中文:").bold(), description.zh);
            Ok(())
        }
        Err(e) => {
            spinner.finish_with_message(format!("{} Analysis failed", style("✗").red().bold()));
            Err(e.into())
        }
    }
}

async fn write_export(library: &Library, output: Option<&Path>) -> Result<()> {
    let Some(text) = export_markdown(library.frames()) else {
        bail!("No analyzed frames to export");
    };
    match output {
        Some(path) => {
            fs::write(path, text).await?;
            println!(
                "{} Exported to {}",
                style("✓").green().bold(),
                style(path.display()).dim()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

async fn export_video(data_dir: &Path, video_id: &str, output: Option<&Path>) -> Result<()> {
    let mut library = open_library(data_dir);
    library.open_video(video_id).await?;
    write_export(&library, output).await
}

async fn list(data_dir: &Path) -> Result<()> {
    let library = open_library(data_dir);
    let videos = library.catalog().all_videos().await?;
    if videos.is_empty() {
        println!("No stored videos");
        return Ok(());
    }

    for video in videos {
        let frames = library.catalog().video_frames(&video.id).await?;
        let analyzed = frames.iter().filter(|f| f.description.is_some()).count();
        println!(
            "{}  {}  {}  {}/{} analyzed",
            style(&video.id).yellow(),
            video.name,
            style(format_timestamp(video.duration)).dim(),
            analyzed,
            frames.len()
        );
    }
    Ok(())
}

async fn delete(data_dir: &Path, video_id: &str) -> Result<()> {
    let library = open_library(data_dir);
    if library.catalog().get_video_info(video_id).await?.is_none() {
        bail!("Video {video_id} not found");
    }
    library.catalog().delete_video(video_id).await?;
    println!("{} Deleted {}", style("✓").green().bold(), video_id);
    Ok(())
}

async fn clear(data_dir: &Path) -> Result<()> {
    let library = open_library(data_dir);
    library.catalog().clear_all().await?;
    println!("{} Cleared all stored videos", style("✓").green().bold());
    Ok(())
}

async fn test_connection(config: &ProviderConfig) -> Result<()> {
    config.validate()?;
    let spinner = create_spinner(&format!(
        "Connecting to {} at {}...",
        config.kind.name(),
        config.endpoint
    ));
    match HttpProvider::new().test_connection(config).await {
        Ok(true) => {
            spinner.finish_with_message(format!(
                "{} {} is reachable",
                style("✓").green().bold(),
                config.kind.name()
            ));
            Ok(())
        }
        Ok(false) => {
            let failed = format!("{} Connection test failed", style("✗").red().bold());
            spinner.finish_with_message(failed);
            bail!("Provider did not accept the connection test")
        }
        Err(e) => {
            let failed = format!("{} Connection test failed", style("✗").red().bold());
            spinner.finish_with_message(failed);
            Err(e.into())
        }
    }
}

async fn configure(path: &Path, action: ConfigAction) -> Result<()> {
    let mut config = load_config(path).await?;
    match action {
        ConfigAction::Show => {
            println!("{}", style(path.display()).dim());
            println!("{}", redacted(&config)?);
        }
        ConfigAction::Set {
            provider,
            endpoint,
            model,
            api_key,
            temperature,
            max_tokens,
            prompt,
        } => {
            ConfigUpdate {
                kind: provider.map(Into::into),
                endpoint,
                model,
                api_key,
                temperature,
                max_tokens,
                prompt,
            }
            .apply(&mut config)?;
            save_config(path, &config).await?;
            println!("{} Saved {}", style("✓").green().bold(), style(path.display()).dim());
        }
    }
    Ok(())
}
