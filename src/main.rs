use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use futures::future::join_all;
use tracing_subscriber::EnvFilter;

use tubextract::utils::{format_duration, parse_video_id};
use tubextract::{ExtractionResult, HttpTransport, ResolveTask, YouTubeExtractor};

mod player;
mod ui;

use player::{play_with_mpv, play_with_vlc};
use ui::select_from_list;

#[derive(Parser)]
#[command(name = "tubextract", version, about = "Resolve YouTube videos into direct stream URLs")]
struct Cli {
    /// Video ids or watch URLs
    videos: Vec<String>,

    /// Keep only audio streams
    #[arg(short, long)]
    audio_only: bool,

    /// Print the results as JSON
    #[arg(short, long)]
    json: bool,

    /// Pick a stream and play it with mpv
    #[arg(short, long)]
    play: bool,

    /// Use VLC to play the stream
    #[arg(long)]
    vlc: bool,

    /// Only print thumbnail URLs (no network access)
    #[arg(short, long)]
    thumbnails: bool,

    /// Show extraction progress
    #[arg(short, long)]
    verbose: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let inputs = if cli.videos.is_empty() {
        vec![ui::prompt_input("Video id or URL")?]
    } else {
        cli.videos.clone()
    };
    let ids = inputs
        .iter()
        .map(|input| parse_video_id(input).ok_or_else(|| anyhow!("Not a video id or URL: {}", input)))
        .collect::<Result<Vec<_>>>()?;

    if cli.thumbnails {
        for id in &ids {
            for thumbnail in YouTubeExtractor::thumbnails(id) {
                println!("{:<14} {}", thumbnail.quality, thumbnail.url);
            }
        }
        return Ok(());
    }

    let transport = HttpTransport::with_timeout(Duration::from_secs(cli.timeout))?;
    let extractor = YouTubeExtractor::builder()
        .verbose(cli.verbose)
        .transport(Arc::new(transport))
        .build()?;

    // Requests are independent, so several videos resolve concurrently
    let spinner = ui::spinner(&format!("Resolving {} video(s)...", ids.len()));
    let tasks: Vec<ResolveTask> = ids
        .iter()
        .map(|id| extractor.spawn_resolve(id, cli.audio_only))
        .collect();
    let results = join_all(tasks.into_iter().map(ResolveTask::join)).await;
    spinner.finish_and_clear();

    let mut extractions = Vec::with_capacity(results.len());
    for (id, result) in ids.iter().zip(results) {
        extractions.push(result.with_context(|| format!("Failed to resolve {}", id))?);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&extractions)?);
    } else {
        for extraction in &extractions {
            print_extraction(extraction);
        }
    }

    if cli.play || cli.vlc {
        let extraction = extractions
            .first()
            .ok_or_else(|| anyhow!("Nothing to play"))?;
        if extraction.streams.is_empty() {
            return Err(anyhow!("No playable streams for {}", extraction.video_id));
        }

        let labels: Vec<String> = extraction.streams.iter().map(stream_label).collect();
        let index = if labels.len() == 1 {
            0
        } else {
            select_from_list(&labels, "Select stream:")?
        };
        let url = &extraction.streams[index].url;

        if cli.vlc {
            play_with_vlc(url)?;
        } else {
            play_with_mpv(url)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tubextract=debug" } else { "tubextract=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn stream_label(stream: &tubextract::ResolvedStream) -> String {
    let size = stream
        .byte_size
        .map(|b| format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0)))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "itag {:<4} {:<7} {:<8} {}",
        stream.encoding_id, stream.container, stream.resolution, size
    )
}

fn print_extraction(extraction: &ExtractionResult) {
    println!("Video:    {}", extraction.video_id);
    if let Some(title) = &extraction.title {
        println!("Title:    {}", title);
    }
    if let Some(author) = &extraction.author {
        println!("Author:   {}", author);
    }
    if let Some(seconds) = extraction.duration_seconds {
        println!("Duration: {}", format_duration(seconds));
    }
    if let Some(views) = extraction.view_count {
        println!("Views:    {}", views);
    }

    println!("Streams ({}):", extraction.streams.len());
    for stream in &extraction.streams {
        println!("  {}", stream_label(stream));
        println!("    {}", stream.url);
    }
    println!();
}
