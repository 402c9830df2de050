use anyhow::{Context, Result, anyhow};
use std::process::Command;
use tracing::{info, warn};

use tubextract::utils::is_program_installed;

// Plays a resolved stream URL with mpv
pub fn play_with_mpv(stream_url: &str) -> Result<()> {
    if !is_program_installed("mpv") {
        return Err(anyhow!("mpv is not installed"));
    }

    info!("Starting mpv");
    let status = Command::new("mpv")
        .args([
            "--force-window=yes",
            "--keep-open=yes",
            "--ytdl=no", // the URL is already resolved
            stream_url,
        ])
        .status()
        .context("Failed to launch mpv")?;

    if !status.success() {
        return Err(anyhow!("mpv exited with {}", status));
    }
    Ok(())
}

pub fn play_with_vlc(stream_url: &str) -> Result<()> {
    if !is_program_installed("vlc") {
        warn!("VLC not found, falling back to mpv");
        return play_with_mpv(stream_url);
    }

    info!("Starting VLC");
    let status = Command::new("vlc")
        .args(["--no-video-title-show", stream_url])
        .status()
        .context("Failed to launch VLC")?;

    if !status.success() {
        return Err(anyhow!("VLC exited with {}", status));
    }
    Ok(())
}
