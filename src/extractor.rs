//! Turns a video id into fetchable streams.
//!
//! A request has two phases. Resolving the page (fetch + parse) is all-or-nothing. Resolving
//! the entries is per entry: unknown itags and entries we cannot decipher are dropped, and the
//! rest still come back.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{error, warn};
use url::Url;

use crate::cipher::{self, TransformProgram};
use crate::error::ExtractError;
use crate::formats;
use crate::models::{ExtractionResult, ResolvedStream};
use crate::page::{self, RawFormatEntry, StreamLocator};
use crate::thumbnails::{self, Thumbnail};
use crate::transport::{DESKTOP_USER_AGENT, HttpTransport, Transport};

pub const BASE_URL: &str = "https://www.youtube.com";

// Progress goes to `info` when the extractor is verbose, `debug` otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Construction-time configuration for [`YouTubeExtractor`].
pub struct ExtractorBuilder {
    verbose: bool,
    transport: Option<Arc<dyn Transport>>,
    base_url: String,
    user_agent: String,
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self {
            verbose: false,
            transport: None,
            base_url: BASE_URL.to_string(),
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }
}

impl ExtractorBuilder {
    /// Raise progress messages from `debug` to `info`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Replace the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn build(self) -> Result<YouTubeExtractor, ExtractError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ExtractError::transport(&self.base_url, format!("invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ExtractError::transport(&self.base_url, "base URL cannot be a base"));
        }

        Ok(YouTubeExtractor {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpTransport::new())),
            base_url,
            user_agent: self.user_agent,
            verbose: self.verbose,
        })
    }
}

/// Resolves videos into streams. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct YouTubeExtractor {
    transport: Arc<dyn Transport>,
    base_url: Url,
    user_agent: String,
    verbose: bool,
}

impl YouTubeExtractor {
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder::default()
    }

    /// Thumbnails for `video_id`, without touching the network.
    pub fn thumbnails(video_id: &str) -> Vec<Thumbnail> {
        thumbnails::thumbnails(video_id)
    }

    pub fn thumbnail(video_id: &str, quality: &str) -> Thumbnail {
        thumbnails::thumbnail(video_id, quality)
    }

    /// Resolves `video_id`, keeping only audio streams when `audio_only` is set.
    pub async fn resolve(
        &self,
        video_id: &str,
        audio_only: bool,
    ) -> Result<ExtractionResult, ExtractError> {
        self.resolve_with(video_id, audio_only, &Cancellation::default())
            .await
    }

    /// Runs [`resolve`](Self::resolve) on the runtime and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_resolve(&self, video_id: &str, audio_only: bool) -> ResolveTask {
        let extractor = self.clone();
        let video_id = video_id.to_string();
        let cancellation = Cancellation::default();
        let flag = cancellation.clone();

        let handle = tokio::spawn(async move {
            extractor
                .resolve_with(&video_id, audio_only, &flag)
                .await
        });

        ResolveTask {
            handle,
            cancellation,
        }
    }

    async fn resolve_with(
        &self,
        video_id: &str,
        audio_only: bool,
        cancellation: &Cancellation,
    ) -> Result<ExtractionResult, ExtractError> {
        cancellation.checkpoint()?;

        let watch_url = self.watch_url(video_id)?;
        progress!(self.verbose, "Extracting from URL {}", watch_url);
        let html = self.fetch(&watch_url).await?;
        cancellation.checkpoint()?;

        let page = page::parse_page(&html, video_id, &self.base_url)?;
        progress!(
            self.verbose,
            "Page parsed ({} shape): {} candidate entries, {} need deciphering, player script {:?}",
            page.shape,
            page.entries.len(),
            page.entries.iter().filter(|e| e.needs_decipher()).count(),
            page.player_url
        );

        let mut context = ResolveContext::new(page.player_url.clone());
        let mut seen = HashSet::new();
        let mut streams = Vec::new();

        for entry in &page.entries {
            let descriptor = match formats::lookup(entry.encoding_id) {
                Ok(descriptor) => descriptor.with_byte_size(entry.byte_size),
                Err(e) => {
                    progress!(self.verbose, "Dropping entry: {}", e);
                    continue;
                }
            };

            let Some(url) = self.stream_url(entry, &mut context, cancellation).await? else {
                continue;
            };

            if !seen.insert(url.clone()) {
                progress!(self.verbose, "Dropping itag {}: duplicate URL", entry.encoding_id);
                continue;
            }
            streams.push(ResolvedStream::new(descriptor, url, entry.bitrate));
        }

        if audio_only {
            streams.retain(ResolvedStream::is_audio_only);
        }
        progress!(self.verbose, "Resolved {} streams for {}", streams.len(), video_id);

        let details = page.details;
        Ok(ExtractionResult {
            video_id: video_id.to_string(),
            title: details.title,
            streams,
            thumbnails: thumbnails::thumbnails(video_id),
            author: details.author,
            description: details.short_description,
            view_count: details.view_count,
            duration_seconds: details.length_seconds,
        })
    }

    /// Final URL for one entry, or `None` when the entry has to be dropped.
    async fn stream_url(
        &self,
        entry: &RawFormatEntry,
        context: &mut ResolveContext,
        cancellation: &Cancellation,
    ) -> Result<Option<String>, ExtractError> {
        match &entry.locator {
            StreamLocator::Direct(url) => {
                if Url::parse(url).is_err() {
                    warn!("Dropping itag {}: not an absolute URL", entry.encoding_id);
                    return Ok(None);
                }
                Ok(Some(url.clone()))
            }
            StreamLocator::Obfuscated {
                url,
                signature,
                param,
            } => {
                let Some(program) = context.program(self, cancellation).await? else {
                    progress!(
                        self.verbose,
                        "Dropping itag {}: decipher unavailable",
                        entry.encoding_id
                    );
                    return Ok(None);
                };
                let signature = program.apply(signature);
                match Url::parse(url) {
                    Ok(mut signed) => {
                        signed.query_pairs_mut().append_pair(param, &signature);
                        Ok(Some(signed.into()))
                    }
                    Err(e) => {
                        warn!("Dropping itag {}: bad stream URL ({})", entry.encoding_id, e);
                        Ok(None)
                    }
                }
            }
        }
    }

    fn watch_url(&self, video_id: &str) -> Result<String, ExtractError> {
        let mut url = self
            .base_url
            .join("/watch")
            .map_err(|e| ExtractError::transport(self.base_url.as_str(), e))?;
        url.query_pairs_mut().append_pair("v", video_id);
        Ok(url.into())
    }

    async fn fetch(&self, url: &str) -> Result<String, ExtractError> {
        self.transport
            .get(url, &[("User-Agent", self.user_agent.as_str())])
            .await
    }
}

/// Cooperative cancellation: checked between network calls, never during one.
#[derive(Debug, Clone, Default)]
struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn checkpoint(&self) -> Result<(), ExtractError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(ExtractError::Cancelled);
        }
        Ok(())
    }
}

/// Handle to a spawned resolution. Completes exactly once.
pub struct ResolveTask {
    handle: JoinHandle<Result<ExtractionResult, ExtractError>>,
    cancellation: Cancellation,
}

impl ResolveTask {
    /// Requests cancellation. A fetch already in flight runs to completion first.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the outcome. A panic inside the task is resumed on the caller.
    pub async fn join(self) -> Result<ExtractionResult, ExtractError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!("Resolution task panicked");
                std::panic::resume_unwind(e.into_panic())
            }
            Err(e) => {
                warn!("Resolution task did not complete: {}", e);
                Err(ExtractError::Cancelled)
            }
        }
    }
}

enum ProgramState {
    Pending,
    Ready(TransformProgram),
    Unavailable,
}

/// Per-request state: the player script URL and the program derived from it, at most once.
struct ResolveContext {
    player_url: Option<String>,
    program: ProgramState,
}

impl ResolveContext {
    fn new(player_url: Option<String>) -> Self {
        Self {
            player_url,
            program: ProgramState::Pending,
        }
    }

    /// The request's transform program, deriving it on first use.
    ///
    /// `Ok(None)` means deciphering is unavailable for the rest of the request. Failing to
    /// fetch the script is a transport error and ends the request.
    async fn program(
        &mut self,
        extractor: &YouTubeExtractor,
        cancellation: &Cancellation,
    ) -> Result<Option<&TransformProgram>, ExtractError> {
        if matches!(self.program, ProgramState::Pending) {
            self.program = match &self.player_url {
                None => {
                    warn!("Page has no player script reference; cannot decipher signatures");
                    ProgramState::Unavailable
                }
                Some(player_url) => {
                    cancellation.checkpoint()?;
                    progress!(extractor.verbose, "Fetching player script {}", player_url);
                    let script = extractor.fetch(player_url).await?;
                    cancellation.checkpoint()?;

                    match cipher::derive_program(&script) {
                        Ok(program) => {
                            progress!(
                                extractor.verbose,
                                "Derived decipher program with {} steps",
                                program.len()
                            );
                            ProgramState::Ready(program)
                        }
                        Err(e) => {
                            warn!("{}; dropping entries that need deciphering", e);
                            ProgramState::Unavailable
                        }
                    }
                }
            };
        }

        Ok(match &self.program {
            ProgramState::Ready(program) => Some(program),
            _ => None,
        })
    }
}
