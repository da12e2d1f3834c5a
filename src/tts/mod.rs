//! Text-to-speech synthesis into servable audio clips.
//!
//! [`SpeechSynthesizer`] tries the primary voice and then each fallback voice
//! in order, writing the first successful rendering under the static audio
//! directory. Voices are rendered by a [`VoiceBackend`]; production uses the
//! Edge read-aloud service ([`EdgeTts`]).

mod edge;

pub use edge::EdgeTts;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ServerConfig, TtsConfig};

/// URL prefix under which the audio directory is served.
pub const AUDIO_URL_PREFIX: &str = "/static/audio";

/// Container format of produced clips.
pub const AUDIO_FORMAT: &str = "mp3";

/// Errors produced while synthesizing speech.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// Nothing to say.
    #[error("text is empty")]
    EmptyText,

    /// The requested file name is not a plain file name.
    #[error("invalid audio file name: {0}")]
    InvalidFilename(String),

    /// Could not reach the speech service.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The speech service replied with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The stream ended without any audio.
    #[error("no audio received")]
    NoAudio,

    /// A single voice attempt exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Primary and every fallback voice failed.
    #[error("all {attempted} voice options failed, last error: {last}")]
    AllVoicesFailed {
        /// Number of voices tried.
        attempted: usize,
        /// Error from the final attempt.
        last: String,
    },

    /// Writing the clip failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders text with a named voice.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Synthesize `text` with `voice` and return the encoded audio bytes.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, TtsError>;
}

/// A playable clip reference returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechClip {
    /// Public URL of the clip.
    pub url: String,
    /// Container format, always `"mp3"`.
    #[serde(rename = "type")]
    pub format: String,
}

impl SpeechClip {
    fn for_file(filename: &str) -> Self {
        Self {
            url: format!("{AUDIO_URL_PREFIX}/{filename}"),
            format: AUDIO_FORMAT.to_owned(),
        }
    }
}

/// `speech_{unix_secs}_{uuid}.mp3`, used for chat replies. Unique per call so
/// concurrent sessions never share a clip.
pub fn timestamped_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("speech_{secs}_{}.{AUDIO_FORMAT}", uuid::Uuid::new_v4().simple())
}

/// `{uuid}.mp3`, used for standalone speech requests.
pub fn unique_filename() -> String {
    format!("{}.{AUDIO_FORMAT}", uuid::Uuid::new_v4())
}

/// Voice-fallback synthesizer writing clips into the audio directory.
pub struct SpeechSynthesizer {
    backend: Arc<dyn VoiceBackend>,
    audio_dir: PathBuf,
    primary_voice: String,
    fallback_voices: Vec<String>,
    max_audio_files: usize,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for SpeechSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSynthesizer")
            .field("audio_dir", &self.audio_dir)
            .field("primary_voice", &self.primary_voice)
            .field("fallback_voices", &self.fallback_voices)
            .field("max_audio_files", &self.max_audio_files)
            .finish()
    }
}

impl SpeechSynthesizer {
    /// Create a synthesizer with the given backend and voice order.
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        audio_dir: impl Into<PathBuf>,
        primary_voice: impl Into<String>,
        fallback_voices: Vec<String>,
    ) -> Self {
        Self {
            backend,
            audio_dir: audio_dir.into(),
            primary_voice: primary_voice.into(),
            fallback_voices,
            max_audio_files: 0,
            call_timeout: None,
        }
    }

    /// Build from configuration around an existing backend.
    pub fn from_config(backend: Arc<dyn VoiceBackend>, server: &ServerConfig, tts: &TtsConfig) -> Self {
        let timeout = (tts.call_timeout_secs > 0).then(|| Duration::from_secs(tts.call_timeout_secs));
        Self::new(
            backend,
            server.audio_dir(),
            tts.primary_voice.clone(),
            tts.fallback_voices.clone(),
        )
        .with_max_audio_files(tts.max_audio_files)
        .with_call_timeout(timeout)
    }

    /// Keep at most `max` clips on disk; `0` keeps everything.
    #[must_use]
    pub fn with_max_audio_files(mut self, max: usize) -> Self {
        self.max_audio_files = max;
        self
    }

    /// Deadline for a single voice attempt.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Directory clips are written to.
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Voices in the order they are tried.
    pub fn voices(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_voice.as_str()).chain(self.fallback_voices.iter().map(String::as_str))
    }

    /// Render `text` into `{audio_dir}/{filename}` and return its clip.
    ///
    /// # Errors
    ///
    /// Returns [`TtsError::EmptyText`] for blank input without contacting any
    /// voice, and [`TtsError::AllVoicesFailed`] when no voice succeeds.
    pub async fn synthesize(&self, text: &str, filename: &str) -> Result<SpeechClip, TtsError> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }
        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
            return Err(TtsError::InvalidFilename(filename.to_owned()));
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let path = self.audio_dir.join(filename);

        let mut attempted = 0;
        let mut last = String::new();
        for voice in self.voices() {
            attempted += 1;
            let audio = match self.render(text, voice).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(voice, error = %e, "voice failed");
                    last = e.to_string();
                    continue;
                }
            };
            tokio::fs::write(&path, &audio).await?;
            info!(voice, path = %path.display(), bytes = audio.len(), "audio generated");
            if self.max_audio_files > 0 {
                let dir = self.audio_dir.clone();
                let max = self.max_audio_files;
                if let Err(e) = tokio::task::spawn_blocking(move || prune_old_clips(&dir, &path, max)).await {
                    warn!(error = %e, "audio pruning task failed");
                }
            }
            return Ok(SpeechClip::for_file(filename));
        }

        Err(TtsError::AllVoicesFailed { attempted, last })
    }

    async fn render(&self, text: &str, voice: &str) -> Result<Vec<u8>, TtsError> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.synthesize(text, voice))
                .await
                .unwrap_or_else(|_| Err(TtsError::Timeout(format!("{voice} after {}s", limit.as_secs())))),
            None => self.backend.synthesize(text, voice).await,
        }
    }
}

/// Delete the oldest clips beyond `max_files`, never touching `keep`.
fn prune_old_clips(audio_dir: &Path, keep: &Path, max_files: usize) {
    let mut entries: Vec<(PathBuf, SystemTime)> = match std::fs::read_dir(audio_dir) {
        Ok(dir) => dir
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                if path == keep || path.extension().and_then(|x| x.to_str()) != Some(AUDIO_FORMAT) {
                    return None;
                }
                let mtime = path.metadata().ok()?.modified().ok()?;
                Some((path, mtime))
            })
            .collect(),
        Err(_) => return,
    };

    // Newest first; `keep` already occupies one slot.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in entries.iter().skip(max_files.saturating_sub(1)) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to prune audio clip");
        }
    }
}
