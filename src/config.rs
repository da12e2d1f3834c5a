//! Configuration types for the chat relay.
//!
//! The configuration is assembled exactly once at startup and handed to
//! every component explicitly. Sources, lowest precedence first:
//!
//! 1. Built-in defaults.
//! 2. An optional TOML file (path from `MINA_CONFIG`).
//! 3. The process environment (after `.env` has been loaded), using the
//!    deployment variable names (`CURRENT_MODEL`,
//!    `USE_PROXY`, `PROXY_URL`, `OPENAI_API_KEY`, `GOOGLE_API_KEY`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{RelayError, Result};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "MINA_CONFIG";

/// Top-level configuration for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP / websocket server settings.
    pub server: ServerConfig,
    /// Language model provider settings.
    pub llm: LlmConfig,
    /// Outbound proxy settings (applies to providers and speech).
    pub proxy: ProxyConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Conversation history settings.
    pub history: HistoryConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Server bind address and asset locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind (use `0` for auto-assign).
    pub port: u16,
    /// Root of the static asset tree, mounted at `/static`.
    pub static_dir: PathBuf,
    /// Directory holding `index.html` and `roadmap.html`.
    pub templates_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            static_dir: PathBuf::from("static"),
            templates_dir: PathBuf::from("templates"),
        }
    }
}

impl ServerConfig {
    /// Directory generated speech files are written to.
    pub fn audio_dir(&self) -> PathBuf {
        self.static_dir.join("audio")
    }
}

/// Which language model backend is primary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Google Gemini over the REST transport.
    #[default]
    #[serde(rename = "gemini")]
    Gemini,
    /// OpenAI chat completions.
    #[serde(rename = "gpt-3.5", alias = "openai")]
    OpenAi,
}

impl ProviderKind {
    /// Parse the `CURRENT_MODEL` spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "gemini" => Some(Self::Gemini),
            "gpt-3.5" | "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    /// The provider used when this one is exhausted.
    pub fn other(self) -> Self {
        match self {
            Self::Gemini => Self::OpenAi,
            Self::OpenAi => Self::Gemini,
        }
    }

    /// Stable label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "gpt-3.5",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Primary provider; the other one is the fallback.
    pub provider: ProviderKind,
    /// OpenAI settings.
    pub openai: OpenAiSettings,
    /// Gemini settings.
    pub gemini: GeminiSettings,
    /// Attempts against the primary provider before falling back.
    pub max_retries: u32,
    /// Length of one backoff unit in milliseconds.
    ///
    /// The wait after the n-th failed attempt is `n * backoff_unit_ms * 2`.
    pub backoff_unit_ms: u64,
    /// Deadline for a single provider call in seconds. `0` disables it.
    pub call_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            openai: OpenAiSettings::default(),
            gemini: GeminiSettings::default(),
            max_retries: 3,
            backoff_unit_ms: 1000,
            call_timeout_secs: 60,
        }
    }
}

/// OpenAI adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// API key (`OPENAI_API_KEY`).
    pub api_key: String,
    /// Base URL without the `/v1` suffix.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com".to_owned(),
            model: "gpt-3.5-turbo".to_owned(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Gemini adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    /// API key (`GOOGLE_API_KEY`).
    pub api_key: String,
    /// Base URL of the generative language REST API.
    pub base_url: String,
    /// Model name.
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-pro".to_owned(),
        }
    }
}

/// Outbound proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Whether outbound traffic goes through the proxy.
    pub enabled: bool,
    /// Proxy URL.
    pub url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:7890".to_owned(),
        }
    }
}

impl ProxyConfig {
    /// The proxy endpoint when enabled.
    pub fn endpoint(&self) -> Option<&str> {
        if self.enabled && !self.url.is_empty() {
            Some(self.url.as_str())
        } else {
            None
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Voice tried first.
    pub primary_voice: String,
    /// Voices tried in order when the primary fails.
    pub fallback_voices: Vec<String>,
    /// Output format requested from the speech service.
    pub output_format: String,
    /// Keep at most this many generated files. `0` keeps everything.
    pub max_audio_files: usize,
    /// Deadline for a single voice attempt in seconds. `0` disables it.
    pub call_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            primary_voice: "en-GB-MaisieNeural".to_owned(),
            fallback_voices: vec![
                "en-US-JennyNeural".to_owned(),
                "en-US-AriaNeural".to_owned(),
                "en-GB-SoniaNeural".to_owned(),
            ],
            output_format: "audio-24khz-48kbitrate-mono-mp3".to_owned(),
            max_audio_files: 0,
            call_timeout_secs: 60,
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Messages retained per session, excluding the persona preamble.
    pub max_messages: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_messages: 10 }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files. `None` logs to stderr only.
    pub dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Assemble the startup configuration from `.env`, the optional TOML
    /// file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `MINA_CONFIG` names a file that cannot be loaded.
    pub fn load() -> Result<Self> {
        // A missing .env is the normal case in production.
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    ///
    /// The lookup is injected so the overlay can be exercised without
    /// touching the real process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("CURRENT_MODEL") {
            match ProviderKind::parse(&model) {
                Some(kind) => self.llm.provider = kind,
                None => {
                    warn!(model = model.as_str(), "invalid CURRENT_MODEL, using gemini");
                    self.llm.provider = ProviderKind::Gemini;
                }
            }
        }
        if let Some(flag) = lookup("USE_PROXY") {
            self.proxy.enabled = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(url) = lookup("PROXY_URL") {
            self.proxy.url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai.api_key = key;
        }
        if let Some(key) = lookup("GOOGLE_API_KEY") {
            self.llm.gemini.api_key = key;
        }
        if let Some(host) = lookup("MINA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MINA_PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(port = port.as_str(), "ignoring unparseable MINA_PORT"),
            }
        }
        if let Some(dir) = lookup("MINA_STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("MINA_TEMPLATES_DIR") {
            self.server.templates_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("MINA_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(dir));
        }
    }
}

/// Shorten a credential for log output.
pub fn redacted(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_owned();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}...")
}
