//! Primary/secondary fallback routing for provider calls.
//!
//! [`FallbackRouter`] drives one turn through a small state machine:
//!
//! - **Primary**: call the configured adapter. A throttling error switches to
//!   the secondary at once. Any other error bumps the retry counter; below
//!   [`MAX_RETRIES`] the router sleeps `retry_count * 2` backoff units and
//!   tries the primary again, otherwise it switches to the secondary.
//! - **Secondary**: call the other adapter exactly once.
//! - **Failed**: the turn resolves to [`APOLOGY`].
//!
//! The router never returns an error; callers always get text to show.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use super::error::{ProviderError, Result};
use super::message::Message;
use super::provider::{ProviderAdapter, build_adapter, build_http_client};
use crate::config::RelayConfig;

/// Number of primary attempts before switching to the secondary.
pub const MAX_RETRIES: u32 = 3;

/// Multiplier applied to the retry count to get the number of backoff units.
pub const BACKOFF_FACTOR: u32 = 2;

/// Reply substituted when every provider has failed.
pub const APOLOGY: &str =
    "I'm having trouble responding right now, please try again later (｡•́︿•̀｡)";

/// Where a turn currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteState {
    Primary { retry_count: u32 },
    Secondary,
    Failed,
}

/// Routes a conversation to the primary adapter with retry and fallback.
pub struct FallbackRouter {
    primary: Arc<dyn ProviderAdapter>,
    secondary: Arc<dyn ProviderAdapter>,
    max_retries: u32,
    backoff_unit: Duration,
    call_timeout: Option<Duration>,
    primary_attempts: AtomicU32,
    fallback_count: AtomicU32,
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.name())
            .field("max_retries", &self.max_retries)
            .field("backoff_unit", &self.backoff_unit)
            .field("fallback_count", &self.fallback_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl FallbackRouter {
    /// Create a router with the default retry policy and one-second backoff units.
    pub fn new(primary: Arc<dyn ProviderAdapter>, secondary: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            primary,
            secondary,
            max_retries: MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
            call_timeout: None,
            primary_attempts: AtomicU32::new(0),
            fallback_count: AtomicU32::new(0),
        }
    }

    /// Build both adapters from configuration, sharing one HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = build_http_client(config.proxy.endpoint())?;
        let kind = config.llm.provider;
        let primary = build_adapter(kind, config, client.clone());
        let secondary = build_adapter(kind.other(), config, client);

        let timeout = (config.llm.call_timeout_secs > 0)
            .then(|| Duration::from_secs(config.llm.call_timeout_secs));

        Ok(Self::new(primary, secondary)
            .with_max_retries(config.llm.max_retries)
            .with_backoff_unit(Duration::from_millis(config.llm.backoff_unit_ms))
            .with_call_timeout(timeout))
    }

    /// Override the number of primary attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Override the length of one backoff unit.
    #[must_use]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Set a per-call deadline; `None` lets calls run unbounded.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Name of the primary adapter.
    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    /// Name of the secondary adapter.
    pub fn secondary_name(&self) -> &str {
        self.secondary.name()
    }

    /// Total primary calls made over the router's lifetime.
    pub fn primary_attempts(&self) -> u32 {
        self.primary_attempts.load(Ordering::Relaxed)
    }

    /// Number of turns that switched to the secondary.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// Delay before the next primary attempt after `retry_count` failures.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        self.backoff_unit * retry_count.saturating_mul(BACKOFF_FACTOR)
    }

    /// Produce a reply for `messages`. Never fails; falls back to [`APOLOGY`].
    pub async fn route(&self, messages: &[Message]) -> String {
        let mut state = RouteState::Primary { retry_count: 0 };
        loop {
            state = match state {
                RouteState::Primary { retry_count } => {
                    self.primary_attempts.fetch_add(1, Ordering::Relaxed);
                    let err = match self.call(self.primary.as_ref(), messages).await {
                        Ok(reply) => return reply,
                        Err(e) => e,
                    };
                    if err.is_rate_limited() {
                        warn!(
                            provider = self.primary.name(),
                            error = %err,
                            "rate limit detected, switching provider"
                        );
                        RouteState::Secondary
                    } else {
                        let retry_count = retry_count + 1;
                        warn!(
                            provider = self.primary.name(),
                            attempt = retry_count,
                            max = self.max_retries,
                            error = %err,
                            "provider call failed"
                        );
                        if retry_count < self.max_retries {
                            let wait = self.backoff_for(retry_count);
                            info!(wait_ms = wait.as_millis() as u64, "waiting before retry");
                            tokio::time::sleep(wait).await;
                            RouteState::Primary { retry_count }
                        } else {
                            RouteState::Secondary
                        }
                    }
                }
                RouteState::Secondary => {
                    self.fallback_count.fetch_add(1, Ordering::Relaxed);
                    info!(
                        from = self.primary.name(),
                        to = self.secondary.name(),
                        "falling back to secondary provider"
                    );
                    match self.call(self.secondary.as_ref(), messages).await {
                        Ok(reply) => return reply,
                        Err(e) => {
                            warn!(provider = self.secondary.name(), error = %e, "secondary provider failed");
                            RouteState::Failed
                        }
                    }
                }
                RouteState::Failed => return APOLOGY.to_owned(),
            };
        }
    }

    async fn call(&self, adapter: &dyn ProviderAdapter, messages: &[Message]) -> Result<String> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, adapter.complete(messages))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "{} did not respond within {}s",
                        adapter.name(),
                        limit.as_secs()
                    )))
                }),
            None => adapter.complete(messages).await,
        }
    }
}
