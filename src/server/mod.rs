//! HTTP and websocket front door.
//!
//! ## Endpoints
//!
//! - `GET /ws`: chat session websocket
//! - `POST /speech?text=...`: one-off speech synthesis
//! - `GET /`, `GET /roadmap`: HTML pages from the templates directory
//! - `/static/*`, `/live2d/*`: static assets, falling back to `index.html`
//! - `GET /health`: liveness probe

pub mod protocol;
pub mod session;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::llm::FallbackRouter;
use crate::tts::{EdgeTts, SpeechSynthesizer, unique_filename};
use protocol::{SpeechQuery, SpeechResponse};
use session::{SessionRegistry, run_session};

/// Shared handles passed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration.
    pub config: Arc<RelayConfig>,
    /// Provider routing.
    pub router: Arc<FallbackRouter>,
    /// Speech synthesis.
    pub speech: Arc<SpeechSynthesizer>,
    /// Live websocket sessions.
    pub sessions: Arc<SessionRegistry>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("router", &self.router)
            .field("speech", &self.speech)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl AppState {
    /// Assemble state from already-built components.
    pub fn new(config: RelayConfig, router: FallbackRouter, speech: SpeechSynthesizer) -> Self {
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
            speech: Arc::new(speech),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Build the production providers and speech backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client cannot be built.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let router = FallbackRouter::from_config(&config)?;
        let backend = EdgeTts::new(
            config.tts.output_format.clone(),
            config.proxy.endpoint().map(str::to_owned),
        );
        let speech = SpeechSynthesizer::from_config(Arc::new(backend), &config.server, &config.tts);
        Ok(Self::new(config, router, speech))
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let static_dir = server.static_dir.clone();
    let live2d_dir = static_dir.join("live2d");
    let templates_dir = server.templates_dir.clone();

    Router::new()
        .route("/ws", get(handle_ws))
        .route("/speech", post(handle_speech))
        .route("/health", get(handle_health))
        .route_service("/", ServeFile::new(templates_dir.join("index.html")))
        .route_service("/roadmap", ServeFile::new(templates_dir.join("roadmap.html")))
        .nest_service("/static", spa_dir(&static_dir))
        .nest_service("/live2d", spa_dir(&live2d_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

/// Serve `dir`, answering unknown paths with its `index.html`.
fn spa_dir(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(dir.join("index.html")))
}

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn handle_speech(
    State(state): State<AppState>,
    Query(query): Query<SpeechQuery>,
) -> Json<SpeechResponse> {
    match state.speech.synthesize(&query.text, &unique_filename()).await {
        Ok(clip) => Json(SpeechResponse::ok(clip.url)),
        Err(e) => {
            warn!(error = %e, "speech request failed");
            Json(SpeechResponse::failed(format!("Failed to generate speech: {e}")))
        }
    }
}

async fn handle_health() -> impl IntoResponse {
    "OK"
}

/// Running relay server.
///
/// Serves in a background task until [`RelayServer::shutdown`] is called or
/// the value is dropped.
pub struct RelayServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RelayServer {
    /// Bind to `{server.host}:{server.port}` (port `0` picks a free port) and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio directory cannot be created or the
    /// listener cannot bind.
    pub async fn start(state: AppState) -> Result<Self> {
        let server = &state.config.server;
        tokio::fs::create_dir_all(server.audio_dir()).await?;

        let bind_addr = format!("{}:{}", server.host, server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RelayError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RelayError::Server(format!("failed to get local addr: {e}")))?;

        info!(
            %addr,
            primary = state.router.primary_name(),
            secondary = state.router.secondary_name(),
            "relay listening"
        );

        let app = build_router(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!("relay server error: {e}");
            }
        });

        Ok(Self {
            addr,
            handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
