//! WebSocket transport for the HMR protocol.
//!
//! `GET /hot?platform=<name>&bundleEntry=<path>` seeds a session and, only if
//! that succeeds, upgrades to a WebSocket. Every [`ServerMessage`] queued for
//! the session is written as one JSON text frame. `GET /status` reports the
//! number of connected sessions.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use fob_hmr::{ConnectionId, HmrError, HmrService, ServerMessage};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::HmrServerConfig;
use crate::error::{Result, ServerError};

/// Shared state of the axum application.
#[derive(Clone)]
struct AppState {
    service: Arc<HmrService>,
    root: Arc<PathBuf>,
}

impl AppState {
    /// Entry files are given relative to the project root. Bundle requests
    /// (`index.bundle`) map back to their `.js` source. `None` if the entry
    /// points outside the root.
    fn entry_path(&self, bundle_entry: &str) -> Option<PathBuf> {
        let trimmed = bundle_entry.trim_start_matches('/');
        let mut path = path_clean::clean(self.root.join(trimmed));
        if !path.starts_with(self.root.as_path()) {
            return None;
        }
        if path.extension().is_some_and(|ext| ext == "bundle") {
            path.set_extension("js");
        }
        Some(path)
    }
}

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
struct HotQuery {
    platform: Option<String>,
    #[serde(rename = "bundleEntry")]
    bundle_entry: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub sessions: usize,
    pub listening: bool,
}

/// HTTP/WebSocket server in front of an [`HmrService`].
pub struct HmrServer {
    config: HmrServerConfig,
    service: Arc<HmrService>,
}

impl HmrServer {
    pub fn new(config: HmrServerConfig, service: Arc<HmrService>) -> Self {
        Self { config, service }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = AppState {
            service: Arc::clone(&self.service),
            root: Arc::new(self.config.root.clone()),
        };

        Router::new()
            .route("/hot", get(handle_hot))
            .route("/status", get(handle_status))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state)
    }

    /// Resolve the configured host and bind a listener.
    pub async fn bind(&self) -> Result<TcpListener> {
        let target = self.config.listen_target();
        let addr: SocketAddr = tokio::net::lookup_host(&target)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ServerError::InvalidAddress(target.clone()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(listener)
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "HMR server listening");
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;
        Ok(())
    }
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        sessions: state.service.session_count(),
        listening: state.service.is_listening(),
    })
}

async fn handle_hot(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HotQuery>,
) -> Response {
    let (Some(platform), Some(bundle_entry)) = (query.platform, query.bundle_entry) else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing required query parameters 'platform' and 'bundleEntry'",
        )
            .into_response();
    };

    let Some(entry_file) = state.entry_path(&bundle_entry) else {
        tracing::warn!(platform = %platform, entry = %bundle_entry, "Refusing entry outside the project root");
        return (
            StatusCode::FORBIDDEN,
            "bundleEntry must point inside the project root",
        )
            .into_response();
    };
    let (tx, rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match state
        .service
        .connect(platform.clone(), entry_file.clone(), Arc::new(tx))
        .await
    {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(
                platform = %platform,
                entry = %entry_file.display(),
                error = %err,
                "Refusing HMR client"
            );
            return (status_for(&err), err.to_string()).into_response();
        }
    };

    tracing::info!(
        connection_id = %connection_id,
        platform = %platform,
        entry = %display_relative(&entry_file, &state.root),
        "HMR client connected"
    );

    let failed_state = state.clone();
    ws.on_failed_upgrade(move |err| {
        tracing::warn!(connection_id = %connection_id, error = %err, "WebSocket upgrade failed");
        failed_state.service.disconnect(connection_id);
    })
    .on_upgrade(move |socket| handle_socket(socket, state, connection_id, rx))
}

/// Forward queued messages until either side goes away.
async fn handle_socket(
    mut socket: WebSocket,
    state: AppState,
    connection_id: ConnectionId,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else {
                    // The session ended on the server side.
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(connection_id = %connection_id, error = %err, "Failed to encode message");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Clients don't send anything meaningful after the handshake.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.service.disconnect(connection_id);
    tracing::info!(connection_id = %connection_id, "HMR client disconnected");
}

/// HTTP status used to refuse a handshake.
fn status_for(err: &HmrError) -> StatusCode {
    match err {
        HmrError::NotFound { .. } | HmrError::SessionInvalid { .. } => StatusCode::NOT_FOUND,
        HmrError::UnableToResolve { .. } | HmrError::Transform { .. } => StatusCode::BAD_REQUEST,
        HmrError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_for(root: &str) -> AppState {
        let resolver = Arc::new(fob_hmr::testing::InMemoryResolver::new());
        let source = Arc::new(fob_hmr::testing::ManualChangeSource::new());
        AppState {
            service: HmrService::new(resolver, source, fob_hmr::HmrConfig::default()),
            root: Arc::new(PathBuf::from(root)),
        }
    }

    #[test]
    fn test_entry_path() {
        let state = state_for("/app");
        assert_eq!(state.entry_path("index.js"), Some(PathBuf::from("/app/index.js")));
        assert_eq!(state.entry_path("/src/main.js"), Some(PathBuf::from("/app/src/main.js")));
        assert_eq!(state.entry_path("index.bundle"), Some(PathBuf::from("/app/index.js")));
        assert_eq!(state.entry_path("./src/../index.js"), Some(PathBuf::from("/app/index.js")));
    }

    #[test]
    fn test_entry_path_stays_inside_root() {
        let state = state_for("/app");
        assert_eq!(state.entry_path("../../x.js"), None);
        assert_eq!(state.entry_path("src/../../etc/passwd"), None);
        assert_eq!(state.entry_path("/../app-other/index.js"), None);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&HmrError::NotFound {
                path: PathBuf::from("/a.js")
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&HmrError::Transform {
                filename: PathBuf::from("/a.js"),
                description: "bad".into(),
                line_number: None,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&HmrError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(
            display_relative(Path::new("/app/src/a.js"), Path::new("/app")),
            "src/a.js"
        );
    }
}
