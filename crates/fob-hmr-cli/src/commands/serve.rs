//! `serve` command: watch the project and push updates to HMR clients.

use std::sync::Arc;

use fob_hmr::HmrService;
use tokio::signal;
use tokio::sync::oneshot;

use crate::cli::ServeArgs;
use crate::config::HmrServerConfig;
use crate::error::Result;
use crate::native::NativeResolver;
use crate::server::HmrServer;
use crate::ui;
use crate::watcher::FileWatcher;

/// Execute the serve command.
///
/// Loads configuration, wires the file watcher and native resolver into an
/// [`HmrService`], binds the WebSocket server and runs until Ctrl+C. The
/// watcher only starts once the first client connects.
pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = HmrServerConfig::load(&args)?;
    ui::info(&format!("Project root: {}", config.root.display()));

    let watcher = Arc::new(FileWatcher::new(
        config.root.clone(),
        config.watch_ignore.clone(),
        config.debounce_ms,
    )?);
    let resolver = Arc::new(NativeResolver::new(
        config.root.clone(),
        config.extensions.clone(),
    ));
    let service = HmrService::new(resolver, watcher, config.hmr_config());

    let server_url = config.server_url();
    let server = HmrServer::new(config, Arc::clone(&service));
    let listener = server.bind().await?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(server.serve(listener, async move {
        let _ = shutdown_rx.await;
    }));

    ui::success(&format!("HMR server running at {server_url}"));
    ui::info("Clients connect with ?platform=<name>&bundleEntry=<path>");
    ui::info("Press Ctrl+C to stop");

    tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down HMR server...");
            let _ = shutdown_tx.send(());
            match server_handle.await {
                Ok(result) => result?,
                Err(e) => tracing::warn!(error = %e, "Server task did not finish cleanly"),
            }
        }

        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => ui::warning("Server task completed unexpectedly"),
                Ok(Err(e)) => {
                    ui::error(&format!("Server error: {e}"));
                    return Err(e);
                }
                Err(e) => ui::error(&format!("Server task panicked: {e}")),
            }
        }
    }

    for connection_id in service.connection_ids() {
        service.disconnect(connection_id);
    }

    ui::success("HMR server stopped");
    Ok(())
}
