//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Both entry points open the [`MemoryEngine`], catch up with the workspace,
//! start the file watcher (if enabled) and serve [`CairnTools`] until the
//! client disconnects or ctrl-c.

use crate::config::CairnConfig;
use crate::engine::MemoryEngine;
use crate::tools::CairnTools;
use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::Arc;

/// Open the engine and bring the index up to date before serving.
async fn start_engine(config: CairnConfig) -> Result<Arc<MemoryEngine>> {
    let engine = Arc::new(MemoryEngine::open(config)?);
    tracing::info!(
        workspace = %engine.workspace().root().display(),
        db = %engine.config().resolved_db_path().display(),
        "engine ready"
    );

    let report = if engine.config().sync.watch_enabled {
        engine.start_watching().await?
    } else {
        engine.reindex(false).await?
    };
    if !report.errors.is_empty() {
        tracing::warn!(failed = report.errors.len(), "some files could not be indexed");
    }
    Ok(engine)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: CairnConfig) -> Result<()> {
    tracing::info!("starting Cairn MCP server on stdio");

    let engine = start_engine(config).await?;
    let tools = CairnTools::new(Arc::clone(&engine));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    engine.shutdown().await;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: CairnConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting Cairn MCP server on HTTP");

    let engine = start_engine(config).await?;
    let shared = Arc::clone(&engine);

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(CairnTools::new(Arc::clone(&shared))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    engine.shutdown().await;
    Ok(())
}
