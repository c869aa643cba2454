use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use log_api::{KvStore, RequestHandler};
use log_engine::LogService;
use node_runtime::{write_outbound, LinKvStore, Node};
use storage_memory::MemoryStore;

use crate::config::{Cli, NodeConfig, StoreKind};
use crate::error::NodeError;

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    tracing::info!("kafka-node starting");

    // --- Load config ---
    let config = match &cli.config {
        Some(path) => {
            let config = NodeConfig::load(path)?;
            tracing::info!(config = %path, "loaded config");
            config
        }
        None => NodeConfig::default(),
    };

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Outbound stream: stdout is the protocol channel ---
    let (node, outbound) = Node::new();
    let writer = tokio::spawn(write_outbound(outbound, tokio::io::stdout()));

    // --- Store + service ---
    let store: Arc<dyn KvStore> = match cli.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::LinKv => Arc::new(LinKvStore::with_service(
            node.clone(),
            config.kv_service.clone(),
            config.engine.store_timeout(),
        )),
    };
    let service: Arc<dyn RequestHandler> = Arc::new(LogService::new(store, &config.engine)?);
    tracing::info!(
        store = ?cli.store,
        kv_service = %config.kv_service,
        timeout_ms = config.engine.store_timeout_ms,
        max_cas_attempts = config.engine.max_cas_attempts,
        "log service ready"
    );

    // --- Ctrl+C stops reading input; in-flight requests still finish ---
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down...");
            signal_token.cancel();
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    node.run(stdin, service, token).await?;

    // The writer exits once the last Node handle (ours, and the store's
    // through the service) is gone.
    drop(node);
    writer.await??;

    tracing::info!("shutdown complete");
    Ok(())
}
