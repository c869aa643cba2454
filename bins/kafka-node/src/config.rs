use clap::{Parser, ValueEnum};
use serde::Deserialize;

use log_engine::EngineConfig;

use crate::error::NodeError;

#[derive(Parser, Debug)]
#[command(name = "kafka-node", about = "Replicated append-only log node")]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long, env = "KAFKA_NODE_CONFIG")]
    pub config: Option<String>,

    /// Where topic state lives.
    #[arg(long, value_enum, default_value_t = StoreKind::LinKv, env = "KAFKA_NODE_STORE")]
    pub store: StoreKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In-process table; single-node deployments only.
    Memory,
    /// The harness's linearizable key-value service, shared by all nodes.
    LinKv,
}

// ---- TOML Config ----

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeConfig {
    /// Service name of the linearizable store.
    #[serde(default = "default_kv_service")]
    pub kv_service: String,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_kv_service() -> String {
    node_runtime::LIN_KV.to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            kv_service: default_kv_service(),
            engine: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| NodeError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
