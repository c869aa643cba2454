#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Engine(#[from] log_engine::LogError),

    #[error("runtime: {0}")]
    Runtime(#[from] node_runtime::RuntimeError),

    #[error("output writer: {0}")]
    Writer(#[from] tokio::task::JoinError),
}
