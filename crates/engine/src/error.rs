use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    /// A caller broke the API contract (e.g. an empty path in a change)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(#[from] context_parser::ParserError),

    #[error("Graph error: {0}")]
    Graph(#[from] context_graph::GraphError),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}
