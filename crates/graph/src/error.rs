use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Graph build task failed: {0}")]
    BuildTask(String),

    #[error("{0}")]
    Other(String),
}
