use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaypostError {
    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(#[from] lapin::Error),

    #[error("external service error: {0}")]
    ExternalService(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WaypostError>;
