use thiserror::Error;

/// Errors shared by keeper crates
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unknown chain id: {0}")]
    UnknownChain(String),

    #[error("chain RPC error: {0}")]
    Chain(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KeeperError>;
