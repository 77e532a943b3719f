use std::path::PathBuf;

use thiserror::Error;

/// Why a raw target line could not be turned into a [`crate::types::Target`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty target")]
    Empty,
    #[error("invalid scheme in target: {0}")]
    InvalidScheme(String),
    #[error("missing port in target: {0}")]
    MissingPort(String),
    #[error("empty host in target: {0}")]
    EmptyHost(String),
    #[error("IPv6 host must be bracketed: {0}")]
    UnbracketedIpv6(String),
    #[error("non-numeric port {port:?} in target: {raw}")]
    InvalidPort { raw: String, port: String },
    #[error("port out of range: {port}")]
    PortOutOfRange { raw: String, port: u32 },
}

/// Rejected configuration. Raised before any probe is launched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("per-attempt timeout must be at least 1ms")]
    ZeroTimeout,
    #[error("invalid liveness check url {url:?}: {reason}")]
    InvalidCheckUrl { url: String, reason: String },
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode config file {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of a whole run. Per-target failures never show up here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("probe run task failed")]
    Join(#[from] tokio::task::JoinError),
}
