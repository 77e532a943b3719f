//! Library crate for reach-probe: bounded-concurrency reachability and proxy liveness probing.
pub mod aggregate;
pub mod config;
pub mod error;
pub mod ports;
pub mod probe;
pub mod prober;
pub mod scheduler;
pub mod target;
pub mod types;

pub use aggregate::summarize;
pub use config::{BatchConfig, ProbeKind};
pub use error::{ConfigError, ParseError, RunError};
pub use probe::{Probe, ProxyHandshakeProbe, ProxyLivenessProbe, TcpConnectProbe};
pub use prober::{Prober, RunHandle};
pub use types::{Classification, ProbeOutcome, ProgressEvent, Report, RunState, Summary, Target};
