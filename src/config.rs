use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scheduler::PROBE_GRACE;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_CHECK_URL: &str = "http://www.google.com/generate_204";

/// Which built-in probe a run uses.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ProbeKind {
    /// Plain TCP connect: open, closed (refused/reset) or timed out.
    #[default]
    TcpConnect,
    /// HEAD request to the check URL routed through the target as a proxy.
    ProxyLiveness,
    /// TCP connect plus one written HTTP handshake; reachable, not necessarily proxying.
    ProxyHandshake,
}

impl ProbeKind {
    pub fn default_timeout_ms(self) -> u64 {
        match self {
            ProbeKind::TcpConnect => 1500,
            ProbeKind::ProxyLiveness | ProbeKind::ProxyHandshake => 3000,
        }
    }

    pub fn default_inter_batch_delay_ms(self) -> u64 {
        match self {
            ProbeKind::TcpConnect => 0,
            ProbeKind::ProxyLiveness | ProbeKind::ProxyHandshake => 200,
        }
    }
}

/// Immutable settings for one run.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub concurrency: usize,
    pub per_attempt_timeout_ms: u64,
    pub inter_batch_delay_ms: u64,
    pub probe_kind: ProbeKind,
    /// Endpoint requested through each proxy by [`ProbeKind::ProxyLiveness`].
    pub check_url: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::for_kind(ProbeKind::default())
    }
}

impl BatchConfig {
    pub fn for_kind(kind: ProbeKind) -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            per_attempt_timeout_ms: kind.default_timeout_ms(),
            inter_batch_delay_ms: kind.default_inter_batch_delay_ms(),
            probe_kind: kind,
            check_url: DEFAULT_CHECK_URL.to_string(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.per_attempt_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.probe_kind == ProbeKind::ProxyLiveness {
            let url = reqwest::Url::parse(&self.check_url).map_err(|e| {
                ConfigError::InvalidCheckUrl {
                    url: self.check_url.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidCheckUrl {
                    url: self.check_url.clone(),
                    reason: format!("unsupported scheme {}", url.scheme()),
                });
            }
        }
        Ok(())
    }

    /// Worst-case wall clock for a run over `targets` entries.
    pub fn run_deadline(&self, targets: usize) -> Duration {
        let groups = targets.div_ceil(self.concurrency.max(1)) as u32;
        (self.timeout() + PROBE_GRACE + self.inter_batch_delay()) * groups
    }
}

/// On-disk shape: every field optional, missing ones take the per-kind defaults.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub concurrency: Option<usize>,
    pub per_attempt_timeout_ms: Option<u64>,
    pub inter_batch_delay_ms: Option<u64>,
    pub probe_kind: Option<ProbeKind>,
    pub check_url: Option<String>,
}

impl ConfigFile {
    pub fn into_config(self) -> BatchConfig {
        let mut cfg = BatchConfig::for_kind(self.probe_kind.unwrap_or_default());
        if let Some(c) = self.concurrency {
            cfg.concurrency = c;
        }
        if let Some(t) = self.per_attempt_timeout_ms {
            cfg.per_attempt_timeout_ms = t;
        }
        if let Some(d) = self.inter_batch_delay_ms {
            cfg.inter_batch_delay_ms = d;
        }
        if let Some(u) = self.check_url {
            cfg.check_url = u;
        }
        cfg
    }
}

pub fn parse_config_str(s: &str) -> Result<ConfigFile, serde_json::Error> {
    serde_json::from_str(s)
}

/// Read a JSON config file. The result is not validated yet.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<ConfigFile, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&content).map_err(|source| ConfigError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
