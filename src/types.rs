use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One endpoint to probe, parsed once from a raw `host:port` or `scheme://host:port` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// The line as the caller supplied it (trimmed). May carry proxy credentials:
    /// only used to build the proxy URL.
    pub raw: String,
    /// `raw` with any userinfo password masked. Used in outcomes, reports and logs.
    pub display: String,
    /// Lowercased scheme when the line was URL-shaped, e.g. `http` or `socks5`.
    pub scheme: Option<String>,
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl Target {
    /// `host:port` with IPv6 hosts bracketed, suitable for display and URL building.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Open,
    Closed,
    Invalid,
    TimedOut,
    Error,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Open => "open",
            Classification::Closed => "closed",
            Classification::Invalid => "invalid",
            Classification::TimedOut => "timedOut",
            Classification::Error => "error",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Settled result of one probe attempt. Built once, never mutated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    /// Target line this outcome belongs to, with credentials masked.
    pub target: String,
    pub healthy: bool,
    pub latency_ms: u32,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn new(target: &Target, classification: Classification, latency: Duration) -> Self {
        Self {
            target: target.display.clone(),
            healthy: classification == Classification::Open,
            latency_ms: millis_u32(latency),
            classification,
            detail: None,
        }
    }

    pub fn open(target: &Target, latency: Duration) -> Self {
        Self::new(target, Classification::Open, latency)
    }

    pub fn closed(target: &Target, latency: Duration, detail: impl Into<String>) -> Self {
        Self::new(target, Classification::Closed, latency).with_detail(detail)
    }

    pub fn timed_out(target: &Target, latency: Duration) -> Self {
        Self::new(target, Classification::TimedOut, latency).with_detail("timed out")
    }

    pub fn error(target: &Target, latency: Duration, detail: impl Into<String>) -> Self {
        Self::new(target, Classification::Error, latency).with_detail(detail)
    }

    /// A line that never reached a probe because it did not parse.
    pub fn invalid(raw: &str, detail: impl Into<String>) -> Self {
        Self {
            target: crate::target::redact_userinfo(raw.trim()),
            healthy: false,
            latency_ms: 0,
            classification: Classification::Invalid,
            detail: Some(detail.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Saturating conversion used for every latency the engine records.
pub fn millis_u32(d: Duration) -> u32 {
    d.as_millis().min(u32::MAX as u128) as u32
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub healthy_count: u64,
    pub unhealthy_count: u64,
    pub average_latency_ms_of_healthy: f64,
}

/// Final, input-ordered outcome of one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub results: Vec<ProbeOutcome>,
    pub summary: Summary,
    /// Number of raw targets handed to the run, attempted or not.
    pub total_targets: u64,
    pub cancelled: bool,
    pub started_at: String,
    pub finished_at: String,
}

/// Emitted once per settled group.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub processed_count: u64,
    pub total_count: u64,
    pub new_outcomes: Vec<ProbeOutcome>,
    /// Summary over everything processed so far.
    pub summary: Summary,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
}
