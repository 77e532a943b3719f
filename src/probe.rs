//! Probe implementations: one reachability or liveness check against one target.
//!
//! Every probe settles into a [`ProbeOutcome`]; transport failures are classified,
//! never returned as errors. Each probe bounds its own I/O with the timeout it is
//! given, and the scheduler races it against that timeout again.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Proxy};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::config::{BatchConfig, ProbeKind};
use crate::types::{ProbeOutcome, Target};

/// A pluggable reachability check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe `target`, settling within `timeout`.
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome;
}

/// Build the built-in probe selected by `config.probe_kind`.
pub fn probe_for_kind(config: &BatchConfig) -> Arc<dyn Probe> {
    match config.probe_kind {
        ProbeKind::TcpConnect => Arc::new(TcpConnectProbe),
        ProbeKind::ProxyLiveness => Arc::new(ProxyLivenessProbe::new(config.check_url.clone())),
        ProbeKind::ProxyHandshake => Arc::new(ProxyHandshakeProbe),
    }
}

/// Raw TCP connect. Open on connect, closed on refused/reset, timed out otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

#[async_trait]
impl Probe for TcpConnectProbe {
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        match time::timeout(timeout, TcpStream::connect((target.host.as_str(), target.port))).await
        {
            Ok(Ok(stream)) => {
                let latency = start.elapsed();
                drop(stream);
                ProbeOutcome::open(target, latency)
            }
            Ok(Err(e)) => classify_io_error(target, start.elapsed(), &e),
            Err(_) => ProbeOutcome::timed_out(target, start.elapsed()),
        }
    }
}

/// Request line written by [`ProxyHandshakeProbe`].
pub const HANDSHAKE: &[u8] = b"HEAD / HTTP/1.1\r\nHost: www.google.com\r\n\r\n";

/// Connects to the proxy and writes one HTTP request.
///
/// Succeeds as soon as the bytes are accepted; a proxy that then drops or
/// filters the request still counts as healthy. Use [`ProxyLivenessProbe`]
/// when the proxy has to actually forward traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyHandshakeProbe;

#[async_trait]
impl Probe for ProxyHandshakeProbe {
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let attempt = async {
            let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
            stream.write_all(HANDSHAKE).await?;
            stream.flush().await?;
            // Best effort; the stream is dropped right after either way.
            let _ = stream.shutdown().await;
            Ok::<(), io::Error>(())
        };
        match time::timeout(timeout, attempt).await {
            Ok(Ok(())) => ProbeOutcome::open(target, start.elapsed()),
            Ok(Err(e)) => classify_io_error(target, start.elapsed(), &e),
            Err(_) => ProbeOutcome::timed_out(target, start.elapsed()),
        }
    }
}

/// Sends `HEAD check_url` through the target as a proxy.
///
/// Healthy only when a 2xx (including 204) response comes back in time.
#[derive(Debug, Clone)]
pub struct ProxyLivenessProbe {
    check_url: String,
}

impl ProxyLivenessProbe {
    pub fn new(check_url: impl Into<String>) -> Self {
        Self {
            check_url: check_url.into(),
        }
    }

    pub fn check_url(&self) -> &str {
        &self.check_url
    }

    fn client_for(&self, proxy: &str, timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .proxy(Proxy::all(proxy)?)
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(Policy::none())
            .pool_max_idle_per_host(0)
            .build()
    }
}

/// Schemes the HTTP client can route a request through.
pub const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// URL handed to the HTTP client as the proxy for `target`.
///
/// URL-shaped targets are used verbatim so credentials and `socks5://` survive.
/// `None` for schemes that cannot act as a proxy: the client would silently send
/// the request direct instead.
pub fn proxy_url(target: &Target) -> Option<String> {
    match target.scheme.as_deref() {
        None => Some(format!("http://{}", target.authority())),
        Some(s) if PROXY_SCHEMES.contains(&s) => Some(target.raw.clone()),
        Some(_) => None,
    }
}

#[async_trait]
impl Probe for ProxyLivenessProbe {
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let Some(proxy) = proxy_url(target) else {
            let scheme = target.scheme.as_deref().unwrap_or_default();
            return ProbeOutcome::error(
                target,
                start.elapsed(),
                format!("unsupported proxy scheme {scheme}"),
            );
        };
        let client = match self.client_for(&proxy, timeout) {
            Ok(c) => c,
            Err(e) => return ProbeOutcome::error(target, start.elapsed(), format!("proxy setup: {e}")),
        };

        // The client is dropped on every path below, closing its connection.
        let sent = time::timeout(timeout, client.head(&self.check_url).send()).await;
        let latency = start.elapsed();
        match sent {
            Ok(Ok(resp)) => {
                let status = resp.status();
                if status.is_success() {
                    ProbeOutcome::open(target, latency).with_detail(format!("status {}", status.as_u16()))
                } else {
                    ProbeOutcome::error(target, latency, format!("status {}", status.as_u16()))
                }
            }
            Ok(Err(e)) if e.is_timeout() => ProbeOutcome::timed_out(target, latency),
            Ok(Err(e)) => match find_io_error(&e) {
                Some(io_err) if is_refusal(io_err) => {
                    ProbeOutcome::closed(target, latency, io_err.to_string())
                }
                _ => ProbeOutcome::error(target, latency, error_chain(&e)),
            },
            Err(_) => ProbeOutcome::timed_out(target, latency),
        }
    }
}

fn classify_io_error(target: &Target, latency: Duration, e: &io::Error) -> ProbeOutcome {
    if is_refusal(e) {
        ProbeOutcome::closed(target, latency, e.to_string())
    } else if e.kind() == io::ErrorKind::TimedOut {
        ProbeOutcome::timed_out(target, latency)
    } else {
        ProbeOutcome::error(target, latency, e.to_string())
    }
}

fn is_refusal(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

fn find_io_error<'a>(e: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        cur = err.source();
    }
    None
}

fn error_chain(e: &(dyn StdError + 'static)) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(err) = cur {
        out.push_str(": ");
        out.push_str(&err.to_string());
        cur = err.source();
    }
    out
}
