use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reach_probe::config::{load_config_from_path, BatchConfig, ConfigFile, ProbeKind};
use reach_probe::types::Report;
use reach_probe::{ports, target, Prober};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    /// Plain TCP connect
    Tcp,
    /// HEAD request through the target as a proxy; healthy on 2xx
    ProxyLiveness,
    /// TCP connect and write one HTTP request to the target
    ProxyHandshake,
}

impl From<KindArg> for ProbeKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Tcp => ProbeKind::TcpConnect,
            KindArg::ProxyLiveness => ProbeKind::ProxyLiveness,
            KindArg::ProxyHandshake => ProbeKind::ProxyHandshake,
        }
    }
}

/// reach-probe: bounded-concurrency reachability and proxy liveness checks.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reach-probe",
    version,
    about = "Bounded-concurrency reachability and proxy liveness checks with live progress.",
    long_about = None
)]
struct Cli {
    /// Raw targets (`host:port` or `scheme://host:port`).
    targets: Vec<String>,

    /// File with newline-delimited targets (`#` comments and blank lines ignored).
    #[arg(long = "targets-file", value_name = "FILE")]
    targets_file: Option<PathBuf>,

    /// Scan one host; combined with --ports (default: well-known ports).
    #[arg(long)]
    host: Option<String>,

    /// Ports for --host: comma/range list, e.g. 22,80,8000-8010.
    #[arg(long, requires = "host")]
    ports: Option<String>,

    /// Probe kind.
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// JSON config file; flags given on the command line take precedence.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Probes per group (max in flight).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Pause between groups in milliseconds.
    #[arg(long = "delay-ms")]
    delay_ms: Option<u64>,

    /// URL requested through each proxy by the proxy-liveness probe.
    #[arg(long = "check-url")]
    check_url: Option<String>,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let targets = collect_targets(&cli)?;
    if targets.is_empty() {
        bail!("no targets given (pass targets, --targets-file or --host)");
    }

    info!(
        targets = targets.len(),
        kind = ?config.probe_kind,
        concurrency = config.concurrency,
        timeout_ms = config.per_attempt_timeout_ms,
        delay_ms = config.inter_batch_delay_ms,
        "configuration"
    );

    let prober = Prober::from_config(config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = prober.start(targets, Some(tx))?;

    // Ctrl-C stops the run after the in-flight group.
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing current group");
            cancel.cancel();
        }
    });

    let progress = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            info!(
                processed = ev.processed_count,
                total = ev.total_count,
                healthy = ev.summary.healthy_count,
                "progress"
            );
        }
    });

    let report = handle.report().await?;
    let _ = progress.await;

    print_results_table(&report, cli.host.is_some());
    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<BatchConfig> {
    let mut file = match cli.config.as_deref() {
        Some(path) => load_config_from_path(path)?,
        None => ConfigFile::default(),
    };
    // Kind is resolved first so unset fields take that kind's defaults.
    if let Some(kind) = cli.kind {
        file.probe_kind = Some(kind.into());
    }
    let mut config = file.into_config();
    if let Some(c) = cli.concurrency {
        config.concurrency = c;
    }
    if let Some(t) = cli.timeout_ms {
        config.per_attempt_timeout_ms = t;
    }
    if let Some(d) = cli.delay_ms {
        config.inter_batch_delay_ms = d;
    }
    if let Some(u) = cli.check_url.clone() {
        config.check_url = u;
    }
    config.validate()?;
    Ok(config)
}

fn collect_targets(cli: &Cli) -> Result<Vec<String>> {
    let mut out = cli.targets.clone();
    if let Some(path) = cli.targets_file.as_deref() {
        out.extend(target::load_targets_from_path(path)?);
    }
    if let Some(host) = cli.host.as_deref() {
        let port_list = match cli.ports.as_deref() {
            Some(list) => ports::parse_ports_str(list)?,
            None => ports::well_known_ports(),
        };
        out.extend(ports::host_port_targets(host, &port_list));
    }
    Ok(out)
}

fn print_results_table(report: &Report, show_service: bool) {
    let mut target_w = "target".len();
    let mut detail_w = "detail".len();
    for o in &report.results {
        target_w = target_w.max(o.target.len());
        if let Some(d) = &o.detail {
            detail_w = detail_w.max(d.len().min(60));
        }
    }
    let class_w = "classification".len();
    let lat_w = "latency_ms".len();
    let svc_w = if show_service { "PostgreSQL".len() } else { 0 };

    println!(
        "\nHealthy: {} / {} (avg latency {:.1} ms){}",
        report.summary.healthy_count,
        report.results.len(),
        report.summary.average_latency_ms_of_healthy,
        if report.cancelled { " [cancelled]" } else { "" }
    );
    println!(
        "{:<target_w$}  {:<class_w$}  {:>lat_w$}  {:<svc_w$}  {:<detail_w$}",
        "target",
        "classification",
        "latency_ms",
        if show_service { "service" } else { "" },
        "detail",
    );
    println!(
        "{:-<target_w$}  {:-<class_w$}  {:-<lat_w$}  {:-<svc_w$}  {:-<detail_w$}",
        "", "", "", "", "",
    );
    for o in &report.results {
        let service = if show_service {
            target::parse_target(&o.target)
                .map(|t| ports::service_name(t.port))
                .unwrap_or("")
        } else {
            ""
        };
        let mut detail = o.detail.clone().unwrap_or_default();
        if detail.len() > 60 {
            let mut cut = 60;
            while !detail.is_char_boundary(cut) {
                cut -= 1;
            }
            detail.truncate(cut);
        }
        println!(
            "{:<target_w$}  {:<class_w$}  {:>lat_w$}  {:<svc_w$}  {:<detail_w$}",
            o.target, o.classification, o.latency_ms, service, detail,
        );
    }
}

fn write_report_json(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
