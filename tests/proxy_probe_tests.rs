use std::sync::Arc;
use std::time::Duration;

use reach_probe::config::ProbeKind;
use reach_probe::target::parse_target;
use reach_probe::{BatchConfig, Classification, Probe, Prober, ProxyLivenessProbe};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

const CHECK_URL: &str = "http://check.invalid/generate_204";

/// Minimal HTTP proxy stand-in: reads one request head and answers with `response`.
/// `None` accepts and then never answers.
async fn stub_proxy(response: Option<&'static str>) -> (u16, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = sock.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        match response {
            Some(resp) => {
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
            None => tokio::time::sleep(Duration::from_secs(30)).await,
        }
        String::from_utf8_lossy(&buf).into_owned()
    });
    (port, task)
}

#[tokio::test]
async fn proxy_answering_204_is_healthy() {
    let (port, server) =
        stub_proxy(Some("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")).await;
    let target = parse_target(&format!("127.0.0.1:{port}")).unwrap();

    let out = ProxyLivenessProbe::new(CHECK_URL)
        .probe(&target, Duration::from_secs(3))
        .await;

    assert!(out.healthy, "{out:?}");
    assert_eq!(out.classification, Classification::Open);
    let request = server.await.unwrap();
    assert!(request.starts_with("HEAD http://check.invalid/generate_204 HTTP/1.1"));
}

#[tokio::test]
async fn proxy_error_status_is_unhealthy() {
    let (port, _server) =
        stub_proxy(Some("HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")).await;
    let target = parse_target(&format!("http://127.0.0.1:{port}")).unwrap();

    let out = ProxyLivenessProbe::new(CHECK_URL)
        .probe(&target, Duration::from_secs(3))
        .await;

    assert!(!out.healthy);
    assert_eq!(out.classification, Classification::Error);
    assert_eq!(out.detail.as_deref(), Some("status 502"));
}

#[tokio::test]
async fn silent_proxy_times_out() {
    let (port, server) = stub_proxy(None).await;
    let target = parse_target(&format!("127.0.0.1:{port}")).unwrap();
    let started = Instant::now();

    let out = ProxyLivenessProbe::new(CHECK_URL)
        .probe(&target, Duration::from_millis(200))
        .await;

    assert!(!out.healthy);
    assert_eq!(out.classification, Classification::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(2));
    server.abort();
}

#[tokio::test]
async fn refused_proxy_is_not_healthy() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let target = parse_target(&format!("127.0.0.1:{port}")).unwrap();

    let out = ProxyLivenessProbe::new(CHECK_URL)
        .probe(&target, Duration::from_secs(2))
        .await;

    assert!(!out.healthy);
    assert!(matches!(
        out.classification,
        Classification::Closed | Classification::Error
    ));
}

#[tokio::test]
async fn proxy_batch_mixes_live_dead_and_invalid() {
    let (live, _a) =
        stub_proxy(Some("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")).await;
    let (dead, _b) =
        stub_proxy(Some("HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n"))
            .await;

    let mut cfg = BatchConfig::for_kind(ProbeKind::ProxyLiveness);
    cfg.check_url = CHECK_URL.into();
    cfg.per_attempt_timeout_ms = 2000;
    cfg.inter_batch_delay_ms = 10;
    cfg.concurrency = 2;

    let report = Prober::from_config(cfg)
        .run(
            vec![
                format!("127.0.0.1:{live}"),
                "garbage line".into(),
                format!("127.0.0.1:{dead}"),
            ],
            None,
        )
        .await
        .unwrap();

    let classes: Vec<_> = report.results.iter().map(|o| o.classification).collect();
    assert_eq!(
        classes,
        vec![
            Classification::Open,
            Classification::Invalid,
            Classification::Error
        ]
    );
    assert_eq!(report.summary.healthy_count, 1);
    assert_eq!(report.summary.unhealthy_count, 2);
}

#[tokio::test]
async fn handshake_kind_counts_any_accepting_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _server = tokio::spawn(async move {
        loop {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut sink = Vec::new();
                let _ = sock.read_to_end(&mut sink).await;
            }
        }
    });

    let mut cfg = BatchConfig::for_kind(ProbeKind::ProxyHandshake);
    cfg.inter_batch_delay_ms = 0;
    let report = Prober::new(
        Arc::new(reach_probe::ProxyHandshakeProbe),
        cfg,
    )
    .run(vec![format!("127.0.0.1:{port}")], None)
    .await
    .unwrap();

    assert_eq!(report.summary.healthy_count, 1);
}

#[tokio::test]
async fn non_proxy_scheme_never_bypasses_dead_target() {
    // A reachable origin answering 204 to anything: a request sent direct would look healthy.
    let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin_port = origin.local_addr().unwrap().port();
    let _origin = tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = origin.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut chunk = [0u8; 1024];
                let _ = sock.read(&mut chunk).await;
                let _ = sock
                    .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
                    .await;
            });
        }
    });

    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);

    let mut cfg = BatchConfig::for_kind(ProbeKind::ProxyLiveness);
    cfg.check_url = format!("http://127.0.0.1:{origin_port}/generate_204");
    cfg.per_attempt_timeout_ms = 2000;
    cfg.concurrency = 3;

    let report = Prober::from_config(cfg)
        .run(
            vec![
                format!("127.0.0.1:{dead_port}"),
                format!("ftp://127.0.0.1:{dead_port}"),
                format!("tcp://127.0.0.1:{dead_port}"),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(report.summary.healthy_count, 0, "{:?}", report.results);
    for o in &report.results[1..] {
        assert_eq!(o.classification, Classification::Error);
        assert!(o
            .detail
            .as_deref()
            .is_some_and(|d| d.starts_with("unsupported proxy scheme")));
    }
}
