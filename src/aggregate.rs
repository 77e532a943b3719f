use crate::types::{ProbeOutcome, Summary};

/// Reduce outcomes into counts and the mean latency of healthy targets.
///
/// Works on partial result sets as well as final ones. The average is `0.0`
/// when nothing is healthy.
pub fn summarize(results: &[ProbeOutcome]) -> Summary {
    let (healthy, latency_sum) = results
        .iter()
        .filter(|o| o.healthy)
        .fold((0u64, 0u64), |(n, sum), o| (n + 1, sum + u64::from(o.latency_ms)));

    let average = if healthy == 0 {
        0.0
    } else {
        latency_sum as f64 / healthy as f64
    };

    Summary {
        healthy_count: healthy,
        unhealthy_count: results.len() as u64 - healthy,
        average_latency_ms_of_healthy: average,
    }
}
