use anyhow::{bail, Context, Result};

/// Ports checked by a single-host port scan when the caller does not pick any.
pub fn well_known_ports() -> Vec<u16> {
    const WELL_KNOWN: &[u16] = &[21, 22, 25, 53, 80, 443, 3306, 5432, 8080];
    WELL_KNOWN.to_vec()
}

/// Service label shown next to a port in scan output.
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "FTP",
        22 => "SSH",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        443 => "HTTPS",
        3306 => "MySQL",
        5432 => "PostgreSQL",
        8080 => "Web Alt",
        _ => "Unknown",
    }
}

/// Parse a comma-separated list of ports and inclusive ranges into a deduplicated list.
///
/// Example: `22,80,8000-8002`. Order of first appearance is preserved.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((a, b)) = part.split_once('-') {
            let start = parse_port_str(a.trim())
                .with_context(|| format!("invalid start in range: {part}"))?;
            let end = parse_port_str(b.trim())
                .with_context(|| format!("invalid end in range: {part}"))?;
            if start > end {
                bail!("invalid range {start}-{end} (start > end)");
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port_str(part).with_context(|| format!("invalid port value: {part}"))?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

/// Expand one host and a port list into raw `host:port` target lines.
pub fn host_port_targets(host: &str, ports: &[u16]) -> Vec<String> {
    let host = host.trim();
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    ports.iter().map(|p| format!("{host}:{p}")).collect()
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
