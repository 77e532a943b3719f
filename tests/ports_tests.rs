use reach_probe::ports::{host_port_targets, parse_ports_str, well_known_ports};
use reach_probe::target::parse_target;

#[test]
fn parse_single_and_ranges() {
    let ports = parse_ports_str("22, 80,443,8000-8002,8001").expect("parse ok");
    // Dedup, preserve order of first appearance
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn invalid_port_rejected() {
    assert!(parse_ports_str("0").is_err());
}

#[test]
fn well_known_expansion_parses_back() {
    let lines = host_port_targets("scanme.local", &well_known_ports());
    assert_eq!(lines.len(), 9);
    for (line, port) in lines.iter().zip(well_known_ports()) {
        let t = parse_target(line).expect("generated targets parse");
        assert_eq!(t.host, "scanme.local");
        assert_eq!(t.port, port);
    }
}
