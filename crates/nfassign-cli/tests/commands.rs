use std::fs::{self, File};
use std::net::Ipv4Addr;
use std::path::Path;
use std::process::Command;

use nfassign::core::{toeplitz, Nanosecs, PacketSource, PROTO_TCP};
use nfassign::pcap::{frames, LinkType, PcapTrace, PcapWriter, Resolution};
use nfassign_cli::Overrides;

// Three flows with packets in the order a b a c b a.
fn write_trace(path: &Path) -> anyhow::Result<()> {
    let frame = |host: u8, payload_len| {
        frames::ipv4(
            Ipv4Addr::new(192, 168, 0, host),
            Ipv4Addr::new(192, 168, 1, 1),
            PROTO_TCP,
            40_000 + u16::from(host),
            443,
            payload_len,
        )
    };
    let mut w = PcapWriter::new(File::create(path)?, LinkType::Raw, Resolution::Micros)?;
    for (i, host) in [1, 2, 1, 3, 2, 1].into_iter().enumerate() {
        w.write_frame(Nanosecs::new(i as u64 * 1_000_000), &frame(host, 500)?)?;
    }
    w.finish()?;
    Ok(())
}

#[test]
fn flow_ids_are_printed_per_packet() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pcap = dir.path().join("trace.pcap");
    write_trace(&pcap)?;
    let mut out = Vec::<u8>::new();
    nfassign_cli::flow_ids(&pcap, &mut out)?;
    assert_eq!(String::from_utf8(out)?, "0:0\n1:0\n0:1\n2:0\n1:1\n0:2\n");
    Ok(())
}

#[test]
fn toeplitz_hashes_are_printed_per_packet() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pcap = dir.path().join("trace.pcap");
    write_trace(&pcap)?;
    let mut out = Vec::<u8>::new();
    nfassign_cli::toeplitz(&pcap, 5, &mut out)?;
    let hashes = String::from_utf8(out)?
        .lines()
        .map(|l| l.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()?;
    let pkts = PcapTrace::open(&pcap)?
        .packets()?
        .collect::<Result<Vec<_>, _>>()?;
    let expected = pkts
        .iter()
        .map(|p| toeplitz::packet_hash(p, 5))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(hashes, expected);
    // Packets of one flow hash alike.
    assert_eq!(hashes[0], hashes[2]);
    assert_ne!(hashes[0], hashes[1]);
    Ok(())
}

#[test]
fn assign_writes_configured_outputs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pcap = dir.path().join("trace.pcap");
    write_trace(&pcap)?;
    let out = dir.path().join("out");
    let config = serde_json::json!({
        "traces": [{
            "pcap": pcap,
            "ipp_out": format!("{}/ipp_${{r}}.txt", out.display()),
            "dimensioning_out": out.join("dim.txt"),
            "info_out": out.join("info.txt"),
        }],
        "actions": [
            { "ipp_base": 100, "ipp_payload": 2, "share": 0.5 },
            { "ipp_base": 200, "ipp_payload": 1, "share": 0.5 },
        ],
        "n_runs": 2,
        "max_err": 0.2,
    });
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, config.to_string())?;
    let overrides = Overrides {
        seed: Some(3),
        max_attempts: Some(10_000),
    };
    let summaries = nfassign_cli::assign(&config_path, overrides, false)?;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].nr_flows, 3);
    assert_eq!(summaries[0].stats.runs, 2);
    for run in 0..2 {
        let ipp = fs::read_to_string(out.join(format!("ipp_{run}.txt")))?;
        // Every packet carries 500 payload bytes, so each costs 1100 or 700 instructions.
        assert!(ipp.lines().all(|l| l == "1100" || l == "700"));
        assert_eq!(ipp.lines().count(), 6);
    }
    assert_eq!(fs::read_to_string(out.join("dim.txt"))?.lines().count(), 2);
    let info = fs::read_to_string(out.join("info.txt"))?;
    assert!(info.starts_with("n_bytes_per_action,0,"));
    Ok(())
}

#[test]
fn invalid_config_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("config.json");
    let config = serde_json::json!({
        "traces": [],
        "actions": [{ "ipp_base": 1, "ipp_payload": 1, "share": 0.7 }],
        "n_runs": 1,
        "max_err": 0.1,
    });
    fs::write(&config_path, config.to_string())?;
    let err = nfassign_cli::assign(&config_path, Overrides::default(), false).unwrap_err();
    assert_eq!(err.to_string(), "invalid config");
    Ok(())
}

#[test]
fn binary_prints_flow_ids() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pcap = dir.path().join("trace.pcap");
    write_trace(&pcap)?;
    let output = Command::new(env!("CARGO_BIN_EXE_nfassign"))
        .arg("flow-ids")
        .arg("--pcap")
        .arg(&pcap)
        .output()?;
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "0:0\n1:0\n0:1\n2:0\n1:1\n0:2\n"
    );
    Ok(())
}

#[test]
fn binary_fails_on_missing_trace() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = Command::new(env!("CARGO_BIN_EXE_nfassign"))
        .args(["toeplitz", "--trace-id", "1", "--pcap"])
        .arg(dir.path().join("absent.pcap"))
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
