//! The commands of the `nfassign` binary.

#![warn(unreachable_pub, missing_debug_implementations)]

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use nfassign::core::toeplitz::write_hashes;
use nfassign::core::write_packet_ids;
use nfassign::pcap::PcapTrace;
use nfassign::utils::{process_trace, read_config, TraceSummary};
use rand::prelude::*;

/// Command-line settings that take precedence over the configuration file.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    /// Seed of the run generator.
    pub seed: Option<u64>,
    /// Upper bound on assignment attempts per trace.
    pub max_attempts: Option<u64>,
}

/// Processes every trace of the configuration at `config`.
pub fn assign(
    config: &Path,
    overrides: Overrides,
    progress: bool,
) -> anyhow::Result<Vec<TraceSummary>> {
    let mut config = read_config(config)
        .with_context(|| format!("failed to read config {}", config.display()))?;
    if overrides.seed.is_some() {
        config.seed = overrides.seed;
    }
    if overrides.max_attempts.is_some() {
        config.max_attempts = overrides.max_attempts;
    }
    let config = config.validate().context("invalid config")?;
    let seed = config.seed.unwrap_or_else(rand::random);
    info!("seeding run generator with {seed}");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut summaries = Vec::with_capacity(config.traces.len());
    for trace in &config.traces {
        let bar = if progress {
            ProgressBar::new(config.opts.nr_runs as u64)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} runs {msg}")?
                .progress_chars("=> "),
        );
        bar.set_prefix(trace.pcap.display().to_string());
        let summary = process_trace(trace, &config, &mut rng, |_, stats| {
            bar.set_position(stats.runs as u64);
            bar.set_message(format!("({} attempts)", stats.attempts));
        })
        .with_context(|| format!("failed to process {}", trace.pcap.display()))?;
        bar.finish_and_clear();
        info!(
            "{}: {} flows, {} packets, {} runs after {} attempts",
            summary.pcap.display(),
            summary.nr_flows,
            summary.nr_pkts,
            summary.stats.runs,
            summary.stats.attempts
        );
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Writes `<flow id>:<packet id>` for every packet of the trace at `pcap`.
pub fn flow_ids(pcap: &Path, w: impl Write) -> anyhow::Result<()> {
    let trace = open(pcap)?;
    let table = write_packet_ids(&trace, w)
        .with_context(|| format!("failed to identify packets of {}", pcap.display()))?;
    info!("identified {} flows", table.nr_flows());
    Ok(())
}

/// Writes the i40e Toeplitz hash of every packet of the trace at `pcap`.
pub fn toeplitz(pcap: &Path, trace_id: u8, w: impl Write) -> anyhow::Result<()> {
    let trace = open(pcap)?;
    let nr_pkts = write_hashes(&trace, trace_id, w)
        .with_context(|| format!("failed to hash packets of {}", pcap.display()))?;
    info!("hashed {nr_pkts} packets");
    Ok(())
}

fn open(pcap: &Path) -> anyhow::Result<PcapTrace> {
    PcapTrace::open(pcap).with_context(|| format!("failed to open {}", pcap.display()))
}
