use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use log::info;
use nfassign_core::{CollectStats, Dimensioning, RunId};
use pcap_frontend::PcapTrace;
use rand::Rng;

use crate::{run_path, Error, TraceConfig, ValidConfig};

/// What was produced for one trace.
#[derive(Debug, Clone)]
pub struct TraceSummary {
    /// The trace.
    pub pcap: PathBuf,
    /// Number of flows in the trace.
    pub nr_flows: usize,
    /// Number of packets in the trace.
    pub nr_pkts: u64,
    /// Collection statistics.
    pub stats: CollectStats,
    /// The required capacity of every run.
    pub dimensionings: Vec<Dimensioning>,
}

/// Collects runs for one trace and writes its per-packet instruction counts, dimensioning and
/// info files. Parent directories of the outputs are created as needed. `on_commit` is called
/// after every committed run.
pub fn process_trace<R, F>(
    trace: &TraceConfig,
    config: &ValidConfig,
    rng: &mut R,
    on_commit: F,
) -> Result<TraceSummary, Error>
where
    R: Rng + ?Sized,
    F: FnMut(RunId, &CollectStats),
{
    info!("processing {}", trace.pcap.display());
    let source = PcapTrace::open(&trace.pcap)?;
    let collection =
        nfassign_core::run_with(&source, &config.actions, &config.opts, rng, on_commit)?;
    let exporter = collection.exporter(&config.actions)?;

    let mut sinks = (0..exporter.nr_runs())
        .map(|i| create(run_path(&trace.ipp_out, RunId::new(i))))
        .collect::<Result<Vec<_>, _>>()?;
    let nr_pkts = exporter.write_instructions(&source, &mut sinks)?;
    info!(
        "wrote instruction counts of {nr_pkts} packets for {} runs",
        sinks.len()
    );
    exporter.write_dimensioning(create(&trace.dimensioning_out)?)?;
    exporter.write_info(create(&trace.info_out)?)?;

    Ok(TraceSummary {
        pcap: trace.pcap.clone(),
        nr_flows: collection.table.nr_flows(),
        nr_pkts,
        stats: collection.stats,
        dimensionings: exporter.dimensionings(),
    })
}

fn create(path: impl AsRef<Path>) -> io::Result<BufWriter<File>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}
