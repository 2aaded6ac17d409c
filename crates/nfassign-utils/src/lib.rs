//! Utilities for driving `nfassign` from configuration files.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::path::{Path, PathBuf};

use nfassign_core::{ActionError, ActionSet, ActionSpec, RunId, RunOpts};

mod driver;

pub use driver::{process_trace, TraceSummary};

/// The placeholder in output paths that is replaced by the run index.
pub const RUN_PLACEHOLDER: &str = "${r}";

/// Reads a [`Config`] from a file in JSON or Dhall format.
pub fn read_config(path: impl AsRef<Path>) -> Result<Config, Error> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        Some("dhall") => serde_dhall::from_str(&contents).parse().map_err(Box::new)?,
        _ => return Err(Error::UnknownFileType(path.as_ref().into())),
    };
    Ok(config)
}

/// Replaces every run placeholder in `template` with `run`.
pub fn run_path(template: &str, run: RunId) -> PathBuf {
    template.replace(RUN_PLACEHOLDER, &run.to_string()).into()
}

/// An assignment configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// The traces to process, each with its own outputs.
    pub traces: Vec<TraceConfig>,
    /// The actions, identified by their position.
    pub actions: Vec<ActionSpec>,
    /// Number of runs per trace.
    pub n_runs: usize,
    /// Accepted deviation of a realized share from its target.
    pub max_err: f64,
    /// Seed of the run generator. Drawn from the OS if absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Upper bound on assignment attempts per trace. Unbounded if absent.
    #[serde(default)]
    pub max_attempts: Option<u64>,
    /// Assignment attempts generated concurrently. One per CPU if absent.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// The input and outputs of one trace.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TraceConfig {
    /// The pcap trace.
    pub pcap: PathBuf,
    /// Per-packet instruction counts, one file per run. Must contain [`RUN_PLACEHOLDER`] when
    /// more than one run is collected.
    pub ipp_out: String,
    /// Required capacity, one line per run.
    pub dimensioning_out: PathBuf,
    /// Bytes per action, one line per run.
    pub info_out: PathBuf,
}

impl Config {
    /// Validates the configuration.
    pub fn validate(self) -> Result<ValidConfig, Error> {
        let actions = ActionSet::new(self.actions)?;
        if !self.max_err.is_finite() || self.max_err < 0.0 {
            return Err(Error::InvalidTolerance(self.max_err));
        }
        if self.n_runs == 0 {
            return Err(Error::NoRuns);
        }
        if self.n_runs > 1 {
            if let Some(t) = self
                .traces
                .iter()
                .find(|t| !t.ipp_out.contains(RUN_PLACEHOLDER))
            {
                return Err(Error::MissingRunPlaceholder(t.ipp_out.clone()));
            }
        }
        let opts = match self.batch_size {
            Some(batch_size) => RunOpts::builder()
                .nr_runs(self.n_runs)
                .max_err(self.max_err)
                .max_attempts(self.max_attempts)
                .batch_size(batch_size)
                .build(),
            None => RunOpts::builder()
                .nr_runs(self.n_runs)
                .max_err(self.max_err)
                .max_attempts(self.max_attempts)
                .build(),
        };
        Ok(ValidConfig {
            traces: self.traces,
            actions,
            opts,
            seed: self.seed,
        })
    }
}

/// A validated [`Config`].
#[derive(Debug, Clone)]
pub struct ValidConfig {
    /// The traces to process.
    pub traces: Vec<TraceConfig>,
    /// The validated actions.
    pub actions: ActionSet,
    /// Run collection options.
    pub opts: RunOpts,
    /// Seed of the run generator.
    pub seed: Option<u64>,
}

/// Error kinds for configurations and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// Invalid actions.
    #[error("invalid actions")]
    Actions(#[from] ActionError),

    /// Invalid share tolerance.
    #[error("max_err must be a non-negative number (got {0})")]
    InvalidTolerance(f64),

    /// Zero runs requested.
    #[error("n_runs must be at least 1")]
    NoRuns,

    /// Several runs would write the same per-packet output.
    #[error("ipp_out {0:?} must contain ${{r}} when collecting several runs")]
    MissingRunPlaceholder(String),

    /// Error reading a trace.
    #[error("failed to read trace")]
    Pcap(#[from] pcap_frontend::Error),

    /// Error collecting runs.
    #[error("failed to collect runs")]
    Run(#[from] nfassign_core::Error),

    /// Error exporting metrics.
    #[error("failed to export metrics")]
    Export(#[from] nfassign_core::ExportError),
}
