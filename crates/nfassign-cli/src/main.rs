use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nfassign_cli::Overrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign actions to the flows of every configured trace and write per-run metrics
    Assign {
        /// Configuration file (JSON or Dhall)
        #[arg(short, long)]
        config: PathBuf,

        /// Random seed, overriding the configuration
        #[arg(short, long)]
        seed: Option<u64>,

        /// Maximum assignment attempts per trace, overriding the configuration
        #[arg(long)]
        max_attempts: Option<u64>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Print "<flow id>:<packet id>" for every packet of a trace
    FlowIds {
        /// The pcap trace
        #[arg(short, long)]
        pcap: PathBuf,
    },

    /// Print the RSS Toeplitz hash (Intel i40e key) of every packet of a trace
    Toeplitz {
        /// The pcap trace
        #[arg(short, long)]
        pcap: PathBuf,

        /// Trace ID mixed into every hash
        #[arg(short, long, default_value_t = 0)]
        trace_id: u8,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.command {
        Command::Assign {
            config,
            seed,
            max_attempts,
            no_progress,
        } => {
            let overrides = Overrides { seed, max_attempts };
            nfassign_cli::assign(&config, overrides, !no_progress)?;
        }
        Command::FlowIds { pcap } => {
            nfassign_cli::flow_ids(&pcap, BufWriter::new(io::stdout().lock()))?;
        }
        Command::Toeplitz { pcap, trace_id } => {
            nfassign_cli::toeplitz(&pcap, trace_id, BufWriter::new(io::stdout().lock()))?;
        }
    }
    Ok(())
}
