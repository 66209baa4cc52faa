//! CLI argument parsing for numatool

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for topology trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Column-aligned text with repeated labels suppressed (default)
    Text,
    /// Nested JSON object keyed by branch label
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "numatool")]
#[command(version)]
#[command(about = "NUMA topology reporting and machine spec conversion", long_about = None)]
pub struct Cli {
    /// Read the topology dump from a file instead of the topology_dump
    /// environment variable
    #[arg(short = 't', long = "topology-dump", value_name = "FILE", global = true)]
    pub topology_dump: Option<PathBuf>,

    /// Read the res_allowed dump from a file instead of the res_allowed
    /// environment variable
    #[arg(short = 'r', long = "res-allowed", value_name = "FILE", global = true)]
    pub res_allowed: Option<PathBuf>,

    /// Output format for topology trees
    #[arg(short = 'o', long = "output", value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Print parser diagnostics to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the CPU topology tree (package/die/node/core/thread/cpu)
    Cpus,
    /// Print the topology tree with memory nodes included
    Res,
    /// Print the CPU tree with owning processes attached from a res_allowed
    /// dump
    CpusAllowed,
    /// Print the full tree with owning processes attached from a res_allowed
    /// dump
    ResAllowed,
    /// Convert a machine spec (JSON) into QEMU command line options
    QemuOpts {
        /// Spec file, stdin when omitted
        file: Option<PathBuf>,
    },
    /// Rebuild a machine spec from `numactl -H` output
    FromNumactl {
        /// Listing file, stdin when omitted
        file: Option<PathBuf>,
    },
    /// Print the bash command that captures a topology dump on a live host
    BashTopologyDump,
    /// Print the bash command that captures a res_allowed dump for the given
    /// process name patterns
    BashResAllowed {
        #[arg(value_name = "PROCESS")]
        processes: Vec<String>,
    },
}
