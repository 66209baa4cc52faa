use anyhow::{bail, Context, Result};
use clap::Parser;
use numatool::cli::{Cli, Command, OutputFormat};
use numatool::groups::parse_groups;
use numatool::topology::Topology;
use numatool::tree::TopologyTree;
use numatool::{numactl, owners, qemu, topology};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Resolve a dump: the file option wins, then the environment variable set
/// from a capture snippet run on the host being inspected.
fn load_dump(file: Option<&Path>, what: &str, env_var: &str, capture: &str) -> Result<String> {
    if let Some(path) = file {
        return fs::read_to_string(path)
            .with_context(|| format!("cannot read {} from file {}", what, path.display()));
    }
    if let Ok(dump) = std::env::var(env_var) {
        return Ok(dump);
    }
    bail!(
        "no {} given: pass a file option, set the {} environment variable, \
         or capture one with the {} subcommand",
        what,
        env_var,
        capture
    )
}

/// Read a spec or listing from a file argument, stdin when absent
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("cannot read input from file {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("cannot read stdin")?;
            Ok(input)
        }
    }
}

fn output_tree(tree: &TopologyTree, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", tree.render_text()),
        OutputFormat::Json => {
            print!("{}", serde_json::to_string(tree)?);
            std::io::stdout().flush()?;
        }
    }
    Ok(())
}

fn load_topology_dump(args: &Cli) -> Result<String> {
    load_dump(
        args.topology_dump.as_deref(),
        "topology dump",
        "topology_dump",
        "bash-topology-dump",
    )
}

fn load_res_allowed_dump(args: &Cli) -> Result<String> {
    load_dump(
        args.res_allowed.as_deref(),
        "res_allowed dump",
        "res_allowed",
        "bash-res-allowed",
    )
}

fn run(args: &Cli) -> Result<()> {
    match &args.command {
        Command::Cpus => {
            let topology = Topology::from_dump_cpus(&load_topology_dump(args)?)?;
            output_tree(&topology.tree, args.output)
        }
        Command::Res => {
            let topology = Topology::from_dump(&load_topology_dump(args)?)?;
            output_tree(&topology.tree, args.output)
        }
        Command::CpusAllowed | Command::ResAllowed => {
            let dump = load_topology_dump(args)?;
            let mut topology = if matches!(args.command, Command::CpusAllowed) {
                Topology::from_dump_cpus(&dump)?
            } else {
                Topology::from_dump(&dump)?
            };
            let owner_masks = owners::parse_res_allowed(&load_res_allowed_dump(args)?);
            owners::attach_owners(&mut topology, &owner_masks);
            output_tree(&topology.tree, args.output)
        }
        Command::QemuOpts { file } => {
            let input = read_input(file.as_deref())?;
            let spec: serde_json::Value =
                serde_json::from_str(&input).context("machine spec is not valid JSON")?;
            let groups = parse_groups(&spec)?;
            println!("{}", qemu::qemu_options(&groups)?);
            Ok(())
        }
        Command::FromNumactl { file } => {
            let input = read_input(file.as_deref())?;
            println!("{}", numactl::to_spec(&input)?);
            Ok(())
        }
        Command::BashTopologyDump => {
            println!("{}", topology::BASH_TOPOLOGY_DUMP);
            Ok(())
        }
        Command::BashResAllowed { processes } => {
            println!("{}", owners::bash_res_allowed(processes));
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);
    run(&args)
}
