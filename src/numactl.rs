//! `numactl -H` conversion
//!
//! Parses hardware listings printed by `numactl -H` and rebuilds the machine
//! spec that would produce the same NUMA layout. Consecutive nodes with the
//! same CPU count and rounded memory size merge into one group, and the
//! distance table goes through matrix compaction so the spec carries
//! `node-dist` maps and a `dist` default instead of the full matrix whenever
//! that is shorter.
//!
//! Only three line shapes matter: `node N cpus: ...`, `node N size: S UNIT`
//! and the `N: d0 d1 ...` rows of the distance table. Everything else in the
//! listing (headers, free memory lines) is ignored.

use crate::compact;
use crate::distance::DistanceMatrix;
use crate::groups::{CoreKey, NumaGroup, ValidationError};
use crate::size::round_mb;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Failure while converting a `numactl -H` listing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumactlError {
    #[error("expected node {node} size, got {line:?}")]
    ExpectedNodeSize { node: usize, line: String },
    #[error("unsupported size unit in {line:?}")]
    UnsupportedUnit { line: String },
    #[error(transparent)]
    Compact(#[from] ValidationError),
}

/// One run of identical consecutive nodes from the listing
struct NodeRun {
    cpu: u64,
    mem: String,
    nodes: u64,
}

/// Convert a `numactl -H` listing to a machine spec JSON value
pub fn to_spec(listing: &str) -> Result<Value, NumactlError> {
    let (runs, rows) = parse_listing(listing)?;
    let groups: Vec<NumaGroup> = runs
        .iter()
        .map(|run| NumaGroup {
            cores: Some(run.cpu),
            core_key: CoreKey::Cpu,
            nodes: run.nodes,
            ..NumaGroup::default()
        })
        .collect();
    let dists = compact::compact(&groups, &DistanceMatrix::from_rows(rows))?;

    let mut items = Vec::with_capacity(runs.len());
    for (index, run) in runs.iter().enumerate() {
        let mut obj = Map::new();
        obj.insert("cpu".to_string(), run.cpu.into());
        obj.insert("mem".to_string(), Value::String(run.mem.clone()));
        if run.nodes != 1 {
            obj.insert("nodes".to_string(), run.nodes.into());
        }
        if let Some(map) = dists.node_dist.get(index) {
            if !map.is_empty() {
                let mut nd = Map::new();
                for (node, dist) in map {
                    nd.insert(node.to_string(), (*dist).into());
                }
                obj.insert("node-dist".to_string(), Value::Object(nd));
            }
        }
        if index == 0 {
            if let Some(dist) = dists.dist {
                obj.insert("dist".to_string(), dist.into());
            }
        }
        if index == runs.len() - 1 {
            if let Some(matrix) = &dists.dist_all {
                let rows: Vec<Value> = matrix
                    .iter()
                    .map(|row| Value::Array(row.iter().map(|d| (*d).into()).collect()))
                    .collect();
                obj.insert("dist-all".to_string(), Value::Array(rows));
            }
        }
        items.push(Value::Object(obj));
    }
    Ok(Value::Array(items))
}

fn parse_listing(listing: &str) -> Result<(Vec<NodeRun>, Vec<Vec<u64>>), NumactlError> {
    let mut runs: Vec<NodeRun> = Vec::new();
    let mut rows: Vec<Vec<u64>> = Vec::new();
    // node and CPU count from the most recent cpus line, the size line that
    // follows must name the same node
    let mut current: Option<(usize, u64)> = None;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let Some(seen) = parse_cpus_line(&fields) {
            current = Some(seen);
            continue;
        }
        if let Some((node, size, unit)) = parse_size_line(&fields) {
            let (expected, cpu) = match current {
                Some(state) => state,
                None => {
                    debug!(line, "node size before any cpus line, skipping");
                    continue;
                }
            };
            if node != expected {
                return Err(NumactlError::ExpectedNodeSize {
                    node: expected,
                    line: line.to_string(),
                });
            }
            let mem = round_mb(size, unit).map_err(|_| NumactlError::UnsupportedUnit {
                line: line.to_string(),
            })?;
            match runs.last_mut() {
                Some(last) if last.cpu == cpu && last.mem == mem => last.nodes += 1,
                _ => runs.push(NodeRun { cpu, mem, nodes: 1 }),
            }
            continue;
        }
        if let Some(row) = parse_dist_row(&fields) {
            rows.push(row);
        }
    }
    Ok((runs, rows))
}

/// `node N cpus: 0 1 2 ...`, returns the node and how many CPUs it lists
fn parse_cpus_line(fields: &[&str]) -> Option<(usize, u64)> {
    if fields.len() < 3 || fields[0] != "node" || fields[2] != "cpus:" {
        return None;
    }
    let node = fields[1].parse().ok()?;
    let cpu = fields[3..]
        .iter()
        .take_while(|field| field.parse::<u64>().is_ok())
        .count() as u64;
    Some((node, cpu))
}

/// `node N size: 4030 MB`
fn parse_size_line<'a>(fields: &[&'a str]) -> Option<(usize, u64, &'a str)> {
    if fields.len() < 5 || fields[0] != "node" || fields[2] != "size:" {
        return None;
    }
    let node = fields[1].parse().ok()?;
    let size = fields[3].parse().ok()?;
    let unit = fields[4];
    if unit.is_empty() || !unit.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((node, size, unit))
}

/// `N: d0 d1 ...` from the distance table. The row label is positional
/// noise, rows land in the matrix in the order they appear.
fn parse_dist_row(fields: &[&str]) -> Option<Vec<u64>> {
    let first = *fields.first()?;
    let colon = first.find(':')?;
    let (label, rest) = first.split_at(colon);
    if label.is_empty() || !label.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut row = Vec::new();
    let attached = &rest[1..];
    if !attached.is_empty() {
        row.push(attached.parse().ok()?);
    }
    row.extend(
        fields[1..]
            .iter()
            .map_while(|field| field.parse::<u64>().ok()),
    );
    Some(row)
}
