//! NUMA group specs
//!
//! A machine spec is a JSON list of group objects. Each group describes one
//! or more identical NUMA nodes: CPU core count, memory sizes, how many nodes
//! the group expands to, and distance declarations toward other nodes or
//! groups. This module owns the group type, JSON parsing with validation, and
//! profile detection.
//!
//! Two spec profiles exist. A spec that mentions any of the topology keys
//! (`cores`, `threads`, `dies`, `packages`) or the hierarchy distance
//! defaults (`dist-same-die`, `dist-same-package`, `dist-other-package`) is
//! hierarchical; everything else is flat. The profile only changes defaults:
//! flat specs get one thread per core and a uniform fallback distance,
//! hierarchical specs get two threads per core and fallbacks keyed on how far
//! apart two nodes sit in the package/die hierarchy.

use crate::size::{GigaSize, ParseSizeError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Spec validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid key {key:?} in group {group}")]
    UnknownKey { key: String, group: usize },
    #[error("invalid {key:?} value in group {group}: {why}")]
    InvalidValue {
        key: String,
        group: usize,
        why: String,
    },
    #[error("invalid {key:?} value in group {group}: {source}")]
    BadSize {
        key: String,
        group: usize,
        source: ParseSizeError,
    },
    #[error("\"threads\" specified without \"cores\" in group {group}")]
    ThreadsWithoutCores { group: usize },
    #[error("conflicting thread counts: group {group} specifies {declared}, machine already uses {seen}")]
    ThreadsMismatch {
        group: usize,
        declared: u64,
        seen: u64,
    },
    #[error("\"cpu\" and \"cores\" are aliases, group {group} specifies both")]
    CpuCoresBoth { group: usize },
    #[error("unsupported \"dimm\" value {value:?} in group {group}, expected \"\", \"plugged\" or \"unplugged\"")]
    UnsupportedDimm { value: String, group: usize },
    #[error("expected a JSON list of NUMA group objects")]
    ExpectedList,
    #[error("expected a JSON object for group {group}")]
    ExpectedObject { group: usize },
    #[error("expected a {expected}x{expected} \"dist-all\" matrix, seen {rows} rows")]
    MatrixRows { expected: usize, rows: usize },
    #[error("expected a {expected}x{expected} \"dist-all\" matrix, seen a row of length {len}")]
    MatrixRowLength { expected: usize, len: usize },
    #[error("no NUMA nodes found")]
    NoNodes,
    #[error("no CPUs found, make sure at least one NUMA node has \"cores\" > 0")]
    NoCpus,
    #[error("no memory in any NUMA node")]
    NoMemory,
    #[error("no initial memory in any NUMA node - cannot boot with hotpluggable memory")]
    NoInitialMemory,
    #[error("cannot compact a {rows}x{cols} distance matrix covering {nodes} nodes")]
    CompactMatrixDimensions {
        rows: usize,
        cols: usize,
        nodes: usize,
    },
}

/// Spelling used for the core count key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoreKey {
    #[default]
    Cores,
    Cpu,
}

impl CoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreKey::Cores => "cores",
            CoreKey::Cpu => "cpu",
        }
    }
}

/// Memory region kind for a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DimmMode {
    /// Part of initial memory, always present
    #[default]
    Builtin,
    /// A DIMM device plugged in at boot
    Plugged,
    /// An empty slot, memory can be plugged in later
    Unplugged,
}

impl DimmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimmMode::Builtin => "",
            DimmMode::Plugged => "plugged",
            DimmMode::Unplugged => "unplugged",
        }
    }
}

/// Spec profile, decides defaults during distance resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Flat,
    Hierarchical,
}

/// One group of identical NUMA nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumaGroup {
    /// Core count per node, `None` when the key is absent
    pub cores: Option<u64>,
    /// Which alias spelled the core count, kept for serialization
    pub core_key: CoreKey,
    pub threads: Option<u64>,
    /// How many identical nodes this group expands to
    pub nodes: u64,
    pub dies: Option<u64>,
    pub packages: Option<u64>,
    pub mem: GigaSize,
    pub nvmem: GigaSize,
    pub dimm: DimmMode,
    /// Uniform distance toward every other node, lowest precedence
    pub dist: Option<u64>,
    /// Full distance matrix override for the whole machine
    pub dist_all: Option<Vec<Vec<u64>>>,
    /// Symmetric per-node distances from the `node-dist` map
    pub node_dist: BTreeMap<usize, u64>,
    /// Symmetric per-node distances from `dist-node-<N>` keys
    pub dist_node: BTreeMap<usize, u64>,
    /// Directed per-node distances from `dist-to-node-<N>` keys
    pub dist_to_node: BTreeMap<usize, u64>,
    /// Symmetric per-group distances from `dist-group-<G>` keys
    pub dist_group: BTreeMap<usize, u64>,
    /// Directed per-group distances from `dist-to-group-<G>` keys
    pub dist_to_group: BTreeMap<usize, u64>,
    pub dist_same_die: Option<u64>,
    pub dist_same_package: Option<u64>,
    pub dist_other_package: Option<u64>,
}

impl NumaGroup {
    /// Core count with the absent key reading as zero
    pub fn core_count(&self) -> u64 {
        self.cores.unwrap_or(0)
    }

    pub fn dies_count(&self) -> u64 {
        self.dies.unwrap_or(1)
    }

    pub fn packages_count(&self) -> u64 {
        self.packages.unwrap_or(1)
    }

    /// True when the group mentions any hierarchical key
    fn is_hierarchical(&self) -> bool {
        (self.cores.is_some() && self.core_key == CoreKey::Cores)
            || self.threads.is_some()
            || self.dies.is_some()
            || self.packages.is_some()
            || self.dist_same_die.is_some()
            || self.dist_same_package.is_some()
            || self.dist_other_package.is_some()
    }

    fn from_object(index: usize, obj: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut group = NumaGroup {
            nodes: 1,
            ..NumaGroup::default()
        };
        for (key, value) in obj {
            match key.as_str() {
                "cores" | "cpu" => {
                    if group.cores.is_some() {
                        return Err(ValidationError::CpuCoresBoth { group: index });
                    }
                    group.cores = Some(int_at_least(index, key, value, 0)?);
                    group.core_key = if key == "cpu" {
                        CoreKey::Cpu
                    } else {
                        CoreKey::Cores
                    };
                }
                "threads" => group.threads = Some(int_at_least(index, key, value, 1)?),
                "nodes" => group.nodes = int_at_least(index, key, value, 1)?,
                "dies" => group.dies = Some(int_at_least(index, key, value, 1)?),
                "packages" => group.packages = Some(int_at_least(index, key, value, 1)?),
                "mem" => group.mem = size_value(index, key, value)?,
                "nvmem" => group.nvmem = size_value(index, key, value)?,
                "dimm" => {
                    let text = value.as_str().ok_or_else(|| ValidationError::InvalidValue {
                        key: key.clone(),
                        group: index,
                        why: "expected a string".to_string(),
                    })?;
                    group.dimm = match text {
                        "" => DimmMode::Builtin,
                        "plugged" => DimmMode::Plugged,
                        "unplugged" => DimmMode::Unplugged,
                        other => {
                            return Err(ValidationError::UnsupportedDimm {
                                value: other.to_string(),
                                group: index,
                            })
                        }
                    };
                }
                "dist" => group.dist = Some(dist_value(index, key, value)?),
                "dist-all" => group.dist_all = Some(matrix_value(index, key, value)?),
                "node-dist" => group.node_dist = dist_map_value(index, key, value)?,
                "dist-same-die" => group.dist_same_die = Some(dist_value(index, key, value)?),
                "dist-same-package" => {
                    group.dist_same_package = Some(dist_value(index, key, value)?)
                }
                "dist-other-package" => {
                    group.dist_other_package = Some(dist_value(index, key, value)?)
                }
                other => {
                    let entry = if let Some(n) = indexed_key(other, "dist-to-node-") {
                        Some((&mut group.dist_to_node, n))
                    } else if let Some(n) = indexed_key(other, "dist-node-") {
                        Some((&mut group.dist_node, n))
                    } else if let Some(n) = indexed_key(other, "dist-to-group-") {
                        Some((&mut group.dist_to_group, n))
                    } else if let Some(n) = indexed_key(other, "dist-group-") {
                        Some((&mut group.dist_group, n))
                    } else {
                        None
                    };
                    match entry {
                        Some((map, n)) => {
                            map.insert(n, dist_value(index, key, value)?);
                        }
                        None => {
                            return Err(ValidationError::UnknownKey {
                                key: key.clone(),
                                group: index,
                            })
                        }
                    }
                }
            }
        }
        if group.threads.is_some() && group.cores.is_none() {
            return Err(ValidationError::ThreadsWithoutCores { group: index });
        }
        Ok(group)
    }

    /// Serialize back to a JSON object, omitting defaults
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(cores) = self.cores {
            map.insert(self.core_key.as_str().to_string(), cores.into());
        }
        if !self.mem.is_zero() {
            map.insert("mem".to_string(), self.mem.to_string().into());
        }
        if !self.nvmem.is_zero() {
            map.insert("nvmem".to_string(), self.nvmem.to_string().into());
        }
        if self.dimm != DimmMode::Builtin {
            map.insert("dimm".to_string(), self.dimm.as_str().into());
        }
        if let Some(threads) = self.threads {
            map.insert("threads".to_string(), threads.into());
        }
        if self.nodes != 1 {
            map.insert("nodes".to_string(), self.nodes.into());
        }
        if let Some(dies) = self.dies {
            map.insert("dies".to_string(), dies.into());
        }
        if let Some(packages) = self.packages {
            map.insert("packages".to_string(), packages.into());
        }
        if let Some(d) = self.dist_same_die {
            map.insert("dist-same-die".to_string(), d.into());
        }
        if let Some(d) = self.dist_same_package {
            map.insert("dist-same-package".to_string(), d.into());
        }
        if let Some(d) = self.dist_other_package {
            map.insert("dist-other-package".to_string(), d.into());
        }
        for (n, d) in &self.dist_node {
            map.insert(format!("dist-node-{n}"), (*d).into());
        }
        for (n, d) in &self.dist_to_node {
            map.insert(format!("dist-to-node-{n}"), (*d).into());
        }
        for (g, d) in &self.dist_group {
            map.insert(format!("dist-group-{g}"), (*d).into());
        }
        for (g, d) in &self.dist_to_group {
            map.insert(format!("dist-to-group-{g}"), (*d).into());
        }
        if !self.node_dist.is_empty() {
            let mut nd = Map::new();
            for (n, d) in &self.node_dist {
                nd.insert(n.to_string(), (*d).into());
            }
            map.insert("node-dist".to_string(), Value::Object(nd));
        }
        if let Some(d) = self.dist {
            map.insert("dist".to_string(), d.into());
        }
        if let Some(matrix) = &self.dist_all {
            let rows: Vec<Value> = matrix
                .iter()
                .map(|row| Value::Array(row.iter().map(|d| (*d).into()).collect()))
                .collect();
            map.insert("dist-all".to_string(), Value::Array(rows));
        }
        Value::Object(map)
    }
}

fn indexed_key(key: &str, prefix: &str) -> Option<usize> {
    key.strip_prefix(prefix)?.parse().ok()
}

fn int_at_least(
    group: usize,
    key: &str,
    value: &Value,
    least: u64,
) -> Result<u64, ValidationError> {
    match value.as_u64() {
        Some(n) if n >= least => Ok(n),
        _ => Err(ValidationError::InvalidValue {
            key: key.to_string(),
            group,
            why: format!("expected an integer >= {least}"),
        }),
    }
}

fn dist_value(group: usize, key: &str, value: &Value) -> Result<u64, ValidationError> {
    value.as_u64().ok_or_else(|| ValidationError::InvalidValue {
        key: key.to_string(),
        group,
        why: "expected a non-negative integer distance".to_string(),
    })
}

fn size_value(group: usize, key: &str, value: &Value) -> Result<GigaSize, ValidationError> {
    let text = value.as_str().ok_or_else(|| ValidationError::InvalidValue {
        key: key.to_string(),
        group,
        why: "expected a size string".to_string(),
    })?;
    text.parse().map_err(|source| ValidationError::BadSize {
        key: key.to_string(),
        group,
        source,
    })
}

fn dist_map_value(
    group: usize,
    key: &str,
    value: &Value,
) -> Result<BTreeMap<usize, u64>, ValidationError> {
    let obj = value.as_object().ok_or_else(|| ValidationError::InvalidValue {
        key: key.to_string(),
        group,
        why: "expected an object mapping node numbers to distances".to_string(),
    })?;
    let mut map = BTreeMap::new();
    for (node, dist) in obj {
        let n: usize = node.parse().map_err(|_| ValidationError::InvalidValue {
            key: key.to_string(),
            group,
            why: format!("bad node number {node:?}"),
        })?;
        map.insert(n, dist_value(group, key, dist)?);
    }
    Ok(map)
}

fn matrix_value(group: usize, key: &str, value: &Value) -> Result<Vec<Vec<u64>>, ValidationError> {
    let rows = value.as_array().ok_or_else(|| ValidationError::InvalidValue {
        key: key.to_string(),
        group,
        why: "expected a list of integer rows".to_string(),
    })?;
    let mut matrix = Vec::with_capacity(rows.len());
    for row in rows {
        let cells = row.as_array().ok_or_else(|| ValidationError::InvalidValue {
            key: key.to_string(),
            group,
            why: "expected a list of integer rows".to_string(),
        })?;
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            out.push(dist_value(group, key, cell)?);
        }
        matrix.push(out);
    }
    Ok(matrix)
}

/// Parse and validate a machine spec from its JSON value
pub fn parse_groups(value: &Value) -> Result<Vec<NumaGroup>, ValidationError> {
    let list = value.as_array().ok_or(ValidationError::ExpectedList)?;
    if list.is_empty() {
        return Err(ValidationError::NoNodes);
    }
    let mut groups = Vec::with_capacity(list.len());
    for (index, item) in list.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or(ValidationError::ExpectedObject { group: index })?;
        groups.push(NumaGroup::from_object(index, obj)?);
    }
    Ok(groups)
}

/// Decide the spec profile from the keys the groups mention
pub fn detect_profile(groups: &[NumaGroup]) -> Profile {
    if groups.iter().any(NumaGroup::is_hierarchical) {
        Profile::Hierarchical
    } else {
        Profile::Flat
    }
}
