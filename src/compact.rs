//! Distance matrix compaction
//!
//! The inverse of expansion: boil a full node-to-node matrix down to the few
//! distance keys a spec needs. The most frequent off-diagonal value becomes
//! the default (ties go to the larger distance). Every slot off the default
//! is audited: it must be symmetric and every node of the source group must
//! agree on it in both directions, otherwise the matrix does not fit the
//! group structure and the full matrix is carried as `dist-all` instead.
//!
//! Audited slots collect into per-group `node-dist` maps. A map whose
//! destinations all sit in earlier groups repeats what those groups already
//! declare through mirroring, so it is dropped. The per-group maps are only
//! used when their JSON is shorter than the full matrix; the default becomes
//! a scalar `dist` on the first group unless the grouping is flat and the
//! default is already the flat fallback.

use crate::distance::{DistanceMatrix, DEFAULT_FLAT_DIST};
use crate::groups::{detect_profile, NumaGroup, Profile, ValidationError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Compacted distance declarations, ready to install on a group list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactDists {
    /// Surviving `node-dist` map per group, empty maps install nothing
    pub node_dist: Vec<BTreeMap<usize, u64>>,
    /// Scalar default for the first group
    pub dist: Option<u64>,
    /// Full matrix for the last group when compaction does not fit
    pub dist_all: Option<Vec<Vec<u64>>>,
}

fn node_groups(groups: &[NumaGroup]) -> Vec<usize> {
    let mut node_group = Vec::new();
    for (index, group) in groups.iter().enumerate() {
        let count = group.packages_count() * group.dies_count() * group.nodes;
        for _ in 0..count {
            node_group.push(index);
        }
    }
    node_group
}

/// Compact a full distance matrix against the given group structure
pub fn compact(
    groups: &[NumaGroup],
    matrix: &DistanceMatrix,
) -> Result<CompactDists, ValidationError> {
    let node_group = node_groups(groups);
    let n = node_group.len();
    if matrix.size() != n || !matrix.is_square() {
        return Err(ValidationError::CompactMatrixDimensions {
            rows: matrix.size(),
            cols: matrix.rows().first().map_or(0, Vec::len),
            nodes: n,
        });
    }
    if n <= 1 {
        return Ok(CompactDists::default());
    }

    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for src in 0..n {
        for dst in 0..n {
            if src != dst {
                *counts.entry(matrix.get(src, dst)).or_insert(0) += 1;
            }
        }
    }
    let default_dist = match counts.iter().max_by_key(|(dist, count)| (**count, **dist)) {
        Some((dist, _)) => *dist,
        None => return Ok(CompactDists::default()),
    };

    let mut maps: Vec<BTreeMap<usize, u64>> = vec![BTreeMap::new(); groups.len()];
    let mut errors = 0usize;
    for src in 0..n {
        let src_group = node_group[src];
        for dst in 0..n {
            if src == dst {
                continue;
            }
            let dist = matrix.get(src, dst);
            if dist == default_dist {
                continue;
            }
            if matrix.get(dst, src) != dist {
                errors += 1;
                continue;
            }
            // every node of the source group must share this distance
            for other in 0..n {
                if node_group[other] != src_group || other == dst {
                    continue;
                }
                if matrix.get(other, dst) != dist || matrix.get(dst, other) != dist {
                    errors += 1;
                }
            }
            maps[src_group].insert(dst, dist);
        }
    }

    if errors == 0 && maps_json(&maps).len() < matrix_json(matrix).len() {
        for (index, map) in maps.iter_mut().enumerate() {
            // a map pointing only backwards repeats earlier declarations
            if !map.keys().any(|dst| node_group[*dst] >= index) {
                map.clear();
            }
        }
        // only a flat grouping re-expands an omitted default to the flat
        // fallback, a hierarchical one falls back to the 11/21/21 family
        let dist = match detect_profile(groups) {
            Profile::Flat => (default_dist != DEFAULT_FLAT_DIST).then_some(default_dist),
            Profile::Hierarchical => Some(default_dist),
        };
        Ok(CompactDists {
            node_dist: maps,
            dist,
            dist_all: None,
        })
    } else {
        Ok(CompactDists {
            node_dist: Vec::new(),
            dist: None,
            dist_all: Some(matrix.rows().to_vec()),
        })
    }
}

fn maps_json(maps: &[BTreeMap<usize, u64>]) -> String {
    let mut object = Map::new();
    for (index, map) in maps.iter().enumerate() {
        let mut inner = Map::new();
        for (dst, dist) in map {
            inner.insert(dst.to_string(), (*dist).into());
        }
        object.insert(index.to_string(), Value::Object(inner));
    }
    Value::Object(object).to_string()
}

fn matrix_json(matrix: &DistanceMatrix) -> String {
    let rows: Vec<Value> = matrix
        .rows()
        .iter()
        .map(|row| Value::Array(row.iter().map(|d| (*d).into()).collect()))
        .collect();
    Value::Array(rows).to_string()
}

/// Install compacted distances, replacing whatever the groups declared
pub fn apply(groups: &mut [NumaGroup], dists: &CompactDists) {
    for group in groups.iter_mut() {
        group.dist = None;
        group.dist_all = None;
        group.node_dist.clear();
        group.dist_node.clear();
        group.dist_to_node.clear();
        group.dist_group.clear();
        group.dist_to_group.clear();
    }
    for (index, map) in dists.node_dist.iter().enumerate() {
        if let Some(group) = groups.get_mut(index) {
            group.node_dist = map.clone();
        }
    }
    if let Some(dist) = dists.dist {
        if let Some(first) = groups.first_mut() {
            first.dist = Some(dist);
        }
    }
    if let Some(matrix) = &dists.dist_all {
        if let Some(last) = groups.last_mut() {
            last.dist_all = Some(matrix.clone());
        }
    }
}

/// Compact and install in one step
pub fn compact_apply(
    groups: &mut [NumaGroup],
    matrix: &DistanceMatrix,
) -> Result<(), ValidationError> {
    let dists = compact(groups, matrix)?;
    apply(groups, &dists);
    Ok(())
}
