//! Distance matrix expansion
//!
//! Turns the distance declarations scattered over the groups into the full
//! node-to-node matrix. Slots are resolved by precedence: node-level
//! declarations beat group-level ones, group-level beat the scalar `dist`,
//! and the scalar beats the profile fallback. Within one level a directed
//! `dist-to-*` key beats the symmetric form, a node's own symmetric
//! declaration beats the mirrored one from the destination, and the
//! single-target `dist-node-<N>` spelling beats an entry in the `node-dist`
//! map. A symmetric declaration resolves both slots of its pair: when the
//! two directions settle on different symmetric declarations, the slot
//! scanned first claims the pair, so asymmetry can only come from directed
//! keys or from a full `dist-all` matrix.
//!
//! `dist-all` (the last group declaring it wins) replaces the whole
//! resolution: the matrix is taken verbatim apart from the diagonal, which is
//! always the self distance. Declarations naming nodes or groups outside the
//! machine are ignored.

use crate::groups::{NumaGroup, Profile, ValidationError};
use crate::layout::{MachineLayout, PairClass};
use serde::Serialize;

/// Distance from a node to itself, fixed by the ACPI SLIT convention
pub const SELF_DIST: u64 = 10;
/// Fallback distance between distinct nodes in a flat spec
pub const DEFAULT_FLAT_DIST: u64 = 20;
/// Fallback for nodes sharing a die in a hierarchical spec
pub const DEFAULT_SAME_DIE_DIST: u64 = 11;
/// Fallback for nodes sharing a package but not a die
pub const DEFAULT_SAME_PACKAGE_DIST: u64 = 21;
/// Fallback for nodes in different packages
pub const DEFAULT_OTHER_PACKAGE_DIST: u64 = 21;

/// Full node-to-node distance matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DistanceMatrix {
    rows: Vec<Vec<u64>>,
}

impl DistanceMatrix {
    /// Wrap already expanded rows, as read from `numactl -H` output
    pub fn from_rows(rows: Vec<Vec<u64>>) -> DistanceMatrix {
        DistanceMatrix { rows }
    }

    /// Number of source nodes
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, src: usize, dst: usize) -> u64 {
        self.rows[src][dst]
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.rows
    }

    /// True when every row has one column per node
    pub fn is_square(&self) -> bool {
        let n = self.rows.len();
        self.rows.iter().all(|row| row.len() == n)
    }
}

/// Expand group declarations into the full distance matrix
pub fn expand(
    groups: &[NumaGroup],
    layout: &MachineLayout,
) -> Result<DistanceMatrix, ValidationError> {
    let n = layout.node_count();

    // last dist-all declaration replaces the whole resolution
    if let Some(matrix) = groups.iter().rev().find_map(|g| g.dist_all.as_ref()) {
        return from_dist_all(matrix, n);
    }

    let scalar = groups.iter().find_map(|g| g.dist);
    let same_die = groups
        .iter()
        .find_map(|g| g.dist_same_die)
        .unwrap_or(DEFAULT_SAME_DIE_DIST);
    let same_package = groups
        .iter()
        .find_map(|g| g.dist_same_package)
        .unwrap_or(DEFAULT_SAME_PACKAGE_DIST);
    let other_package = groups
        .iter()
        .find_map(|g| g.dist_other_package)
        .unwrap_or(DEFAULT_OTHER_PACKAGE_DIST);

    let fallbacks = (same_die, same_package, other_package);
    let mut rows: Vec<Vec<u64>> = (0..n)
        .map(|src| {
            (0..n)
                .map(|dst| if src == dst { SELF_DIST } else { 0 })
                .collect()
        })
        .collect();
    for src in 0..n {
        for dst in src + 1..n {
            let forward = resolve_slot(groups, layout, scalar, fallbacks, src, dst);
            let backward = resolve_slot(groups, layout, scalar, fallbacks, dst, src);
            rows[src][dst] = forward.value();
            // two symmetric declarations over one pair must not disagree,
            // the slot scanned first claims both directions
            rows[dst][src] = match (&forward, &backward) {
                (Slot::Symmetric(d), Slot::Symmetric(_)) => *d,
                _ => backward.value(),
            };
        }
    }
    Ok(DistanceMatrix { rows })
}

fn from_dist_all(matrix: &[Vec<u64>], n: usize) -> Result<DistanceMatrix, ValidationError> {
    if matrix.len() != n {
        return Err(ValidationError::MatrixRows {
            expected: n,
            rows: matrix.len(),
        });
    }
    let mut rows = Vec::with_capacity(n);
    for (src, declared) in matrix.iter().enumerate() {
        if declared.len() != n {
            return Err(ValidationError::MatrixRowLength {
                expected: n,
                len: declared.len(),
            });
        }
        let mut row = declared.clone();
        row[src] = SELF_DIST;
        rows.push(row);
    }
    Ok(DistanceMatrix { rows })
}

/// How a slot was resolved, decides whether the value spans both directions
enum Slot {
    /// Directed `dist-to-*` declaration, applies to this direction only
    Directed(u64),
    /// Symmetric declaration, own or mirrored, claims the whole pair
    Symmetric(u64),
    /// Scalar default or profile fallback, identical in both directions
    Uniform(u64),
}

impl Slot {
    fn value(&self) -> u64 {
        match self {
            Slot::Directed(d) | Slot::Symmetric(d) | Slot::Uniform(d) => *d,
        }
    }
}

fn resolve_slot(
    groups: &[NumaGroup],
    layout: &MachineLayout,
    scalar: Option<u64>,
    fallbacks: (u64, u64, u64),
    src: usize,
    dst: usize,
) -> Slot {
    let (src_group, dst_group) = (layout.group_of(src), layout.group_of(dst));
    let (gs, gd) = (&groups[src_group], &groups[dst_group]);

    // node level: directed, then own symmetric, then mirrored symmetric
    if let Some(d) = gs.dist_to_node.get(&dst) {
        return Slot::Directed(*d);
    }
    if let Some(d) = gs.dist_node.get(&dst).or_else(|| gs.node_dist.get(&dst)) {
        return Slot::Symmetric(*d);
    }
    if let Some(d) = gd.dist_node.get(&src).or_else(|| gd.node_dist.get(&src)) {
        return Slot::Symmetric(*d);
    }

    // group level, same ordering
    if let Some(d) = gs.dist_to_group.get(&dst_group) {
        return Slot::Directed(*d);
    }
    if let Some(d) = gs.dist_group.get(&dst_group) {
        return Slot::Symmetric(*d);
    }
    if let Some(d) = gd.dist_group.get(&src_group) {
        return Slot::Symmetric(*d);
    }

    if let Some(d) = scalar {
        return Slot::Uniform(d);
    }

    let (same_die, same_package, other_package) = fallbacks;
    Slot::Uniform(match layout.profile {
        Profile::Flat => DEFAULT_FLAT_DIST,
        Profile::Hierarchical => match layout.pair_class(src, dst) {
            PairClass::SameDie => same_die,
            PairClass::SamePackage => same_package,
            PairClass::OtherPackage => other_package,
        },
    })
}
