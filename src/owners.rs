//! Allowed-resource owners
//!
//! A res_allowed dump (see [`bash_res_allowed`]) has one process per line,
//! with the `Cpus_allowed` and `Mems_allowed` masks from its proc status:
//!
//! ```text
//! pod2/1234  c:040c0000,00000000 m:00000000,00000300
//! ```
//!
//! Owners attach to the topology tree as leaves under every CPU and memory
//! branch their masks allow.

use crate::bitmask::BitMask;
use crate::topology::Topology;
use std::collections::BTreeMap;
use tracing::warn;

const BASH_RES_ALLOWED_TEMPLATE: &str = r#"for process in '%s'; do for pid in $(pgrep -f "$process"); do name=$(cat /proc/$pid/cmdline | tr '\0 ' '\n' | grep -E "^$process" | head -n 1); [ -n "$name" ] && [ "$pid" != "$$" ] && [ "$pid" != "$PPID" ] && echo "${name}/${pid} $(awk '/Cpus_allowed:/{c=$2}/Mems_allowed:/{m=$2}END{print "c:"c" m:"m}' < /proc/$pid/status)"; done; done"#;

/// Bash command that prints a res_allowed dump for matching processes
pub fn bash_res_allowed(processes: &[String]) -> String {
    BASH_RES_ALLOWED_TEMPLATE.replacen("%s", &processes.join("' '"), 1)
}

/// Allowed CPU and memory node masks of one owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerMasks {
    pub cpu: BitMask,
    pub mem: BitMask,
}

/// Parse a res_allowed dump. Lines that do not parse are reported and
/// skipped; a later line for the same owner wins.
pub fn parse_res_allowed(dump: &str) -> BTreeMap<String, OwnerMasks> {
    let mut owners = BTreeMap::new();
    for line in dump.lines() {
        if line.is_empty() {
            continue;
        }
        match parse_owner_line(line) {
            Some((owner, masks)) => {
                owners.insert(owner, masks);
            }
            None => warn!("cannot parse res_allowed line {:?}", line),
        }
    }
    owners
}

// the memory mask may be left out, a CPU-only line pins no memory nodes
fn parse_owner_line(line: &str) -> Option<(String, OwnerMasks)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return None;
    }
    let cpu: BitMask = fields[1].strip_prefix("c:")?.parse().ok()?;
    let mem: BitMask = match fields.get(2) {
        Some(field) => field.strip_prefix("m:")?.parse().ok()?,
        None => BitMask::default(),
    };
    Some((fields[0].to_string(), OwnerMasks { cpu, mem }))
}

/// Attach owners to the tree under every CPU and memory branch their masks
/// cover. Mask bits without a matching branch are ignored.
pub fn attach_owners(topology: &mut Topology, owners: &BTreeMap<String, OwnerMasks>) {
    let max_cpu = match topology.max_cpu() {
        Some(max) => max,
        None => return,
    };
    let max_node = topology.max_node().unwrap_or(0);
    for (owner, masks) in owners {
        for cpu in 0..=max_cpu {
            if !masks.cpu.test(cpu) {
                continue;
            }
            if let Some(branch) = topology.cpu_branch.get(&cpu) {
                let mut leaf = branch.clone();
                leaf.push(owner.clone());
                topology.tree.insert_branch(&leaf);
            }
        }
        for node in 0..=max_node {
            if !masks.mem.test(node) {
                continue;
            }
            if let Some(branch) = topology.mem_branch.get(&node) {
                let mut leaf = branch.clone();
                leaf.push(owner.clone());
                topology.tree.insert_branch(&leaf);
            }
        }
    }
}
