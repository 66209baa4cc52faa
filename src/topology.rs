//! Topology dump parsing
//!
//! A topology dump is the line format produced by [`BASH_TOPOLOGY_DUMP`] from
//! sysfs, one record per line:
//!
//! ```text
//! cpu p:0 d:1 n:3 c:2 t:00003000 cpu:13
//! mem n:4 s:8063.83
//! dist n:4 d:21 21 21 21 10
//! ```
//!
//! CPU records place every hardware thread under
//! `package / die / node / core / thread / cpu`. Memory records hang a
//! `mem / node<N> / <size>G` branch under the node owning the memory. A node
//! without CPUs is grafted under the nearest node when its distance vector
//! singles one out, and otherwise lands under a synthetic `packagex` branch.
//! Unrecognized lines are skipped.

use crate::bitmask::BitMask;
use crate::size::mb_to_gig_label;
use crate::tree::TopologyTree;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Bash command that prints a topology dump of the host
pub const BASH_TOPOLOGY_DUMP: &str = r#"for cpu in /sys/devices/system/cpu/cpu[0-9]*; do cpu_id=${cpu#/sys/devices/system/cpu/cpu}; echo "cpu p:$(< ${cpu}/topology/physical_package_id) d:$(< ${cpu}/topology/die_id) n:$(basename  ${cpu}/node* | sed 's:node::g') c:$(< ${cpu}/topology/core_id) t:$(< ${cpu}/topology/thread_siblings) cpu:${cpu_id}" ; done;  for node in /sys/devices/system/node/node[0-9]*; do node_id=${node#/sys/devices/system/node/node}; echo "dist n:$node_id d:$(< $node/distance)"; echo "mem n:$node_id s:$(awk '/MemTotal/{print $4/1024}' < $node/meminfo)"; done"#;

/// Topology dump parsing failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("no CPU records found in topology dump")]
    NoCpuRecords,
}

/// Parsed topology: the tree plus branch lookups for attaching owners
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub tree: TopologyTree,
    /// CPU id to its full branch
    pub cpu_branch: BTreeMap<usize, Vec<String>>,
    /// Node id to its three-level branch prefix
    pub node_branch: BTreeMap<usize, Vec<String>>,
    /// Node id to its full memory branch
    pub mem_branch: BTreeMap<usize, Vec<String>>,
}

struct CpuRecord {
    package: usize,
    die: usize,
    node: usize,
    core: usize,
    thread: usize,
    cpu: usize,
}

impl Topology {
    /// Parse a dump with CPU and memory branches
    pub fn from_dump(dump: &str) -> Result<Topology, TopologyError> {
        parse(dump, true)
    }

    /// Parse a dump keeping only CPU branches
    pub fn from_dump_cpus(dump: &str) -> Result<Topology, TopologyError> {
        parse(dump, false)
    }

    pub fn max_cpu(&self) -> Option<usize> {
        self.cpu_branch.keys().next_back().copied()
    }

    pub fn max_node(&self) -> Option<usize> {
        self.node_branch.keys().next_back().copied()
    }
}

fn parse(dump: &str, show_mem: bool) -> Result<Topology, TopologyError> {
    let mut cpu_records: Vec<CpuRecord> = Vec::new();
    let mut mem_sizes: BTreeMap<usize, f64> = BTreeMap::new();
    let mut dist_vecs: BTreeMap<usize, Vec<u64>> = BTreeMap::new();

    for line in dump.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if let Some(record) = parse_cpu_line(&fields) {
            cpu_records.push(record);
        } else if let Some((node, size)) = parse_mem_line(&fields) {
            mem_sizes.insert(node, size);
        } else if let Some((node, dists)) = parse_dist_line(&fields) {
            dist_vecs.insert(node, dists);
        } else {
            debug!("skipping topology dump line: {:?}", line);
        }
    }

    if cpu_records.is_empty() {
        return Err(TopologyError::NoCpuRecords);
    }

    let package_width = digits_width(cpu_records.iter().map(|r| r.package));
    let die_width = digits_width(cpu_records.iter().map(|r| r.die));
    let node_width = digits_width(cpu_records.iter().map(|r| r.node));
    let core_width = digits_width(cpu_records.iter().map(|r| r.core));
    let thread_width = digits_width(cpu_records.iter().map(|r| r.thread));
    let cpu_width = digits_width(cpu_records.iter().map(|r| r.cpu));

    let mut tree = TopologyTree::new();
    let mut cpu_branch = BTreeMap::new();
    let mut node_branch: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut mem_branch = BTreeMap::new();

    for r in &cpu_records {
        let branch = vec![
            format!("package{:0w$}", r.package, w = package_width),
            format!("die{:0w$}", r.die, w = die_width),
            format!("node{:0w$}", r.node, w = node_width),
            format!("core{:0w$}", r.core, w = core_width),
            format!("thread{:0w$}", r.thread, w = thread_width),
            format!("cpu{:0w$}", r.cpu, w = cpu_width),
        ];
        tree.insert_branch(&branch);
        node_branch.insert(r.node, branch[..3].to_vec());
        cpu_branch.insert(r.cpu, branch);
    }

    if show_mem {
        for (node, distvec) in &dist_vecs {
            let size_mb = match mem_sizes.get(node) {
                Some(size) => *size,
                None => {
                    debug!("node {} has a distance record but no memory record", node);
                    continue;
                }
            };
            let node_name = format!("node{:0w$}", node, w = node_width);
            let size_label = mb_to_gig_label(size_mb);
            let branch = if let Some(prefix) = node_branch.get(node) {
                let mut branch = prefix.clone();
                branch.extend(["mem".to_string(), node_name, size_label]);
                branch
            } else if let Some(prefix) = graft_host(distvec, &node_branch).cloned() {
                // same memory controller as the closest node
                let mut branch = prefix;
                branch.extend(["mem".to_string(), node_name, size_label]);
                node_branch.insert(*node, branch[..3].to_vec());
                branch
            } else {
                let branch = vec![
                    "packagex".to_string(),
                    "mem".to_string(),
                    node_name.clone(),
                    "mem".to_string(),
                    node_name,
                    size_label,
                ];
                node_branch.insert(*node, branch[..3].to_vec());
                branch
            };
            tree.insert_branch(&branch);
            mem_branch.insert(*node, branch);
        }
    }

    Ok(Topology {
        tree,
        cpu_branch,
        node_branch,
        mem_branch,
    })
}

/// Nearest node to graft a CPU-less node under: the distance vector must
/// start from a sane self distance and name exactly one closest other node,
/// and that node must already be placed.
fn graft_host<'a>(
    distvec: &[u64],
    node_branch: &'a BTreeMap<usize, Vec<String>>,
) -> Option<&'a Vec<String>> {
    let mut sorted = distvec.to_vec();
    sorted.sort_unstable();
    if sorted.first() != Some(&10) {
        return None;
    }
    let second = *sorted.get(1)?;
    if let Some(third) = sorted.get(2) {
        if second >= *third {
            return None;
        }
    }
    let host = distvec.iter().position(|d| *d == second)?;
    node_branch.get(&host)
}

fn digits_width<I: Iterator<Item = usize>>(values: I) -> usize {
    values.map(|v| v.to_string().len()).max().unwrap_or(1)
}

fn int_field(token: &str, prefix: &str) -> Option<usize> {
    let digits = token.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_cpu_line(fields: &[&str]) -> Option<CpuRecord> {
    if fields.len() < 7 || fields[0] != "cpu" {
        return None;
    }
    let package = int_field(fields[1], "p:")?;
    let die_text = fields[2].strip_prefix("d:")?;
    let die = if die_text.is_empty() {
        // kernels without topology/die_id
        0
    } else {
        int_field(fields[2], "d:")?
    };
    let node = int_field(fields[3], "n:")?;
    let core = int_field(fields[4], "c:")?;
    let siblings: BitMask = fields[5].strip_prefix("t:")?.parse().ok()?;
    let cpu = int_field(fields[6], "cpu:")?;
    // the owner of the lowest sibling bit is thread 0, the next thread 1...
    let thread = siblings.count_through(cpu).saturating_sub(1) as usize;
    Some(CpuRecord {
        package,
        die,
        node,
        core,
        thread,
        cpu,
    })
}

fn parse_mem_line(fields: &[&str]) -> Option<(usize, f64)> {
    if fields.len() < 3 || fields[0] != "mem" {
        return None;
    }
    let node = int_field(fields[1], "n:")?;
    let size_text = fields[2].strip_prefix("s:")?;
    if size_text.is_empty()
        || !size_text.bytes().all(|b| b.is_ascii_digit() || b == b'.')
    {
        return None;
    }
    let size = size_text.parse().ok()?;
    Some((node, size))
}

fn parse_dist_line(fields: &[&str]) -> Option<(usize, Vec<u64>)> {
    if fields.len() < 3 || fields[0] != "dist" {
        return None;
    }
    let node = int_field(fields[1], "n:")?;
    let first = fields[2].strip_prefix("d:")?;
    let mut dists = Vec::new();
    for token in std::iter::once(first)
        .filter(|t| !t.is_empty())
        .chain(fields[3..].iter().copied())
    {
        if !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        dists.push(token.parse().ok()?);
    }
    if dists.is_empty() {
        return None;
    }
    Some((node, dists))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PACKAGE_DUMP: &str = "\
cpu p:0 d:0 n:0 c:0 t:3 cpu:0
cpu p:0 d:0 n:0 c:0 t:3 cpu:1
cpu p:1 d:0 n:1 c:0 t:c cpu:2
cpu p:1 d:0 n:1 c:0 t:c cpu:3
dist n:0 d:10 20
dist n:1 d:20 10
mem n:0 s:8063.83
mem n:1 s:8063.83
";

    #[test]
    fn test_cpu_tree() {
        let topology = Topology::from_dump_cpus(TWO_PACKAGE_DUMP).unwrap();
        let text = topology.tree.render_text();
        let expected = [
            "package0 die0 node0 core0 thread0 cpu0".to_string(),
            format!("{}thread1 cpu1", " ".repeat(26)),
            "package1 die0 node1 core0 thread0 cpu2".to_string(),
            format!("{}thread1 cpu3", " ".repeat(26)),
        ]
        .join("\n");
        assert_eq!(text, expected);
        assert!(topology.mem_branch.is_empty());
    }

    #[test]
    fn test_mem_under_own_node() {
        let topology = Topology::from_dump(TWO_PACKAGE_DUMP).unwrap();
        assert_eq!(
            topology.mem_branch[&0],
            ["package0", "die0", "node0", "mem", "node0", "8G"]
        );
        assert_eq!(
            topology.mem_branch[&1],
            ["package1", "die0", "node1", "mem", "node1", "8G"]
        );
        let text = topology.tree.render_text();
        let expected = [
            "package0 die0 node0 core0 thread0 cpu0".to_string(),
            format!("{}thread1 cpu1", " ".repeat(26)),
            format!("{}mem   node0   8G", " ".repeat(20)),
            "package1 die0 node1 core0 thread0 cpu2".to_string(),
            format!("{}thread1 cpu3", " ".repeat(26)),
            format!("{}mem   node1   8G", " ".repeat(20)),
        ]
        .join("\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn test_thread_rank_follows_sibling_bits() {
        let dump = "cpu p:0 d: n:3 c:2 t:00003000 cpu:13\n\
                    cpu p:0 d: n:3 c:2 t:00003000 cpu:12\n";
        let topology = Topology::from_dump_cpus(dump).unwrap();
        assert_eq!(
            topology.cpu_branch[&13],
            ["package0", "die0", "node3", "core2", "thread1", "cpu13"]
        );
        assert_eq!(
            topology.cpu_branch[&12],
            ["package0", "die0", "node3", "core2", "thread0", "cpu12"]
        );
    }

    #[test]
    fn test_zero_padding_widths_follow_cpu_records() {
        let dump = "cpu p:0 d:0 n:0 c:0 t:1 cpu:0\n\
                    cpu p:0 d:0 n:10 c:11 t:10000000000 cpu:40\n";
        let topology = Topology::from_dump_cpus(dump).unwrap();
        assert_eq!(
            topology.cpu_branch[&0],
            ["package0", "die0", "node00", "core00", "thread0", "cpu00"]
        );
        assert_eq!(
            topology.cpu_branch[&40],
            ["package0", "die0", "node10", "core11", "thread0", "cpu40"]
        );
    }

    #[test]
    fn test_cpuless_node_grafts_under_closest() {
        let dump = "\
cpu p:0 d:0 n:0 c:0 t:3 cpu:0
cpu p:0 d:0 n:0 c:0 t:3 cpu:1
cpu p:1 d:0 n:1 c:0 t:c cpu:2
cpu p:1 d:0 n:1 c:0 t:c cpu:3
dist n:0 d:10 20 21
dist n:1 d:20 10 11
dist n:2 d:21 11 10
mem n:0 s:8063.83
mem n:1 s:8063.83
mem n:2 s:16127.66
";
        let topology = Topology::from_dump(dump).unwrap();
        assert_eq!(
            topology.mem_branch[&2],
            ["package1", "die0", "node1", "mem", "node2", "16G"]
        );
        assert_eq!(topology.node_branch[&2], ["package1", "die0", "node1"]);
    }

    #[test]
    fn test_two_node_machine_grafts_memory() {
        let dump = "\
cpu p:0 d:0 n:0 c:0 t:1 cpu:0
dist n:0 d:10 30
dist n:1 d:30 10
mem n:0 s:4031.92
mem n:1 s:4031.92
";
        let topology = Topology::from_dump(dump).unwrap();
        // with two nodes the other node is trivially the closest one
        assert_eq!(
            topology.mem_branch[&1],
            ["package0", "die0", "node0", "mem", "node1", "4G"]
        );
    }

    #[test]
    fn test_odd_self_distance_gets_own_branch() {
        let dump = "\
cpu p:0 d:0 n:0 c:0 t:1 cpu:0
dist n:0 d:10 30
dist n:1 d:30 15
mem n:0 s:4031.92
mem n:1 s:4031.92
";
        let topology = Topology::from_dump(dump).unwrap();
        assert_eq!(
            topology.mem_branch[&1],
            ["packagex", "mem", "node1", "mem", "node1", "4G"]
        );
    }

    #[test]
    fn test_no_close_node_among_many() {
        let dump = "\
cpu p:0 d:0 n:0 c:0 t:1 cpu:0
cpu p:1 d:0 n:1 c:0 t:2 cpu:1
cpu p:2 d:0 n:2 c:0 t:4 cpu:2
dist n:3 d:30 30 30 10
mem n:3 s:4031.92
";
        let topology = Topology::from_dump(dump).unwrap();
        assert_eq!(
            topology.mem_branch[&3],
            ["packagex", "mem", "node3", "mem", "node3", "4G"]
        );
    }

    #[test]
    fn test_mem_record_without_dist_is_not_placed() {
        let dump = "\
cpu p:0 d:0 n:0 c:0 t:1 cpu:0
mem n:0 s:8063.83
";
        let topology = Topology::from_dump(dump).unwrap();
        assert!(topology.mem_branch.is_empty());
    }

    #[test]
    fn test_dist_record_without_mem_is_not_placed() {
        let dump = "\
cpu p:0 d:0 n:0 c:0 t:1 cpu:0
dist n:0 d:10
";
        let topology = Topology::from_dump(dump).unwrap();
        assert!(topology.mem_branch.is_empty());
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let dump = "\
# comment
cpu p:0 d:0 n:0 c:0 t:1 cpu:0
cpu p:x d:0 n:0 c:0 t:1 cpu:1
mem n:0 s:not-a-size
dist n:0 d:10 x

cpu p:0 d:0 n:0 c:1 t:2 cpu:1
";
        let topology = Topology::from_dump(dump).unwrap();
        assert_eq!(topology.cpu_branch.len(), 2);
        assert!(topology.mem_branch.is_empty());
    }

    #[test]
    fn test_empty_dump_has_no_cpus() {
        assert_eq!(
            Topology::from_dump("").unwrap_err(),
            TopologyError::NoCpuRecords
        );
        assert_eq!(
            Topology::from_dump("mem n:0 s:1024.0\n").unwrap_err(),
            TopologyError::NoCpuRecords
        );
    }

    #[test]
    fn test_max_cpu_and_node() {
        let topology = Topology::from_dump(TWO_PACKAGE_DUMP).unwrap();
        assert_eq!(topology.max_cpu(), Some(3));
        assert_eq!(topology.max_node(), Some(1));
    }

    #[test]
    fn test_bash_snippet_reads_sysfs() {
        assert!(BASH_TOPOLOGY_DUMP.contains("/sys/devices/system/cpu"));
        assert!(BASH_TOPOLOGY_DUMP.contains("thread_siblings"));
        assert!(BASH_TOPOLOGY_DUMP.contains("/sys/devices/system/node"));
    }
}
