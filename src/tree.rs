//! Topology tree container and rendering
//!
//! Hardware topology is modeled as a tree of labeled levels
//! (`package0 / die0 / node0 / core0 / thread0 / cpu00` and memory branches
//! next to them). The tree is an ordered map of maps; an empty map is a leaf.
//! Labels are zero-padded where numeric order matters, so lexicographic key
//! order is also numeric order.

use serde::Serialize;
use std::collections::BTreeMap;

/// Ordered tree of topology labels. Leaves are empty subtrees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TopologyTree(pub BTreeMap<String, TopologyTree>);

impl TopologyTree {
    pub fn new() -> Self {
        TopologyTree::default()
    }

    /// Insert a root-to-leaf branch, creating missing levels
    pub fn insert_branch<S: AsRef<str>>(&mut self, branch: &[S]) {
        let mut node = self;
        for part in branch {
            node = node.0.entry(part.as_ref().to_string()).or_default();
        }
    }

    /// True when the tree has no children
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn collect_rows<'a>(&'a self, branch: &mut Vec<&'a str>, rows: &mut Vec<Vec<&'a str>>) {
        if self.0.is_empty() {
            if !branch.is_empty() {
                rows.push(branch.clone());
            }
            return;
        }
        for (name, child) in &self.0 {
            branch.push(name);
            child.collect_rows(branch, rows);
            branch.pop();
        }
    }

    /// Render the tree as aligned text, one leaf per line.
    ///
    /// Cells equal to the cell above them are blanked out until the first
    /// difference in the line, which keeps repeated prefixes quiet:
    ///
    /// ```text
    /// package0 die0 node0 core0 thread0 cpu00
    ///                           thread1 cpu04
    ///                     core1 thread0 cpu01
    /// ```
    pub fn render_text(&self) -> String {
        let mut rows: Vec<Vec<&str>> = Vec::new();
        self.collect_rows(&mut Vec::new(), &mut rows);

        let mut widths: Vec<usize> = Vec::new();
        for row in &rows {
            for (col, cell) in row.iter().enumerate() {
                if widths.len() <= col {
                    widths.push(0);
                }
                widths[col] = widths[col].max(cell.len() + 1);
            }
        }

        let mut lines: Vec<String> = Vec::with_capacity(rows.len());
        let mut prev: &[&str] = &[];
        for row in &rows {
            let mut line = String::new();
            let mut print_rest = false;
            for (col, cell) in row.iter().enumerate() {
                if print_rest || col >= prev.len() || prev[col] != *cell {
                    print_rest = true;
                    line.push_str(cell);
                    for _ in cell.len()..widths[col] {
                        line.push(' ');
                    }
                } else {
                    for _ in 0..widths[col] {
                        line.push(' ');
                    }
                }
            }
            lines.push(line.trim_end().to_string());
            prev = row;
        }
        lines.join("\n")
    }
}
