//! numatool - NUMA topology reporting and machine spec conversion
//!
//! This library models multi-node NUMA machines three ways: as a labeled
//! topology tree parsed from hardware dumps, as a compact group spec (JSON)
//! with distance overrides, and as a fully resolved node-to-node distance
//! matrix. Conversions run in both directions, down to the QEMU command line
//! options that boot a guest with the described layout.

pub mod bitmask;
pub mod cli;
pub mod compact;
pub mod distance;
pub mod groups;
pub mod layout;
pub mod numactl;
pub mod owners;
pub mod qemu;
pub mod size;
pub mod topology;
pub mod tree;
