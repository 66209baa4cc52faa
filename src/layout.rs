//! Machine layout expansion
//!
//! Expands the group list into the concrete NUMA nodes of the machine. A
//! group covering `packages` packages with `dies` dies of `nodes` nodes each
//! expands package-major: node ids grow package by package, die by die, in
//! group order. Every expanded package gets a machine-global package id, so
//! two nodes compare as same-die, same-package or other-package no matter
//! which groups they came from.

use crate::groups::{detect_profile, NumaGroup, Profile, ValidationError};

/// How far apart two nodes sit in the package/die hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairClass {
    SameDie,
    SamePackage,
    OtherPackage,
}

/// One concrete NUMA node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumaNode {
    pub id: usize,
    /// Index of the group this node expanded from
    pub group: usize,
    /// Machine-global package id
    pub package: usize,
    /// Die within the package
    pub die: usize,
}

/// The expanded machine: concrete nodes plus machine-wide CPU topology
#[derive(Debug, Clone)]
pub struct MachineLayout {
    pub nodes: Vec<NumaNode>,
    pub profile: Profile,
    /// Threads per core, uniform across the machine
    pub threads: u64,
    /// Sockets seen by the guest, counting only CPU-bearing packages
    pub sockets: u64,
    /// Dies per socket seen by the guest
    pub dies_per_socket: u64,
    /// Total vCPU count
    pub cpus: u64,
}

impl MachineLayout {
    /// Expand groups into nodes and settle machine-wide CPU topology.
    ///
    /// The first CPU-bearing group sets the machine thread count; an absent
    /// `threads` key reads as the profile default (two for hierarchical
    /// specs, one for flat ones). A later CPU-bearing group errors only when
    /// it explicitly declares a different count.
    pub fn build(groups: &[NumaGroup]) -> Result<MachineLayout, ValidationError> {
        let profile = detect_profile(groups);
        let default_threads = match profile {
            Profile::Hierarchical => 2,
            Profile::Flat => 1,
        };

        let mut threads: Option<u64> = None;
        for (index, group) in groups.iter().enumerate() {
            if group.core_count() == 0 {
                continue;
            }
            match threads {
                None => threads = Some(group.threads.unwrap_or(default_threads)),
                Some(seen) => {
                    if let Some(declared) = group.threads {
                        if declared != seen {
                            return Err(ValidationError::ThreadsMismatch {
                                group: index,
                                declared,
                                seen,
                            });
                        }
                    }
                }
            }
        }
        let threads = threads.unwrap_or(default_threads);

        let mut nodes = Vec::new();
        let mut package_id = 0;
        let mut sockets = 0;
        let mut cpu_dies = 0;
        let mut cpus = 0;
        for (index, group) in groups.iter().enumerate() {
            let packages = group.packages_count();
            let dies = group.dies_count();
            if group.core_count() > 0 {
                sockets += packages;
                cpu_dies += packages * dies;
                cpus += packages * dies * group.nodes * group.core_count() * threads;
            }
            for _ in 0..packages {
                for die in 0..dies {
                    for _ in 0..group.nodes {
                        nodes.push(NumaNode {
                            id: nodes.len(),
                            group: index,
                            package: package_id,
                            die: die as usize,
                        });
                    }
                }
                package_id += 1;
            }
        }
        let dies_per_socket = if sockets > 0 { cpu_dies / sockets } else { 1 };

        Ok(MachineLayout {
            nodes,
            profile,
            threads,
            sockets,
            dies_per_socket,
            cpus,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Group index a node expanded from
    pub fn group_of(&self, node: usize) -> usize {
        self.nodes[node].group
    }

    pub fn pair_class(&self, a: usize, b: usize) -> PairClass {
        let (na, nb) = (&self.nodes[a], &self.nodes[b]);
        if na.package == nb.package {
            if na.die == nb.die {
                PairClass::SameDie
            } else {
                PairClass::SamePackage
            }
        } else {
            PairClass::OtherPackage
        }
    }
}
