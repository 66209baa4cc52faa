//! QEMU option generation
//!
//! Turns a machine spec into the command line options that make QEMU boot a
//! guest with that NUMA topology: `-machine`, `-smp` and `-m` first, then a
//! `-numa node` parameter per memory region with CPU ranges attached, the
//! full set of `-numa dist` pairs, and finally the `-device` and `-object`
//! definitions backing the regions.
//!
//! Memory region ids carry the global region number and the owning node
//! (`membuiltin_5_node_3`), so a region is easy to find in the QEMU monitor.
//! Plugged regions become cold-plugged DIMM devices, unplugged regions only
//! reserve a hotplug slot, and both count against `maxmem` but not against
//! the initial `-m size`.

use crate::distance;
use crate::groups::{DimmMode, NumaGroup, ValidationError};
use crate::layout::MachineLayout;
use crate::size::GigaSize;

/// Build the QEMU option string for a validated machine spec
pub fn qemu_options(groups: &[NumaGroup]) -> Result<String, ValidationError> {
    let layout = MachineLayout::build(groups)?;

    let mut machine = String::from("-machine pc");
    let mut numa_params: Vec<String> = Vec::new();
    let mut device_params: Vec<String> = Vec::new();
    let mut object_params: Vec<String> = Vec::new();
    let mut total_mem = GigaSize::ZERO;
    let mut total_nvmem = GigaSize::ZERO;
    let mut plugged = GigaSize::ZERO;
    let mut unplugged = GigaSize::ZERO;
    let mut mem_slots = 0u64;
    let mut next_region = 0usize;
    let mut next_cpu = 0u64;
    let mut nv_seen = false;

    for node in &layout.nodes {
        let group = &groups[node.group];
        let mut current: Vec<String> = Vec::new();

        if !group.mem.is_zero() {
            let region = next_region;
            next_region += 1;
            match group.dimm {
                DimmMode::Builtin => {
                    object_params.push(format!(
                        "-object memory-backend-ram,size={},id=membuiltin_{}_node_{}",
                        group.mem, region, node.id
                    ));
                    current.push(format!(
                        "-numa node,nodeid={},memdev=membuiltin_{}_node_{}",
                        node.id, region, node.id
                    ));
                }
                DimmMode::Plugged => {
                    object_params.push(format!(
                        "-object memory-backend-ram,size={},id=memdimm_{}_node_{}",
                        group.mem, region, node.id
                    ));
                    current.push(format!("-numa node,nodeid={}", node.id));
                    device_params.push(format!(
                        "-device pc-dimm,node={},id=dimm{},memdev=memdimm_{}_node_{}",
                        node.id, region, region, node.id
                    ));
                    plugged = plugged.add(group.mem);
                    mem_slots += 1;
                }
                DimmMode::Unplugged => {
                    object_params.push(format!(
                        "-object memory-backend-ram,size={},id=memdimm_{}_node_{}",
                        group.mem, region, node.id
                    ));
                    current.push(format!("-numa node,nodeid={}", node.id));
                    unplugged = unplugged.add(group.mem);
                    mem_slots += 1;
                }
            }
            total_mem = total_mem.add(group.mem);
        }

        if !group.nvmem.is_zero() {
            let region = next_region;
            next_region += 1;
            if !nv_seen {
                machine.push_str(",nvdimm=on");
                nv_seen = true;
            }
            // ram-backed nvdimms, a backing file would have to live inside
            // the VM container
            match group.dimm {
                DimmMode::Builtin => {
                    object_params.push(format!(
                        "-object memory-backend-ram,size={},id=memnvbuiltin_{}_node_{}",
                        group.nvmem, region, node.id
                    ));
                    current.push(format!(
                        "-numa node,nodeid={},memdev=memnvbuiltin_{}_node_{}",
                        node.id, region, node.id
                    ));
                }
                DimmMode::Plugged => {
                    object_params.push(format!(
                        "-object memory-backend-ram,size={},id=memnvdimm_{}_node_{}",
                        group.nvmem, region, node.id
                    ));
                    current.push(format!("-numa node,nodeid={}", node.id));
                    device_params.push(format!(
                        "-device nvdimm,node={},id=nvdimm{},memdev=memnvdimm_{}_node_{}",
                        node.id, region, region, node.id
                    ));
                    plugged = plugged.add(group.nvmem);
                    mem_slots += 1;
                }
                DimmMode::Unplugged => {
                    object_params.push(format!(
                        "-object memory-backend-ram,size={},id=memnvdimm_{}_node_{}",
                        group.nvmem, region, node.id
                    ));
                    current.push(format!("-numa node,nodeid={}", node.id));
                    unplugged = unplugged.add(group.nvmem);
                    mem_slots += 1;
                }
            }
            total_nvmem = total_nvmem.add(group.nvmem);
        }

        let node_cpus = group.core_count() * layout.threads;
        if node_cpus > 0 {
            if current.is_empty() {
                current.push(format!("-numa node,nodeid={}", node.id));
            }
            if let Some(param) = current.last_mut() {
                param.push_str(&format!(",cpus={}-{}", next_cpu, next_cpu + node_cpus - 1));
            }
            next_cpu += node_cpus;
        }
        numa_params.extend(current);
    }

    let matrix = distance::expand(groups, &layout)?;
    for src in 0..layout.node_count() {
        for dst in 0..layout.node_count() {
            if src != dst {
                numa_params.push(format!(
                    "-numa dist,src={},dst={},val={}",
                    src,
                    dst,
                    matrix.get(src, dst)
                ));
            }
        }
    }

    if layout.cpus == 0 {
        return Err(ValidationError::NoCpus);
    }
    let dies_param = if layout.dies_per_socket > 1 {
        format!(",dies={}", layout.dies_per_socket)
    } else {
        String::new()
    };
    let smp_param = format!(
        "-smp cpus={},threads={}{},sockets={}",
        layout.cpus, layout.threads, dies_param, layout.sockets
    );

    let maxmem = total_mem.add(total_nvmem);
    let startmem = maxmem.sub(unplugged).sub(plugged);
    let mem_param = format!("-m size={},slots={},maxmem={}", startmem, mem_slots, maxmem);
    if startmem.is_zero() {
        if plugged.is_zero() {
            return Err(ValidationError::NoMemory);
        }
        return Err(ValidationError::NoInitialMemory);
    }

    let mut parts = vec![machine, smp_param, mem_param];
    parts.extend(numa_params);
    parts.extend(device_params);
    parts.extend(object_params);
    Ok(parts.join(" "))
}
