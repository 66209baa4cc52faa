#![no_main]

use libfuzzer_sys::fuzz_target;
use numatool::owners;
use numatool::topology::Topology;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Dump parsing and owner attachment must never panic
        if let Ok(mut topology) = Topology::from_dump(input) {
            let masks = owners::parse_res_allowed(input);
            owners::attach_owners(&mut topology, &masks);
            let _ = topology.tree.render_text();
        }
    }
});
