#![no_main]

use libfuzzer_sys::fuzz_target;
use numatool::numactl;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Listing conversion must never panic
        let _ = numactl::to_spec(input);
    }
});
