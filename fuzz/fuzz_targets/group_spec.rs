#![no_main]

use libfuzzer_sys::fuzz_target;
use numatool::groups::parse_groups;
use numatool::qemu;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(value) = serde_json::from_str(input) {
            // Spec validation and option emission must never panic
            if let Ok(groups) = parse_groups(&value) {
                let _ = qemu::qemu_options(&groups);
            }
        }
    }
});
