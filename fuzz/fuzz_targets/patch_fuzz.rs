#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipuff::patch::{PatchOptions, puff_patch};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First byte picks the split between source and patch.
    let split = 1 + (data[0] as usize % (data.len() - 1));
    let (source, patch) = data[1..].split_at(split - 1);
    let opts = PatchOptions {
        max_cache_size: 1 << 20,
    };
    let _ = puff_patch(source, patch, &opts);
});
