#![no_main]

use libfuzzer_sys::fuzz_target;
use vantage_core::format::decode_vantage_set;

fuzz_target!(|data: &[u8]| {
    let _ = decode_vantage_set(data);
});
