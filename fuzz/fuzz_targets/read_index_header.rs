#![no_main]

use libfuzzer_sys::fuzz_target;
use vantage_core::format::IndexHeader;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = IndexHeader::from_bytes(data) {
        let _ = header.file_size();
        let _ = header.to_bytes();
    }
});
