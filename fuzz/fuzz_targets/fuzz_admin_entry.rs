#![no_main]

use fedchain_blocks::AdminBlockEntry;
use fedchain_protocol::{decode_exact, Encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(entry) = decode_exact::<AdminBlockEntry>(data) {
        let encoded = entry.encode().expect("decoded entry re-encodes");
        assert_eq!(encoded, data);
    }
});
