#![no_main]

use fedchain_blocks::{AdminBlock, DirectoryBlock, EntryCreditBlock, FactoidBlock};
use fedchain_protocol::decode_exact;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Stored and DBState-carried blocks come from untrusted peers.
    if let Ok(block) = decode_exact::<DirectoryBlock>(data) {
        let _ = block.key_mr();
    }
    if let Ok(block) = decode_exact::<AdminBlock>(data) {
        let _ = block.db_height();
    }
    let _ = decode_exact::<FactoidBlock>(data);
    let _ = decode_exact::<EntryCreditBlock>(data);
});
