#![no_main]

use fedchain_messages::Message;
use fedchain_protocol::{decode_exact, Encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary frames must never panic the decoder, and anything that
    // decodes must encode back to the same bytes.
    if let Ok(message) = decode_exact::<Message>(data) {
        let encoded = message.encode().expect("decoded message re-encodes");
        assert_eq!(encoded, data, "wire format is not canonical");
        let _ = message.hash();
        let _ = message.verify();
    }
});
