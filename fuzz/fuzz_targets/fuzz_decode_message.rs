#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use wire_lease::protocol::decode_message;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several messages may arrive in one read; decode until the buffer
    // runs dry or a message is incomplete.
    while !buf.is_empty() {
        match decode_message(&buf) {
            Ok((_, consumed)) => {
                let _ = buf.split_to(consumed);
            }
            Err(_) => break,
        }
    }
});
