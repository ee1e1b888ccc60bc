#![no_main]
use bump_core::payload::{COMMAND_OFFSET, PAYLOAD_LEN, PREFIX_LEN};
use bump_core::{Identity, decode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let id = Identity::default();
    if let Ok(cmd) = decode(data, id.prefix()) {
        assert_eq!(data.len(), PAYLOAD_LEN);
        assert_eq!(&data[..PREFIX_LEN], &id.prefix()[..]);
        assert_eq!(data[COMMAND_OFFSET], cmd.as_byte());
    }
});
