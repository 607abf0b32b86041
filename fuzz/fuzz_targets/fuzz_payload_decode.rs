#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the decoder.
    if let Ok(record) = beaconsync::sync::decode(data) {
        assert_eq!(data.len(), beaconsync::sync::PAYLOAD_LEN);
        assert_eq!(&beaconsync::sync::encode(&record)[..], data);
    }
});
