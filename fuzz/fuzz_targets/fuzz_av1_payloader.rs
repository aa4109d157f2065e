#![no_main]

use av1::AV1Payloader;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&mtu, stream)) = data.split_first() else {
        return;
    };

    let mtu = usize::from(mtu);
    let stream = Bytes::copy_from_slice(stream);

    let payloads = match AV1Payloader::new().try_payload(&stream, mtu) {
        Ok(payloads) => payloads,
        Err(e) => e.packets,
    };

    for payload in payloads {
        assert!(payload.len() <= mtu);
    }
});
