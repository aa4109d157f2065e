#![no_main]

use av1::{AV1DePayloader, AV1FrameAssembler, AV1Packet};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use rtp::DePayloader;

fuzz_target!(|data: &[u8]| {
    let mut depayloader = AV1DePayloader::new();
    let mut assembler = AV1FrameAssembler::new();

    // Treat the input as a sequence of length prefixed payloads
    let mut data = data;
    while let Some((&len, rest)) = data.split_first() {
        let len = usize::from(len).min(rest.len());
        let (payload, rest) = rest.split_at(len);
        data = rest;

        let _ = depayloader.is_partition_head(payload);
        let _ = depayloader.depayload(payload);

        if let Ok(packet) = AV1Packet::unmarshal(&Bytes::copy_from_slice(payload)) {
            let _ = assembler.read_frames(&packet);
        }
    }
});
