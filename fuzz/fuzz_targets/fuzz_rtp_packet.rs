#![no_main]

use libfuzzer_sys::fuzz_target;
use rtp::{RtpPacket, parse_extensions};

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = RtpPacket::parse(data.to_vec()) else {
        return;
    };

    if let Some(ids) = packet.header.extension_ids() {
        for id in ids {
            let _ = packet.header.extension(id);
        }
    }

    // Re-encoding a parsed packet must be stable
    if let Ok(bytes) = packet.marshal() {
        assert_eq!(bytes.len(), packet.marshal_size());

        let reparsed = RtpPacket::parse(bytes.clone()).expect("marshaled packet must parse");
        assert_eq!(reparsed.payload, packet.payload);
        assert_eq!(reparsed.marshal().ok(), Some(bytes));
    }

    if data.len() > 4 {
        let profile = u16::from_be_bytes([data[0], data[1]]);
        for element in parse_extensions(profile, &data[2..]) {
            let _ = element;
        }
    }
});
