use super::{AV1DePayloadError, MAX_FRAGMENTED_OBU_SIZE, parse_payload};
use crate::obu::ObuType;
use bytes::{Bytes, BytesMut};

/// A parsed AV1 RTP payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AV1Packet {
    /// First element continues a fragment of the previous packet
    pub z: bool,
    /// Last element continues in the next packet
    pub y: bool,
    /// First packet of a coded video sequence
    pub n: bool,
    pub w: u8,
    /// The OBU elements without their length prefixes
    pub obu_elements: Vec<Bytes>,
}

impl AV1Packet {
    pub fn unmarshal(payload: &Bytes) -> Result<Self, AV1DePayloadError> {
        let (header, elements) = parse_payload(payload)?;

        Ok(Self {
            z: header.z,
            y: header.y,
            n: header.n,
            w: header.w,
            obu_elements: elements
                .into_iter()
                .map(|range| payload.slice(range))
                .collect(),
        })
    }
}

/// Collects complete OBU elements from a sequence of [`AV1Packet`]s
///
/// Unlike the [`AV1DePayloader`](super::AV1DePayloader) the OBUs are returned as they were transmitted,
/// without an `obu_size` field.
#[derive(Debug, Default)]
pub struct AV1FrameAssembler {
    partial: Option<BytesMut>,
}

impl AV1FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all OBUs completed by `packet` in order of arrival
    pub fn read_frames(&mut self, packet: &AV1Packet) -> Vec<Bytes> {
        let mut obus = Vec::with_capacity(packet.obu_elements.len());

        if !packet.z && self.partial.take().is_some() {
            log::debug!("Abandoning partial OBU, packet does not continue it");
        }

        let last = packet.obu_elements.len().saturating_sub(1);

        for (i, element) in packet.obu_elements.iter().enumerate() {
            let is_last = i == last;

            let obu = if i == 0 && packet.z {
                let Some(mut partial) = self.partial.take() else {
                    log::debug!("Dropping OBU fragment, its start was lost");
                    continue;
                };

                partial.extend_from_slice(element);

                if partial.len() > MAX_FRAGMENTED_OBU_SIZE {
                    log::warn!("Abandoning partial OBU exceeding the maximum size");
                    continue;
                }

                if is_last && packet.y {
                    self.partial = Some(partial);
                    continue;
                }

                partial.freeze()
            } else if is_last && packet.y {
                self.partial = Some(BytesMut::from(&element[..]));
                continue;
            } else {
                element.clone()
            };

            let Some(&b0) = obu.first() else {
                continue;
            };

            if !ObuType::from_header_byte(b0).is_dropped_by_rtp() {
                obus.push(obu);
            }
        }

        obus
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn packet(payload: &'static [u8]) -> AV1Packet {
        AV1Packet::unmarshal(&Bytes::from_static(payload)).unwrap()
    }

    #[test]
    fn unmarshal_packet() {
        let packet = packet(&[0x68, 0x02, 0x30, 0x01, 0x30, 0x02, 0x03]);

        assert!(!packet.z);
        assert!(packet.y);
        assert!(packet.n);
        assert_eq!(packet.w, 2);
        assert_eq!(
            packet.obu_elements,
            vec![
                Bytes::from_static(&[0x30, 0x01]),
                Bytes::from_static(&[0x30, 0x02, 0x03])
            ]
        );
    }

    #[test]
    fn unmarshal_errors() {
        assert_eq!(
            AV1Packet::unmarshal(&Bytes::from_static(&[0x00])),
            Err(AV1DePayloadError::ShortPacket)
        );
        assert_eq!(
            AV1Packet::unmarshal(&Bytes::from_static(&[0x00, 0x03, 0x30])),
            Err(AV1DePayloadError::ShortPacket)
        );
    }

    #[test]
    fn complete_elements() {
        let mut assembler = AV1FrameAssembler::new();

        assert_eq!(
            assembler.read_frames(&packet(&[0x20, 0x01, 0x30, 0x30, 0xAA])),
            vec![
                Bytes::from_static(&[0x30]),
                Bytes::from_static(&[0x30, 0xAA])
            ]
        );
    }

    #[test]
    fn fragments_across_packets() {
        let mut assembler = AV1FrameAssembler::new();

        assert!(assembler.read_frames(&packet(&[0x50, 0x30, 0x01])).is_empty());
        assert!(assembler.read_frames(&packet(&[0xD0, 0x02])).is_empty());
        assert_eq!(
            assembler.read_frames(&packet(&[0xA0, 0x01, 0x03, 0x30, 0xBB])),
            vec![
                Bytes::from_static(&[0x30, 0x01, 0x02, 0x03]),
                Bytes::from_static(&[0x30, 0xBB])
            ]
        );
    }

    #[test]
    fn lost_fragment_start() {
        let mut assembler = AV1FrameAssembler::new();

        assert_eq!(
            assembler.read_frames(&packet(&[0xA0, 0x01, 0x03, 0x30, 0xBB])),
            vec![Bytes::from_static(&[0x30, 0xBB])]
        );
    }

    #[test]
    fn partial_is_abandoned_without_continuation() {
        let mut assembler = AV1FrameAssembler::new();

        assert!(assembler.read_frames(&packet(&[0x50, 0x30, 0x01])).is_empty());
        assert_eq!(
            assembler.read_frames(&packet(&[0x10, 0x30, 0xAA])),
            vec![Bytes::from_static(&[0x30, 0xAA])]
        );
        assert!(assembler.read_frames(&packet(&[0x90, 0x02])).is_empty());
    }

    #[test]
    fn dropped_obu_types() {
        let mut assembler = AV1FrameAssembler::new();

        assert_eq!(
            assembler.read_frames(&packet(&[0x30, 0x01, 0x10, 0x02, 0x40, 0xFF, 0x30, 0xAA])),
            vec![Bytes::from_static(&[0x30, 0xAA])]
        );

        // temporal delimiter spread over two packets
        assert!(assembler.read_frames(&packet(&[0x50, 0x10])).is_empty());
        assert!(assembler.read_frames(&packet(&[0x90, 0x00])).is_empty());
    }
}
