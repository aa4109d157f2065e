use super::{AggregationHeader, MAX_W};
use crate::leb128::{leb128_size, write_leb128};
use crate::obu::{Obu, ObuError, ObuType, split_obus};
use bytes::{BufMut, Bytes, BytesMut};
use rtp::Payloader;
use std::mem::take;

/// The OBU stream given to [`AV1Payloader::try_payload`] could not be parsed completely
#[derive(Debug, thiserror::Error)]
#[error("malformed OBU stream after {} packets: {source}", .packets.len())]
pub struct AV1PayloadError {
    /// Packets built from the OBUs preceding the malformed one
    pub packets: Vec<Bytes>,
    pub source: ObuError,
}

/// Packs a stream of OBUs into AV1 RTP payloads
///
/// OBUs are aggregated into a single payload as long as they share the same temporal and spatial id
/// and fit into the MTU. OBUs which do not fit into a payload on their own are fragmented.
#[derive(Debug, Default)]
pub struct AV1Payloader {
    _priv: (),
}

impl AV1Payloader {
    pub fn new() -> AV1Payloader {
        AV1Payloader { _priv: () }
    }

    /// Payload the OBUs of `frame` into payloads of at most `mtu` bytes.
    ///
    /// Temporal delimiters and tile lists are not transmitted. The `obu_size` field is removed from all OBUs.
    pub fn try_payload(&mut self, frame: &Bytes, mtu: usize) -> Result<Vec<Bytes>, AV1PayloadError> {
        let mut payloads = Vec::new();

        if mtu < 2 {
            return Ok(payloads);
        }

        let mut bundle = Bundle::new(mtu);

        for obu in split_obus(frame.clone()) {
            let obu = match obu {
                Ok(obu) => obu,
                Err(source) => {
                    bundle.flush(&mut payloads);

                    return Err(AV1PayloadError {
                        packets: payloads,
                        source,
                    });
                }
            };

            match obu.header.obu_type {
                ObuType::TemporalDelimiter => {
                    bundle.flush(&mut payloads);
                    continue;
                }
                ObuType::TileList => continue,
                ObuType::SequenceHeader => {
                    bundle.flush(&mut payloads);
                    bundle.new_coded_video_sequence = true;
                }
                _ => {}
            }

            if !bundle.obus.is_empty() && bundle.layer != obu.header.layer_ids() {
                bundle.flush(&mut payloads);
            }

            if obu.len_without_size_field() > mtu - 1 {
                bundle.flush(&mut payloads);
                bundle.fragment(&obu, &mut payloads);
                continue;
            }

            if !bundle.fits(&obu) {
                bundle.flush(&mut payloads);
            }

            bundle.push(obu);
        }

        bundle.flush(&mut payloads);

        Ok(payloads)
    }
}

impl Payloader for AV1Payloader {
    fn payload(&mut self, frame: &Bytes, max_size: usize) -> impl Iterator<Item = Bytes> + '_ {
        let payloads = match self.try_payload(frame, max_size) {
            Ok(payloads) => payloads,
            Err(e) => {
                log::warn!("Truncating AV1 frame, {e}");
                e.packets
            }
        };

        payloads.into_iter()
    }
}

/// OBUs waiting to be written into a single aggregation packet
struct Bundle {
    mtu: usize,
    obus: Vec<Obu>,
    /// Length of all elements including their length prefix
    prefixed_len: usize,
    /// Temporal and spatial id of the bundled OBUs
    layer: (u8, u8),
    /// Set the N bit on the next payload
    new_coded_video_sequence: bool,
}

impl Bundle {
    fn new(mtu: usize) -> Self {
        Self {
            mtu,
            obus: Vec::new(),
            prefixed_len: 0,
            layer: (0, 0),
            new_coded_video_sequence: false,
        }
    }

    fn packet_len(prefixed_len: usize, count: usize, last_len: usize) -> usize {
        // the last element only loses its length prefix when W can count the elements
        if count <= MAX_W {
            1 + prefixed_len - leb128_size(last_len as u64)
        } else {
            1 + prefixed_len
        }
    }

    fn fits(&self, obu: &Obu) -> bool {
        let len = obu.len_without_size_field();
        let prefixed_len = self.prefixed_len + leb128_size(len as u64) + len;

        Self::packet_len(prefixed_len, self.obus.len() + 1, len) <= self.mtu
    }

    fn push(&mut self, obu: Obu) {
        if self.obus.is_empty() {
            self.layer = obu.header.layer_ids();
        }

        let len = obu.len_without_size_field();
        self.prefixed_len += leb128_size(len as u64) + len;
        self.obus.push(obu);
    }

    fn flush(&mut self, payloads: &mut Vec<Bytes>) {
        let Some(last) = self.obus.last() else {
            return;
        };

        let count = self.obus.len();
        let len = Self::packet_len(self.prefixed_len, count, last.len_without_size_field());

        let header = AggregationHeader {
            z: false,
            y: false,
            w: if count <= MAX_W { count as u8 } else { 0 },
            n: take(&mut self.new_coded_video_sequence),
        };

        let mut payload = BytesMut::with_capacity(len);
        payload.put_u8(header.to_byte());

        for (i, obu) in self.obus.drain(..).enumerate() {
            if i + 1 < count || count > MAX_W {
                write_leb128(&mut payload, obu.len_without_size_field() as u64);
            }

            obu.write_without_size_field(&mut payload);
        }

        log::trace!("Aggregated {count} OBUs into a payload of {len} bytes");

        self.prefixed_len = 0;
        payloads.push(payload.freeze());
    }

    /// Write an OBU which exceeds the MTU on its own as a series of fragments
    fn fragment(&mut self, obu: &Obu, payloads: &mut Vec<Bytes>) {
        let mut element = BytesMut::with_capacity(obu.len_without_size_field());
        obu.write_without_size_field(&mut element);

        let fragment_len = self.mtu - 1;
        let num_fragments = element.len().div_ceil(fragment_len);

        log::trace!(
            "Fragmenting {} OBU of {} bytes into {num_fragments} payloads",
            obu.header.obu_type,
            element.len()
        );

        for (i, fragment) in element.chunks(fragment_len).enumerate() {
            let header = AggregationHeader {
                z: i > 0,
                y: i + 1 < num_fragments,
                w: 1,
                n: i == 0 && take(&mut self.new_coded_video_sequence),
            };

            let mut payload = BytesMut::with_capacity(1 + fragment.len());
            payload.put_u8(header.to_byte());
            payload.put_slice(fragment);

            payloads.push(payload.freeze());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn payload(frame: &'static [u8], mtu: usize) -> Vec<Vec<u8>> {
        AV1Payloader::new()
            .try_payload(&Bytes::from_static(frame), mtu)
            .unwrap()
            .into_iter()
            .map(|payload| payload.to_vec())
            .collect()
    }

    #[test]
    fn single_obu() {
        assert_eq!(
            payload(&[0x30, 0x01, 0x02, 0x03, 0x04, 0x05], 100),
            vec![vec![0x10, 0x30, 0x01, 0x02, 0x03, 0x04, 0x05]]
        );
    }

    #[test]
    fn nothing_to_payload() {
        assert!(payload(&[], 100).is_empty());
        assert!(payload(&[0x30, 0x01], 1).is_empty());
        assert!(payload(&[0x30, 0x01], 0).is_empty());
        assert!(payload(&[0x12, 0x00], 100).is_empty());
    }

    #[test]
    fn sequence_header_sets_n() {
        let frame = &[
            0x0A, 0x02, 0xAA, 0xBB, // sequence header
            0x32, 0x03, 0x01, 0x02, 0x03, // frame
        ];

        assert_eq!(
            payload(frame, 100),
            vec![vec![0x28, 0x03, 0x08, 0xAA, 0xBB, 0x30, 0x01, 0x02, 0x03]]
        );
    }

    #[test]
    fn sequence_header_starts_new_payload() {
        let frame = &[
            0x32, 0x01, 0xAA, // frame
            0x0A, 0x01, 0xBB, // sequence header
        ];

        assert_eq!(
            payload(frame, 100),
            vec![vec![0x10, 0x30, 0xAA], vec![0x18, 0x08, 0xBB]]
        );
    }

    #[test]
    fn temporal_delimiters_split_payloads() {
        let frame = &[
            0x12, 0x00, 0x32, 0x01, 0xAA, // first temporal unit
            0x12, 0x00, 0x32, 0x01, 0xBB, // second temporal unit
        ];

        assert_eq!(
            payload(frame, 100),
            vec![vec![0x10, 0x30, 0xAA], vec![0x10, 0x30, 0xBB]]
        );
    }

    #[test]
    fn tile_lists_are_dropped() {
        let frame = &[0x32, 0x01, 0xAA, 0x42, 0x01, 0xFF, 0x32, 0x01, 0xBB];

        assert_eq!(
            payload(frame, 100),
            vec![vec![0x20, 0x02, 0x30, 0xAA, 0x30, 0xBB]]
        );
    }

    #[test]
    fn more_than_three_elements_are_all_prefixed() {
        let frame = &[
            0x32, 0x01, 0x01, 0x32, 0x01, 0x02, 0x32, 0x01, 0x03, 0x32, 0x01, 0x04,
        ];

        assert_eq!(
            payload(frame, 100),
            vec![vec![
                0x00, 0x02, 0x30, 0x01, 0x02, 0x30, 0x02, 0x02, 0x30, 0x03, 0x02, 0x30, 0x04
            ]]
        );
    }

    #[test]
    fn aggregation_respects_mtu() {
        let frame = &[0x32, 0x02, 0x01, 0x02, 0x32, 0x02, 0x03, 0x04];

        assert_eq!(
            payload(frame, 8),
            vec![vec![0x20, 0x03, 0x30, 0x01, 0x02, 0x30, 0x03, 0x04]]
        );

        assert_eq!(
            payload(frame, 7),
            vec![vec![0x10, 0x30, 0x01, 0x02], vec![0x10, 0x30, 0x03, 0x04]]
        );
    }

    #[test]
    fn layer_change_splits_payloads() {
        // temporal_id 1 and 2
        let frame = &[0x36, 0x20, 0x01, 0xAA, 0x36, 0x40, 0x01, 0xBB];

        assert_eq!(
            payload(frame, 100),
            vec![vec![0x10, 0x34, 0x20, 0xAA], vec![0x10, 0x34, 0x40, 0xBB]]
        );
    }

    #[test]
    fn fragmentation() {
        let frame = &[0x32, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05];

        assert_eq!(
            payload(frame, 4),
            vec![vec![0x50, 0x30, 0x01, 0x02], vec![0x90, 0x03, 0x04, 0x05]]
        );

        assert_eq!(
            payload(frame, 3),
            vec![
                vec![0x50, 0x30, 0x01],
                vec![0xD0, 0x02, 0x03],
                vec![0x90, 0x04, 0x05]
            ]
        );
    }

    #[test]
    fn fragmented_sequence_header_sets_n_once() {
        let frame = &[0x0A, 0x03, 0x01, 0x02, 0x03];

        assert_eq!(
            payload(frame, 3),
            vec![vec![0x58, 0x08, 0x01], vec![0x90, 0x02, 0x03]]
        );
    }

    #[test]
    fn malformed_stream_returns_built_payloads() {
        let frame = Bytes::from_static(&[0x32, 0x01, 0xAA, 0x32, 0x05, 0xBB]);

        let err = AV1Payloader::new().try_payload(&frame, 100).unwrap_err();

        assert_eq!(err.packets, vec![Bytes::from_static(&[0x10, 0x30, 0xAA])]);
        assert_eq!(
            err.source,
            ObuError::SizeExceedsBuffer {
                size: 5,
                remaining: 1
            }
        );

        let payloads: Vec<Bytes> = Payloader::payload(&mut AV1Payloader::new(), &frame, 100).collect();
        assert_eq!(payloads, err.packets);
    }
}
