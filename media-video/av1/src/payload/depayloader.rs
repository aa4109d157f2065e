use super::{AV1DePayloadError, AGGREGATION_Z, MAX_FRAGMENTED_OBU_SIZE, parse_payload};
use crate::leb128::{read_leb128, write_leb128};
use crate::obu::ObuHeader;
use bytes::{BufMut, Bytes, BytesMut};
use rtp::DePayloader;
use std::mem::take;

/// Reassembles OBUs from AV1 RTP payloads
///
/// Every OBU is returned with its `obu_size` field set, temporal delimiters and tile lists are removed.
#[derive(Debug, Default)]
pub struct AV1DePayloader {
    /// Fragment of an OBU which continues in the next payload
    fragment: Vec<u8>,
}

impl AV1DePayloader {
    pub fn new() -> AV1DePayloader {
        AV1DePayloader {
            fragment: Vec::new(),
        }
    }

    /// Reset the depayloader to the initial state
    ///
    /// Lost packets are only detected through the aggregation header. Call this on loss
    /// which the header cannot reveal, e.g. a gap in RTP sequence numbers.
    pub fn reset(&mut self) {
        self.fragment.clear();
    }

    fn extend_fragment(&mut self, bytes: &[u8]) -> Result<(), AV1DePayloadError> {
        // Cap the maximum OBU size somewhere to avoid allocating infinite memory
        if self.fragment.len() + bytes.len() > MAX_FRAGMENTED_OBU_SIZE {
            self.fragment = Vec::new();
            return Err(AV1DePayloadError::FragmentedObuTooLarge);
        }

        self.fragment.extend_from_slice(bytes);

        Ok(())
    }

    fn try_depayload(&mut self, payload: &[u8]) -> Result<Bytes, AV1DePayloadError> {
        let (header, elements) = parse_payload(payload)?;

        if header.n && !self.fragment.is_empty() {
            log::debug!("New coded video sequence, dropping incomplete OBU fragment");
            self.fragment.clear();
        }

        if !header.z && !self.fragment.is_empty() {
            log::debug!("Expected continuation of OBU fragment, dropping it");
            self.fragment.clear();
        }

        let mut obus = BytesMut::new();
        let last = elements.len().saturating_sub(1);

        for (i, range) in elements.into_iter().enumerate() {
            let element = &payload[range];
            let is_last = i == last;

            if i == 0 && header.z {
                if self.fragment.is_empty() {
                    // The start of this fragment was lost
                    log::debug!("Dropping continuation of lost OBU fragment");
                    continue;
                }

                self.extend_fragment(element)?;

                if is_last && header.y {
                    continue;
                }

                let obu = take(&mut self.fragment);
                write_obu(&mut obus, &obu)?;
            } else if is_last && header.y {
                self.extend_fragment(element)?;
            } else {
                write_obu(&mut obus, element)?;
            }
        }

        Ok(obus.freeze())
    }
}

impl DePayloader for AV1DePayloader {
    type Error = AV1DePayloadError;

    fn depayload(&mut self, payload: &[u8]) -> Result<Bytes, AV1DePayloadError> {
        let result = self.try_depayload(payload);

        // a rejected packet may have carried a part of the pending fragment
        if result.is_err() && !self.fragment.is_empty() {
            log::debug!("Dropping OBU fragment after invalid payload");
            self.fragment.clear();
        }

        result
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        payload.len() >= 2 && payload[0] & AGGREGATION_Z == 0
    }
}

/// Write a complete OBU element with its `obu_size` field set
fn write_obu(out: &mut impl BufMut, element: &[u8]) -> Result<(), AV1DePayloadError> {
    let (header, header_len) = ObuHeader::parse(element)?;

    if header.obu_type.is_dropped_by_rtp() {
        return Ok(());
    }

    let rest = &element[header_len..];

    // elements should not carry an obu_size field, but it is allowed
    let obu_payload = if header.has_size_field {
        let (size, consumed) = read_leb128(rest)?;

        if size > (rest.len() - consumed) as u64 {
            return Err(AV1DePayloadError::ShortPacket);
        }

        &rest[consumed..consumed + size as usize]
    } else {
        rest
    };

    let header = ObuHeader {
        has_size_field: true,
        ..header
    };

    out.put_slice(&header.marshal());
    write_leb128(&mut *out, obu_payload.len() as u64);
    out.put_slice(obu_payload);

    Ok(())
}
