use crate::leb128::{Leb128Error, read_leb128};
use crate::obu::ObuError;
use smallvec::SmallVec;
use std::ops::Range;

mod depayloader;
mod frame;
mod payloader;

pub use depayloader::AV1DePayloader;
pub use frame::{AV1FrameAssembler, AV1Packet};
pub use payloader::{AV1PayloadError, AV1Payloader};

// Reference https://aomediacodec.github.io/av1-rtp-spec/v1.0.0.html

// AV1 Aggregation Header
//  0 1 2 3 4 5 6 7
// +-+-+-+-+-+-+-+-+
// |Z|Y| W |N|-|-|-|
// +-+-+-+-+-+-+-+-+
// Z: MUST be set to 1 if the first OBU element is an OBU fragment that is a continuation of an OBU fragment from the previous packet,
//    and MUST be set to 0 otherwise.
// Y: MUST be set to 1 if the last OBU element is an OBU fragment that will continue in the next packet, and MUST be set to 0 otherwise.
// W: two bit field that describes the number of OBU elements in the packet.
//    This field MUST be set equal to 0 or equal to the number of OBU elements contained in the packet.
//    If set to 0, each OBU element MUST be preceded by a length field.
//    If not set to 0 (i.e., W = 1, 2 or 3) the last OBU element MUST NOT be preceded by a length field.
// N: MUST be set to 1 if the packet is the first packet of a coded video sequence, and MUST be set to 0 otherwise.

const AGGREGATION_Z: u8 = 1 << 7;
const AGGREGATION_Y: u8 = 1 << 6;
const AGGREGATION_N: u8 = 1 << 3;

/// Maximum number of elements which can be counted by the W field
const MAX_W: usize = 3;

/// Upper bound of a fragmented OBU being reassembled
const MAX_FRAGMENTED_OBU_SIZE: usize = 100_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregationHeader {
    /// First element continues a fragment of the previous packet
    pub z: bool,
    /// Last element continues in the next packet
    pub y: bool,
    /// Number of elements, 0 if every element has a length prefix
    pub w: u8,
    /// First packet of a coded video sequence
    pub n: bool,
}

impl AggregationHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            z: byte & AGGREGATION_Z != 0,
            y: byte & AGGREGATION_Y != 0,
            w: (byte >> 4) & 0x3,
            n: byte & AGGREGATION_N != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = (self.w & 0x3) << 4;

        if self.z {
            byte |= AGGREGATION_Z;
        }
        if self.y {
            byte |= AGGREGATION_Y;
        }
        if self.n {
            byte |= AGGREGATION_N;
        }

        byte
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AV1DePayloadError {
    #[error("Unexpected end of packet")]
    ShortPacket,
    #[error("Invalid OBU element length: {0}")]
    InvalidLength(#[from] Leb128Error),
    #[error("Got 0 length for OBU element")]
    ZeroLengthObu,
    #[error("Invalid OBU: {0}")]
    InvalidObu(#[from] ObuError),
    #[error("Received OBU exceeded maximum allowed size")]
    FragmentedObuTooLarge,
}

/// Parse the aggregation header and locate the OBU elements of an AV1 RTP payload.
///
/// Returned ranges index into `payload`, every element is non-empty.
fn parse_payload(
    payload: &[u8],
) -> Result<(AggregationHeader, SmallVec<[Range<usize>; 4]>), AV1DePayloadError> {
    if payload.len() < 2 {
        return Err(AV1DePayloadError::ShortPacket);
    }

    let header = AggregationHeader::parse(payload[0]);

    let mut elements = SmallVec::new();
    let mut offset = 1;

    while offset < payload.len() {
        let remaining = payload.len() - offset;

        // With a W count the last element has no length prefix
        let is_implicit = header.w != 0 && elements.len() + 1 == usize::from(header.w);

        let range = if is_implicit {
            offset..payload.len()
        } else {
            let (len, consumed) = read_leb128(&payload[offset..])?;

            if len > (remaining - consumed) as u64 {
                return Err(AV1DePayloadError::ShortPacket);
            }

            let start = offset + consumed;
            start..start + len as usize
        };

        if range.is_empty() {
            return Err(AV1DePayloadError::ZeroLengthObu);
        }

        offset = range.end;
        elements.push(range);
    }

    Ok((header, elements))
}
