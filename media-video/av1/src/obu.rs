//! OBU header parsing and splitting of low overhead bitstream format OBU streams
//!
//! Reference: <https://aomediacodec.github.io/av1-spec/#obu-syntax>

// obu_header() {
//  obu_forbidden_bit   f(1)
//  obu_type            f(4)
//  obu_extension_flag  f(1)
//  obu_has_size_field  f(1)
//  obu_reserved_1bit   f(1)
//  if ( obu_extension_flag == 1 )
//      obu_extension_header()
// }

// obu_extension_header() {
//  temporal_id                     f(3)
//  spatial_id                      f(2)
//  extension_header_reserved_3bits f(3)
// }

use crate::leb128::{Leb128Error, leb128_size, read_leb128, write_leb128};
use bitstream_io::{BigEndian, BitRead, BitReader};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::{SmallVec, smallvec};
use std::{fmt, io};

pub(crate) const OBU_TYPE_MASK: u8 = 0b0111_1000;
pub(crate) const OBU_EXTENSION_FLAG: u8 = 0b0000_0100;
pub(crate) const OBU_HAS_SIZE_FIELD: u8 = 0b0000_0010;
const OBU_RESERVED_1BIT: u8 = 0b0000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObuType {
    SequenceHeader,
    TemporalDelimiter,
    FrameHeader,
    TileGroup,
    Metadata,
    Frame,
    RedundantFrameHeader,
    TileList,
    Padding,
    /// Any other value, kept as is
    Reserved(u8),
}

impl ObuType {
    /// OBU types which are never transmitted over RTP
    pub fn is_dropped_by_rtp(self) -> bool {
        matches!(self, ObuType::TemporalDelimiter | ObuType::TileList)
    }

    /// Type of the OBU starting with the header byte `b0`
    pub(crate) fn from_header_byte(b0: u8) -> Self {
        Self::from((b0 & OBU_TYPE_MASK) >> 3)
    }
}

impl From<u8> for ObuType {
    fn from(value: u8) -> Self {
        match value {
            1 => ObuType::SequenceHeader,
            2 => ObuType::TemporalDelimiter,
            3 => ObuType::FrameHeader,
            4 => ObuType::TileGroup,
            5 => ObuType::Metadata,
            6 => ObuType::Frame,
            7 => ObuType::RedundantFrameHeader,
            8 => ObuType::TileList,
            15 => ObuType::Padding,
            other => ObuType::Reserved(other),
        }
    }
}

impl From<ObuType> for u8 {
    fn from(value: ObuType) -> Self {
        match value {
            ObuType::SequenceHeader => 1,
            ObuType::TemporalDelimiter => 2,
            ObuType::FrameHeader => 3,
            ObuType::TileGroup => 4,
            ObuType::Metadata => 5,
            ObuType::Frame => 6,
            ObuType::RedundantFrameHeader => 7,
            ObuType::TileList => 8,
            ObuType::Padding => 15,
            ObuType::Reserved(other) => other,
        }
    }
}

impl fmt::Display for ObuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObuType::SequenceHeader => "OBU_SEQUENCE_HEADER",
            ObuType::TemporalDelimiter => "OBU_TEMPORAL_DELIMITER",
            ObuType::FrameHeader => "OBU_FRAME_HEADER",
            ObuType::TileGroup => "OBU_TILE_GROUP",
            ObuType::Metadata => "OBU_METADATA",
            ObuType::Frame => "OBU_FRAME",
            ObuType::RedundantFrameHeader => "OBU_REDUNDANT_FRAME_HEADER",
            ObuType::TileList => "OBU_TILE_LIST",
            ObuType::Padding => "OBU_PADDING",
            ObuType::Reserved(_) => "OBU_RESERVED",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ObuError {
    #[error("obu_forbidden_bit is set")]
    ForbiddenBit,
    #[error("OBU header is truncated")]
    ShortHeader,
    #[error("invalid obu_size: {0}")]
    InvalidSize(#[from] Leb128Error),
    #[error("obu_size of {size} exceeds the {remaining} remaining bytes")]
    SizeExceedsBuffer { size: u64, remaining: usize },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ObuExtensionHeader {
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub reserved_3bits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    /// Present if `obu_extension_flag` is set
    pub extension: Option<ObuExtensionHeader>,
    pub has_size_field: bool,
    pub reserved_1bit: bool,
}

impl ObuHeader {
    pub fn new(obu_type: ObuType) -> Self {
        Self {
            obu_type,
            extension: None,
            has_size_field: false,
            reserved_1bit: false,
        }
    }

    /// Parse the OBU header at the start of `bytes`, returning it with its length in bytes
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), ObuError> {
        let mut reader = BitReader::endian(bytes, BigEndian);

        let header = Self::read(&mut reader).map_err(|e| match e {
            ReadError::ForbiddenBit => ObuError::ForbiddenBit,
            ReadError::Io => ObuError::ShortHeader,
        })?;

        Ok((header, header.size()))
    }

    fn read<R: BitRead>(reader: &mut R) -> Result<Self, ReadError> {
        if reader.read_bit()? {
            return Err(ReadError::ForbiddenBit);
        }

        let obu_type = reader.read::<4, u8>()?;
        let extension_flag = reader.read_bit()?;
        let has_size_field = reader.read_bit()?;
        let reserved_1bit = reader.read_bit()?;

        let extension = if extension_flag {
            Some(ObuExtensionHeader {
                temporal_id: reader.read::<3, u8>()?,
                spatial_id: reader.read::<2, u8>()?,
                reserved_3bits: reader.read::<3, u8>()?,
            })
        } else {
            None
        };

        Ok(Self {
            obu_type: ObuType::from(obu_type),
            extension,
            has_size_field,
            reserved_1bit,
        })
    }

    /// Encoded size of the header, 1 or 2 bytes
    pub fn size(&self) -> usize {
        if self.extension.is_some() { 2 } else { 1 }
    }

    /// Encode the header.
    ///
    /// Fields wider than their bit allotment are truncated.
    pub fn marshal(&self) -> SmallVec<[u8; 2]> {
        let mut b0 = (u8::from(self.obu_type) & 0x0F) << 3;

        if self.extension.is_some() {
            b0 |= OBU_EXTENSION_FLAG;
        }
        if self.has_size_field {
            b0 |= OBU_HAS_SIZE_FIELD;
        }
        if self.reserved_1bit {
            b0 |= OBU_RESERVED_1BIT;
        }

        match self.extension {
            Some(extension) => smallvec![
                b0,
                ((extension.temporal_id & 0x07) << 5)
                    | ((extension.spatial_id & 0x03) << 3)
                    | (extension.reserved_3bits & 0x07)
            ],
            None => smallvec![b0],
        }
    }

    /// Temporal and spatial id, (0, 0) without extension header
    pub fn layer_ids(&self) -> (u8, u8) {
        self.extension
            .map(|e| (e.temporal_id, e.spatial_id))
            .unwrap_or_default()
    }
}

enum ReadError {
    ForbiddenBit,
    Io,
}

impl From<io::Error> for ReadError {
    fn from(_: io::Error) -> Self {
        ReadError::Io
    }
}

/// A single OBU, the payload excludes the header and `obu_size` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obu {
    pub header: ObuHeader,
    pub payload: Bytes,
}

impl Obu {
    /// Parse the OBU at the start of `bytes`, returning it with the number of bytes it occupies.
    ///
    /// Without `obu_has_size_field` the OBU extends to the end of `bytes`.
    pub fn parse(bytes: &Bytes) -> Result<(Self, usize), ObuError> {
        let (header, header_len) = ObuHeader::parse(bytes)?;

        let rest = bytes.get(header_len..).ok_or(ObuError::ShortHeader)?;

        if !header.has_size_field {
            let obu = Obu {
                header,
                payload: bytes.slice(header_len..),
            };

            return Ok((obu, bytes.len()));
        }

        let (size, size_len) = read_leb128(rest)?;
        let remaining = rest.len() - size_len;

        if size > remaining as u64 {
            return Err(ObuError::SizeExceedsBuffer { size, remaining });
        }

        let start = header_len + size_len;
        let end = start + size as usize;

        let obu = Obu {
            header,
            payload: bytes.slice(start..end),
        };

        Ok((obu, end))
    }

    /// Length of the OBU when written without `obu_size` field
    pub(crate) fn len_without_size_field(&self) -> usize {
        self.header.size() + self.payload.len()
    }

    /// Write the OBU without `obu_size` field
    pub(crate) fn write_without_size_field(&self, out: &mut impl BufMut) {
        let header = ObuHeader {
            has_size_field: false,
            ..self.header
        };

        out.put_slice(&header.marshal());
        out.put_slice(&self.payload);
    }

    /// Write the OBU with its `obu_size` field set
    pub fn write_with_size_field(&self, out: &mut impl BufMut) {
        let header = ObuHeader {
            has_size_field: true,
            ..self.header
        };

        out.put_slice(&header.marshal());
        write_leb128(&mut *out, self.payload.len() as u64);
        out.put_slice(&self.payload);
    }

    /// The OBU with its `obu_size` field set
    pub fn to_bytes(&self) -> Bytes {
        let len = self.header.size() + leb128_size(self.payload.len() as u64) + self.payload.len();

        let mut buf = BytesMut::with_capacity(len);
        self.write_with_size_field(&mut buf);
        buf.freeze()
    }
}

/// Iterate over the OBUs in `bytes`.
///
/// Iteration stops after the first error.
pub fn split_obus(mut bytes: Bytes) -> impl Iterator<Item = Result<Obu, ObuError>> {
    std::iter::from_fn(move || {
        if bytes.is_empty() {
            return None;
        }

        match Obu::parse(&bytes) {
            Ok((obu, consumed)) => {
                bytes.advance(consumed);
                Some(Ok(obu))
            }
            Err(e) => {
                bytes.clear();
                Some(Err(e))
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_header() {
        let (header, len) = ObuHeader::parse(&[0x0A, 0xFF]).unwrap();

        assert_eq!(len, 1);
        assert_eq!(header.obu_type, ObuType::SequenceHeader);
        assert!(header.has_size_field);
        assert!(header.extension.is_none());
        assert!(!header.reserved_1bit);
    }

    #[test]
    fn parse_header_with_extension() {
        // frame, extension, temporal_id 5, spatial_id 2, reserved 3
        let (header, len) = ObuHeader::parse(&[0x34, 0b101_10_011]).unwrap();

        assert_eq!(len, 2);
        assert_eq!(header.obu_type, ObuType::Frame);
        assert!(!header.has_size_field);
        assert_eq!(
            header.extension,
            Some(ObuExtensionHeader {
                temporal_id: 5,
                spatial_id: 2,
                reserved_3bits: 3,
            })
        );
        assert_eq!(header.layer_ids(), (5, 2));
        assert_eq!(&header.marshal()[..], &[0x34, 0b101_10_011]);
    }

    #[test]
    fn parse_header_errors() {
        assert_eq!(ObuHeader::parse(&[0x80]), Err(ObuError::ForbiddenBit));
        assert_eq!(ObuHeader::parse(&[0x34]), Err(ObuError::ShortHeader));
        assert_eq!(ObuHeader::parse(&[]), Err(ObuError::ShortHeader));
    }

    #[test]
    fn reserved_types_are_preserved() {
        let (header, _) = ObuHeader::parse(&[0x48]).unwrap();

        assert_eq!(header.obu_type, ObuType::Reserved(9));
        assert_eq!(header.obu_type.to_string(), "OBU_RESERVED");
        assert_eq!(&header.marshal()[..], &[0x48]);

        let (header, _) = ObuHeader::parse(&[0x78]).unwrap();
        assert_eq!(header.obu_type, ObuType::Padding);
    }

    #[test]
    fn marshal_truncates_wide_fields() {
        let header = ObuHeader {
            obu_type: ObuType::Reserved(0xF6),
            extension: Some(ObuExtensionHeader {
                temporal_id: 0xFF,
                spatial_id: 0xFF,
                reserved_3bits: 0xFF,
            }),
            has_size_field: true,
            reserved_1bit: false,
        };

        assert_eq!(&header.marshal()[..], &[0x36, 0xFF]);

        let (parsed, _) = ObuHeader::parse(&header.marshal()).unwrap();
        assert_eq!(parsed.obu_type, ObuType::Frame);
        assert_eq!(
            parsed.extension,
            Some(ObuExtensionHeader {
                temporal_id: 7,
                spatial_id: 3,
                reserved_3bits: 7,
            })
        );
    }

    #[test]
    fn split_stream() {
        let stream = Bytes::from_static(&[
            0x12, 0x00, // temporal delimiter, size 0
            0x32, 0x02, 0xAA, 0xBB, // frame, size 2
            0x30, 0x01, 0x02, 0x03, // frame without size field
        ]);

        let obus = split_obus(stream).collect::<Result<Vec<_>, _>>().unwrap();

        assert_eq!(obus.len(), 3);
        assert_eq!(obus[0].header.obu_type, ObuType::TemporalDelimiter);
        assert!(obus[0].payload.is_empty());
        assert_eq!(&obus[1].payload[..], &[0xAA, 0xBB]);
        assert_eq!(&obus[2].payload[..], &[0x01, 0x02, 0x03]);
        assert_eq!(&obus[1].to_bytes()[..], &[0x32, 0x02, 0xAA, 0xBB]);
        assert_eq!(&obus[2].to_bytes()[..], &[0x32, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn split_stops_on_error() {
        let stream = Bytes::from_static(&[0x32, 0x01, 0xAA, 0x32, 0x05, 0xBB]);

        let obus: Vec<_> = split_obus(stream).collect();

        assert_eq!(obus.len(), 2);
        assert!(obus[0].is_ok());
        assert_eq!(
            obus[1],
            Err(ObuError::SizeExceedsBuffer {
                size: 5,
                remaining: 1
            })
        );
    }

    #[test]
    fn split_truncated_size() {
        let obus: Vec<_> = split_obus(Bytes::from_static(&[0x32, 0xFF])).collect();
        assert_eq!(obus, vec![Err(ObuError::InvalidSize(Leb128Error::Truncated))]);
    }

    fn headers() -> impl Strategy<Value = ObuHeader> {
        (
            0u8..16,
            proptest::option::of((0u8..8, 0u8..4, 0u8..8)),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(obu_type, extension, has_size_field, reserved_1bit)| ObuHeader {
                obu_type: ObuType::from(obu_type),
                extension: extension.map(|(temporal_id, spatial_id, reserved_3bits)| {
                    ObuExtensionHeader {
                        temporal_id,
                        spatial_id,
                        reserved_3bits,
                    }
                }),
                has_size_field,
                reserved_1bit,
            })
    }

    proptest! {
        #[test]
        fn header_roundtrip(header in headers()) {
            let bytes = header.marshal();
            prop_assert_eq!(bytes.len(), header.size());
            prop_assert_eq!(ObuHeader::parse(&bytes), Ok((header, header.size())));
        }
    }
}
