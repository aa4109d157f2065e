use crate::extensions::{ExtensionProfile, RtpExtension, padding_32_bit_boundary, parse_extensions};
use crate::{RTP_HEADER_LEN, RtpTimestamp, SequenceNumber, Ssrc};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const RTP_VERSION: u8 = 2;
const MAX_CSRC_COUNT: usize = 15;
const CSRC_LEN: usize = 4;
const EXTENSION_HEADER_LEN: usize = 4;

const VERSION_SHIFT: u8 = 6;
const PADDING_BIT: u8 = 1 << 5;
const EXTENSION_BIT: u8 = 1 << 4;
const CC_MASK: u8 = 0x0F;
const MARKER_BIT: u8 = 1 << 7;
const PT_MASK: u8 = 0x7F;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RtpError {
    #[error("RTP header size insufficient")]
    HeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    HeaderSizeInsufficientForExtension,
    #[error("RTP padding size exceeds the packet length")]
    TooSmall,
    #[error("buffer too small to marshal the RTP packet")]
    BufferTooSmall,
    #[error("RTP header can carry at most 15 CSRCs, got {0}")]
    TooManyCsrcs(usize),
    #[error("header extension id {id} with a {len} byte payload is invalid for the extension profile")]
    InvalidExtensionRange { id: u8, len: usize },
    #[error("header extensions are not enabled")]
    ExtensionsDisabled,
    #[error("header extension {0} not found")]
    ExtensionNotFound(u8),
}

/// RTP fixed header, CSRC list and header extensions
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: SequenceNumber,
    pub timestamp: RtpTimestamp,
    pub ssrc: Ssrc,
    pub csrc: Vec<u32>,
    /// Raw profile field, `0xBEDE` and `0x1000` select the RFC 8285 formats
    pub extension_profile: u16,
    pub extensions: Vec<RtpExtension>,
    /// Number of padding bytes at the end of the packet (including the count byte), 0 if none
    pub padding_size: u8,
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type: 0,
            sequence_number: SequenceNumber(0),
            timestamp: RtpTimestamp(0),
            ssrc: Ssrc(0),
            csrc: Vec::new(),
            extension_profile: 0,
            extensions: Vec::new(),
            padding_size: 0,
        }
    }
}

impl RtpHeader {
    /// Parse a header from the start of `buf`, returning it with the number of bytes it occupies
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RtpError> {
        let mut header = Self::default();
        let len = header.unmarshal(buf)?;
        Ok((header, len))
    }

    /// Parse the header at the start of `buf` into `self`, reusing its allocations.
    ///
    /// Returns the number of bytes consumed.
    pub fn unmarshal(&mut self, buf: &[u8]) -> Result<usize, RtpError> {
        self.csrc.clear();
        self.extensions.clear();
        self.extension_profile = 0;
        self.padding_size = 0;

        let mut reader = buf;

        if reader.len() < RTP_HEADER_LEN {
            return Err(RtpError::HeaderSizeInsufficient);
        }

        let b0 = reader.get_u8();
        let b1 = reader.get_u8();

        self.version = b0 >> VERSION_SHIFT;
        self.padding = b0 & PADDING_BIT != 0;
        self.extension = b0 & EXTENSION_BIT != 0;
        self.marker = b1 & MARKER_BIT != 0;
        self.payload_type = b1 & PT_MASK;
        self.sequence_number = SequenceNumber(reader.get_u16());
        self.timestamp = RtpTimestamp(reader.get_u32());
        self.ssrc = Ssrc(reader.get_u32());

        let csrc_count = usize::from(b0 & CC_MASK);
        if reader.len() < csrc_count * CSRC_LEN {
            return Err(RtpError::HeaderSizeInsufficient);
        }

        self.csrc
            .extend((0..csrc_count).map(|_| reader.get_u32()));

        if self.extension {
            if reader.len() < EXTENSION_HEADER_LEN {
                return Err(RtpError::HeaderSizeInsufficientForExtension);
            }

            self.extension_profile = reader.get_u16();
            let extension_len = usize::from(reader.get_u16()) * 4;

            let Some((extension_data, remaining)) = reader.split_at_checked(extension_len) else {
                return Err(RtpError::HeaderSizeInsufficientForExtension);
            };

            for extension in parse_extensions(self.extension_profile, extension_data) {
                let (id, payload) = extension?;

                self.extensions.push(RtpExtension {
                    id,
                    payload: Bytes::copy_from_slice(payload),
                });
            }

            reader = remaining;
        }

        Ok(buf.len() - reader.len())
    }

    /// Exact number of bytes [`RtpHeader::marshal`] produces
    pub fn marshal_size(&self) -> usize {
        let mut size = RTP_HEADER_LEN + self.csrc.len() * CSRC_LEN;

        if self.extension {
            let extensions_len = self.extensions_len();
            size += EXTENSION_HEADER_LEN + extensions_len + padding_32_bit_boundary(extensions_len);
        }

        size
    }

    pub fn marshal(&self) -> Result<Bytes, RtpError> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.write(&mut buf, self.padding)?;
        Ok(buf.freeze())
    }

    /// Write the header into the start of `buf`, returning the number of bytes written
    pub fn marshal_to(&self, buf: &mut [u8]) -> Result<usize, RtpError> {
        let size = self.marshal_size();

        let Some(mut target) = buf.get_mut(..size) else {
            return Err(RtpError::BufferTooSmall);
        };

        self.write(&mut target, self.padding)?;

        Ok(size)
    }

    pub(crate) fn write(&self, out: &mut impl BufMut, padding: bool) -> Result<(), RtpError> {
        if self.csrc.len() > MAX_CSRC_COUNT {
            return Err(RtpError::TooManyCsrcs(self.csrc.len()));
        }

        let profile = ExtensionProfile::from(self.extension_profile);
        let extensions_len = self.extensions_len();
        let extension_padding = padding_32_bit_boundary(extensions_len);
        let extension_words = (extensions_len + extension_padding) / 4;

        if self.extension {
            for extension in &self.extensions {
                profile.validate(extension.id, extension.payload.len())?;
            }

            if extension_words > usize::from(u16::MAX) {
                return Err(RtpError::InvalidExtensionRange {
                    id: 0,
                    len: extensions_len,
                });
            }
        }

        let mut b0 = (self.version & 0x3) << VERSION_SHIFT;
        if padding {
            b0 |= PADDING_BIT;
        }
        if self.extension {
            b0 |= EXTENSION_BIT;
        }
        b0 |= self.csrc.len() as u8;

        let mut b1 = self.payload_type & PT_MASK;
        if self.marker {
            b1 |= MARKER_BIT;
        }

        out.put_u8(b0);
        out.put_u8(b1);
        out.put_u16(self.sequence_number.0);
        out.put_u32(self.timestamp.0);
        out.put_u32(self.ssrc.0);

        for csrc in &self.csrc {
            out.put_u32(*csrc);
        }

        if self.extension {
            out.put_u16(self.extension_profile);
            out.put_u16(extension_words as u16);

            for extension in &self.extensions {
                profile.write_element(out, extension);
            }

            out.put_bytes(0, extension_padding);
        }

        Ok(())
    }

    fn extensions_len(&self) -> usize {
        let profile = ExtensionProfile::from(self.extension_profile);

        self.extensions
            .iter()
            .map(|extension| profile.element_len(extension.payload.len()))
            .sum()
    }

    /// Set the payload of the extension with the given `id`, replacing any previous value.
    ///
    /// If extensions are not yet enabled they are enabled using the one-byte profile when the
    /// payload fits into it, the two-byte profile otherwise.
    pub fn set_extension(&mut self, id: u8, payload: impl Into<Bytes>) -> Result<(), RtpError> {
        let payload = payload.into();

        let profile = if self.extension {
            ExtensionProfile::from(self.extension_profile)
        } else if payload.is_empty() || payload.len() > 16 {
            ExtensionProfile::TwoByte
        } else {
            ExtensionProfile::OneByte
        };

        profile.validate(id, payload.len())?;

        if !self.extension {
            self.extension = true;
            self.extension_profile = profile.into();
        }

        if let Some(extension) = self.extensions.iter_mut().find(|e| e.id == id) {
            extension.payload = payload;
        } else {
            self.extensions.push(RtpExtension { id, payload });
        }

        Ok(())
    }

    /// Payload of the extension with the given `id`
    pub fn extension(&self, id: u8) -> Option<&Bytes> {
        if !self.extension {
            return None;
        }

        self.extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| &e.payload)
    }

    /// Ids of all extensions in order, `None` if extensions are disabled
    pub fn extension_ids(&self) -> Option<Vec<u8>> {
        if !self.extension {
            return None;
        }

        Some(self.extensions.iter().map(|e| e.id).collect())
    }

    pub fn del_extension(&mut self, id: u8) -> Result<(), RtpError> {
        if !self.extension {
            return Err(RtpError::ExtensionsDisabled);
        }

        let index = self
            .extensions
            .iter()
            .position(|e| e.id == id)
            .ok_or(RtpError::ExtensionNotFound(id))?;

        self.extensions.remove(index);

        Ok(())
    }
}
