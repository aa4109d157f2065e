use crate::RtpError;
use bytes::{BufMut, Bytes};

/// Profile of the RFC 8285 one-byte header extension format
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
/// Profile of the RFC 8285 two-byte header extension format
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;

const ONE_BYTE_RESERVED_ID: u8 = 15;
const ONE_BYTE_MAX_PAYLOAD_LEN: usize = 16;
const TWO_BYTE_MAX_PAYLOAD_LEN: usize = 255;

/// Layout of the header extension block, derived from the 16 bit profile field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionProfile {
    /// RFC 8285 one-byte header: 4 bit id, 4 bit length
    OneByte,
    /// RFC 8285 two-byte header: 8 bit id, 8 bit length
    TwoByte,
    /// RFC 3550 opaque extension with a profile defined elsewhere
    Rfc3550(u16),
}

impl From<u16> for ExtensionProfile {
    fn from(profile: u16) -> Self {
        match profile {
            EXTENSION_PROFILE_ONE_BYTE => Self::OneByte,
            EXTENSION_PROFILE_TWO_BYTE => Self::TwoByte,
            other => Self::Rfc3550(other),
        }
    }
}

impl From<ExtensionProfile> for u16 {
    fn from(profile: ExtensionProfile) -> Self {
        match profile {
            ExtensionProfile::OneByte => EXTENSION_PROFILE_ONE_BYTE,
            ExtensionProfile::TwoByte => EXTENSION_PROFILE_TWO_BYTE,
            ExtensionProfile::Rfc3550(other) => other,
        }
    }
}

impl ExtensionProfile {
    /// Check that an extension element with the given id and payload length can be encoded
    pub fn validate(self, id: u8, len: usize) -> Result<(), RtpError> {
        let valid = match self {
            ExtensionProfile::OneByte => {
                (1..=14).contains(&id) && (1..=ONE_BYTE_MAX_PAYLOAD_LEN).contains(&len)
            }
            ExtensionProfile::TwoByte => id >= 1 && len <= TWO_BYTE_MAX_PAYLOAD_LEN,
            ExtensionProfile::Rfc3550(_) => id == 0 && len <= usize::from(u16::MAX) * 4,
        };

        if valid {
            Ok(())
        } else {
            Err(RtpError::InvalidExtensionRange { id, len })
        }
    }

    /// Number of bytes a single element occupies, excluding padding
    pub(crate) fn element_len(self, payload_len: usize) -> usize {
        match self {
            ExtensionProfile::OneByte => 1 + payload_len,
            ExtensionProfile::TwoByte => 2 + payload_len,
            ExtensionProfile::Rfc3550(_) => payload_len,
        }
    }

    pub(crate) fn write_element(self, out: &mut impl BufMut, extension: &RtpExtension) {
        match self {
            ExtensionProfile::OneByte => {
                // validated to be within 1..=16
                let len = (extension.payload.len() - 1) as u8;
                out.put_u8((extension.id << 4) | (len & 0x0F));
            }
            ExtensionProfile::TwoByte => {
                out.put_slice(&[extension.id, extension.payload.len() as u8]);
            }
            ExtensionProfile::Rfc3550(_) => {}
        }

        out.put_slice(&extension.payload);
    }
}

/// Single header extension element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpExtension {
    /// Extension id, always 0 for RFC 3550 extensions
    pub id: u8,
    pub payload: Bytes,
}

/// Iterate over the elements of a header extension block.
///
/// RFC 3550 extensions are yielded as a single element with id 0.
pub fn parse_extensions(
    profile: u16,
    data: &[u8],
) -> impl Iterator<Item = Result<(u8, &[u8]), RtpError>> {
    let mut data = data;
    let profile = ExtensionProfile::from(profile);

    std::iter::from_fn(move || match profile {
        ExtensionProfile::OneByte => parse_onebyte(&mut data),
        ExtensionProfile::TwoByte => parse_twobyte(&mut data),
        ExtensionProfile::Rfc3550(_) => {
            if data.is_empty() {
                None
            } else {
                Some(Ok((0, std::mem::take(&mut data))))
            }
        }
    })
}

// https://www.rfc-editor.org/rfc/rfc8285#section-4.2
fn parse_onebyte<'a>(data: &mut &'a [u8]) -> Option<Result<(u8, &'a [u8]), RtpError>> {
    loop {
        let current: &'a [u8] = *data;
        let (&b, remaining) = current.split_first()?;

        // padding
        if b == 0 {
            *data = remaining;
            continue;
        }

        let id = b >> 4;
        if id == ONE_BYTE_RESERVED_ID {
            *data = &[];
            return None;
        }

        let len = (b & 0x0F) as usize + 1;

        let Some((payload, remaining)) = remaining.split_at_checked(len) else {
            *data = &[];
            return Some(Err(RtpError::HeaderSizeInsufficientForExtension));
        };

        *data = remaining;
        return Some(Ok((id, payload)));
    }
}

// https://www.rfc-editor.org/rfc/rfc8285#section-4.3
fn parse_twobyte<'a>(data: &mut &'a [u8]) -> Option<Result<(u8, &'a [u8]), RtpError>> {
    loop {
        let current: &'a [u8] = *data;
        let (&id, remaining) = current.split_first()?;

        // padding
        if id == 0 {
            *data = remaining;
            continue;
        }

        let Some((&len, remaining)) = remaining.split_first() else {
            *data = &[];
            return Some(Err(RtpError::HeaderSizeInsufficientForExtension));
        };

        let Some((payload, remaining)) = remaining.split_at_checked(len as usize) else {
            *data = &[];
            return Some(Err(RtpError::HeaderSizeInsufficientForExtension));
        };

        *data = remaining;
        return Some(Ok((id, payload)));
    }
}

pub(crate) fn padding_32_bit_boundary(i: usize) -> usize {
    match i % 4 {
        0 => 0,
        1 => 3,
        2 => 2,
        3 => 1,
        _ => unreachable!(),
    }
}
