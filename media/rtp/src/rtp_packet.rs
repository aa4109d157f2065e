use crate::{RtpError, RtpHeader};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn parse(bytes: impl Into<Bytes>) -> Result<Self, RtpError> {
        let mut packet = Self::default();
        packet.unmarshal(bytes)?;
        Ok(packet)
    }

    /// Parse a complete RTP packet into `self`, the payload references `bytes` without copying.
    pub fn unmarshal(&mut self, bytes: impl Into<Bytes>) -> Result<(), RtpError> {
        let packet: Bytes = bytes.into();

        let header_len = self.header.unmarshal(&packet)?;
        let mut end = packet.len();

        if self.header.padding {
            if end <= header_len {
                return Err(RtpError::TooSmall);
            }

            let Some(&padding_size) = packet.last() else {
                return Err(RtpError::TooSmall);
            };

            if usize::from(padding_size) > end - header_len {
                return Err(RtpError::TooSmall);
            }

            self.header.padding_size = padding_size;
            end -= usize::from(padding_size);
        }

        self.payload = packet.slice(header_len..end);

        Ok(())
    }

    /// Exact number of bytes [`RtpPacket::marshal`] produces
    pub fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len() + usize::from(self.header.padding_size)
    }

    pub fn marshal(&self) -> Result<Bytes, RtpError> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.write(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Write the packet into the start of `buf`, returning the number of bytes written
    pub fn marshal_to(&self, buf: &mut [u8]) -> Result<usize, RtpError> {
        let size = self.marshal_size();

        let Some(mut target) = buf.get_mut(..size) else {
            return Err(RtpError::BufferTooSmall);
        };

        self.write(&mut target)?;

        Ok(size)
    }

    /// Append the packet to `vec`
    pub fn write_vec(&self, vec: &mut Vec<u8>) -> Result<(), RtpError> {
        vec.reserve(self.marshal_size());
        self.write(vec)
    }

    fn write(&self, out: &mut impl BufMut) -> Result<(), RtpError> {
        let padding = self.header.padding_size;

        self.header.write(out, padding != 0)?;
        out.put_slice(&self.payload);

        if padding != 0 {
            out.put_bytes(0, usize::from(padding) - 1);
            out.put_u8(padding);
        }

        Ok(())
    }
}
