//! RTP (RFC 3550) wire format with RFC 8285 header extensions and the
//! payloading traits implemented by the codec crates.

use bytes::Bytes;

mod extensions;
mod header;
mod packetizer;
mod rtp_packet;
mod sequencer;

pub use extensions::{
    EXTENSION_PROFILE_ONE_BYTE, EXTENSION_PROFILE_TWO_BYTE, ExtensionProfile, RtpExtension,
    parse_extensions,
};
pub use header::{RtpError, RtpHeader};
pub use packetizer::Packetizer;
pub use rtp_packet::RtpPacket;
pub use sequencer::{RtpSequencer, Sequencer};

/// Size of the fixed part of the RTP header
pub const RTP_HEADER_LEN: usize = 12;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ssrc(pub u32);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u16);

/// Sequence number including the number of times the 16 bit counter wrapped around
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtendedSequenceNumber(pub u64);

impl ExtendedSequenceNumber {
    pub fn truncated(&self) -> SequenceNumber {
        SequenceNumber((self.0 & u16::MAX as u64) as u16)
    }

    pub fn increase_one(&mut self) -> SequenceNumber {
        self.0 += 1;
        self.truncated()
    }

    pub fn rollover_count(&self) -> u64 {
        self.0 >> 16
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtpTimestamp(pub u32);

/// Create RTP payload from media data
pub trait Payloader: Send + 'static {
    /// Payload a given frame, no returned payload may exceed `max_size` bytes
    fn payload(&mut self, frame: &Bytes, max_size: usize) -> impl Iterator<Item = Bytes> + '_;
}

/// Convert RTP payloads back into media data
pub trait DePayloader: Send + 'static {
    type Error: std::error::Error;

    /// Depayload a single RTP payload. Returns the media data completed by this payload,
    /// which may be empty when the payload only carried part of a fragment.
    fn depayload(&mut self, payload: &[u8]) -> Result<Bytes, Self::Error>;

    /// Returns if the payload starts a new partition (e.g. an OBU or NAL unit)
    fn is_partition_head(&self, payload: &[u8]) -> bool;

    /// Returns if the payload is the last of a partition
    fn is_partition_tail(&self, marker: bool, payload: &[u8]) -> bool {
        let _ = payload;
        marker
    }

    /// Returns if the packet with the given marker bit is the last of a frame
    fn is_final_packet_in_sequence(&self, marker: bool) -> bool {
        marker
    }
}
