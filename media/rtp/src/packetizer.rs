use crate::{
    Payloader, RTP_HEADER_LEN, RtpHeader, RtpPacket, RtpSequencer, RtpTimestamp, Sequencer, Ssrc,
};
use bytes::Bytes;

/// Turns media frames into RTP packets using a [`Payloader`] and a [`Sequencer`]
#[derive(Debug)]
pub struct Packetizer<P, S = RtpSequencer> {
    mtu: usize,
    payload_type: u8,
    ssrc: Ssrc,
    csrc: Vec<u32>,
    timestamp: RtpTimestamp,
    payloader: P,
    sequencer: S,
}

impl<P: Payloader, S: Sequencer> Packetizer<P, S> {
    /// - `mtu` maximum size of a complete RTP packet, including the RTP header
    /// - `timestamp` RTP timestamp of the first frame
    pub fn new(
        mtu: usize,
        payload_type: u8,
        ssrc: Ssrc,
        payloader: P,
        sequencer: S,
        timestamp: RtpTimestamp,
    ) -> Self {
        Self {
            mtu,
            payload_type,
            ssrc,
            csrc: Vec::new(),
            timestamp,
            payloader,
            sequencer,
        }
    }

    /// Set the contributing sources added to every packet, at most 15 are used
    pub fn with_csrc(mut self, csrc: Vec<u32>) -> Self {
        self.csrc = csrc;
        self.csrc.truncate(15);
        self
    }

    pub fn sequencer(&self) -> &S {
        &self.sequencer
    }

    /// Timestamp the next frame will be sent with
    pub fn timestamp(&self) -> RtpTimestamp {
        self.timestamp
    }

    /// Payload a frame and wrap the payloads into RTP packets.
    ///
    /// All packets share the current timestamp and the last packet has the marker bit set.
    /// The timestamp is advanced by `samples` afterwards.
    pub fn packetize(&mut self, frame: &Bytes, samples: u32) -> Vec<RtpPacket> {
        let max_size = self
            .mtu
            .saturating_sub(RTP_HEADER_LEN + self.csrc.len() * 4);

        let payloads: Vec<Bytes> = self.payloader.payload(frame, max_size).collect();
        let last = payloads.len().saturating_sub(1);

        let packets = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| RtpPacket {
                header: RtpHeader {
                    marker: i == last,
                    payload_type: self.payload_type,
                    sequence_number: self.sequencer.next_sequence_number(),
                    timestamp: self.timestamp,
                    ssrc: self.ssrc,
                    csrc: self.csrc.clone(),
                    ..RtpHeader::default()
                },
                payload,
            })
            .collect::<Vec<_>>();

        log::trace!(
            "packetized {} byte frame into {} packets at timestamp {}",
            frame.len(),
            packets.len(),
            self.timestamp.0
        );

        self.skip_samples(samples);

        packets
    }

    /// Advance the timestamp without sending anything
    pub fn skip_samples(&mut self, samples: u32) {
        self.timestamp.0 = self.timestamp.0.wrapping_add(samples);
    }
}
