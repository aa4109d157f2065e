use crate::{ExtendedSequenceNumber, SequenceNumber};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of RTP sequence numbers
pub trait Sequencer: Send + Sync {
    fn next_sequence_number(&self) -> SequenceNumber;

    /// Number of times the sequence number wrapped around, counted up to the last returned number
    fn rollover_count(&self) -> u64;
}

/// Sequencer that can be shared between threads.
///
/// The sequence number and rollover count are kept together in a single [`ExtendedSequenceNumber`],
/// so readers never observe a sequence number with the rollover count of another.
#[derive(Debug)]
pub struct RtpSequencer {
    next: AtomicU64,
}

impl RtpSequencer {
    /// Create a sequencer which returns `start` as its first sequence number
    pub fn new(start: SequenceNumber) -> Self {
        Self {
            next: AtomicU64::new(u64::from(start.0)),
        }
    }

    /// Create a sequencer starting at a random sequence number as recommended by RFC 3550
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::new(SequenceNumber(rng.random()))
    }
}

impl Sequencer for RtpSequencer {
    fn next_sequence_number(&self) -> SequenceNumber {
        ExtendedSequenceNumber(self.next.fetch_add(1, Ordering::Relaxed)).truncated()
    }

    fn rollover_count(&self) -> u64 {
        let next = self.next.load(Ordering::Relaxed);

        ExtendedSequenceNumber(next.saturating_sub(1)).rollover_count()
    }
}
