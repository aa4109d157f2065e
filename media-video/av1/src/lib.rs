//! AV1 tools for use with SDP & RTP

mod fmtp;
pub mod leb128;
pub mod obu;
mod payload;

pub use fmtp::{AV1FmtpOptions, ParseAV1FmtpOptionsError};
pub use payload::{
    AV1DePayloadError, AV1DePayloader, AV1FrameAssembler, AV1Packet, AV1PayloadError,
    AV1Payloader, AggregationHeader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AV1Profile {
    Main,
    High,
    Professional,
}

impl AV1Profile {
    pub fn from_seq_profile(seq_profile: u8) -> Option<Self> {
        match seq_profile {
            0 => Some(Self::Main),
            1 => Some(Self::High),
            2 => Some(Self::Professional),
            _ => None,
        }
    }

    pub fn seq_profile(self) -> u8 {
        match self {
            Self::Main => 0,
            Self::High => 1,
            Self::Professional => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum AV1Level {
    Level_2_0,
    Level_2_1,
    Level_2_2,
    Level_2_3,
    Level_3_0,
    Level_3_1,
    Level_3_2,
    Level_3_3,
    Level_4_0,
    Level_4_1,
    Level_4_2,
    Level_4_3,
    Level_5_0,
    Level_5_1,
    Level_5_2,
    Level_5_3,
    Level_6_0,
    Level_6_1,
    Level_6_2,
    Level_6_3,
    Level_7_0,
    Level_7_1,
    Level_7_2,
    Level_7_3,
}

impl AV1Level {
    const ALL: [Self; 24] = [
        Self::Level_2_0,
        Self::Level_2_1,
        Self::Level_2_2,
        Self::Level_2_3,
        Self::Level_3_0,
        Self::Level_3_1,
        Self::Level_3_2,
        Self::Level_3_3,
        Self::Level_4_0,
        Self::Level_4_1,
        Self::Level_4_2,
        Self::Level_4_3,
        Self::Level_5_0,
        Self::Level_5_1,
        Self::Level_5_2,
        Self::Level_5_3,
        Self::Level_6_0,
        Self::Level_6_1,
        Self::Level_6_2,
        Self::Level_6_3,
        Self::Level_7_0,
        Self::Level_7_1,
        Self::Level_7_2,
        Self::Level_7_3,
    ];

    /// Level for a `seq_level_idx`, where X.Y is `(X - 2) * 4 + Y`
    pub fn from_seq_level_idx(seq_level_idx: u8) -> Option<Self> {
        Self::ALL.get(usize::from(seq_level_idx)).copied()
    }

    pub fn seq_level_idx(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AV1Tier {
    Main,
    High,
}

impl AV1Tier {
    pub fn from_seq_tier(seq_tier: u8) -> Option<Self> {
        match seq_tier {
            0 => Some(Self::Main),
            1 => Some(Self::High),
            _ => None,
        }
    }

    pub fn seq_tier(self) -> u8 {
        match self {
            Self::Main => 0,
            Self::High => 1,
        }
    }
}
