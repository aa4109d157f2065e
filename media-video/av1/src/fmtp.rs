use crate::{AV1Level, AV1Profile, AV1Tier};
use std::{fmt, num::ParseIntError, str::FromStr};

/// AV1 specific format parameters used in SDP negotiation
///
/// Reference: <https://aomediacodec.github.io/av1-rtp-spec/v1.0.0.html#72-sdp-parameters>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AV1FmtpOptions {
    /// The `seq_profile` used by the stream
    pub profile: AV1Profile,
    /// The `seq_level_idx` used by the stream
    pub level: AV1Level,
    /// The `seq_tier` used by the stream
    pub tier: AV1Tier,
}

impl Default for AV1FmtpOptions {
    fn default() -> Self {
        Self {
            profile: AV1Profile::Main,
            level: AV1Level::Level_3_1,
            tier: AV1Tier::Main,
        }
    }
}

/// Failed to parse AV1 fmtp line
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseAV1FmtpOptionsError {
    #[error("encountered non integer value {0}")]
    InvalidValue(#[from] ParseIntError),
    #[error("unknown profile {0}")]
    UnknownProfile(u8),
    #[error("unknown level-idx {0}")]
    UnknownLevel(u8),
    #[error("unknown tier {0}")]
    UnknownTier(u8),
}

impl FromStr for AV1FmtpOptions {
    type Err = ParseAV1FmtpOptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = Self::default();

        for (key, value) in s.split(';').filter_map(|e| e.split_once('=')) {
            let value: u8 = match key.trim() {
                "profile" | "level-idx" | "tier" => value.trim().parse()?,
                _ => continue,
            };

            match key.trim() {
                "profile" => {
                    options.profile = AV1Profile::from_seq_profile(value)
                        .ok_or(ParseAV1FmtpOptionsError::UnknownProfile(value))?
                }
                "level-idx" => {
                    options.level = AV1Level::from_seq_level_idx(value)
                        .ok_or(ParseAV1FmtpOptionsError::UnknownLevel(value))?
                }
                "tier" => {
                    options.tier = AV1Tier::from_seq_tier(value)
                        .ok_or(ParseAV1FmtpOptionsError::UnknownTier(value))?
                }
                _ => continue,
            }
        }

        Ok(options)
    }
}

impl fmt::Display for AV1FmtpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            profile,
            level,
            tier,
        } = self;

        write!(
            f,
            "profile={};level-idx={};tier={}",
            profile.seq_profile(),
            level.seq_level_idx(),
            tier.seq_tier()
        )
    }
}
