//! `PacketId` generation and parsing.
//!
//! Layout: `YYYYMMDD-HHMMSS-XXXXXXXX`, where the first two parts are the
//! UTC start time and the 8 hex characters are 4 random bytes with the
//! low-order byte XORed with the millisecond component of the same
//! timestamp, so that two packets created within the same second (or, on
//! coarse clocks, within the same millisecond) still tie-break by
//! randomness rather than colliding. Lexicographic ordering on the whole
//! string then approximates creation order (`spec.md` §3 / §9).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid packet id '{0}': expected 'YYYYMMDD-HHMMSS-XXXXXXXX'")]
pub struct InvalidPacketId(String);

/// A packet identifier: `YYYYMMDD-HHMMSS-XXXXXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(String);

impl PacketId {
    /// Generate a new id from `now`, deriving the random suffix from the
    /// given 4 bytes (normally fresh entropy, but injectable for tests).
    pub fn generate_at(now: DateTime<Utc>, mut random: [u8; 4]) -> Self {
        let millis = u16::try_from(now.timestamp_subsec_millis()).unwrap_or(0);
        random[3] ^= (millis & 0xff) as u8;
        random[2] ^= (millis >> 8) as u8;
        let date = format!(
            "{:04}{:02}{:02}",
            now.year(),
            now.month(),
            now.day()
        );
        let time = format!("{:02}{:02}{:02}", now.hour(), now.minute(), now.second());
        let suffix = hex::encode(random);
        PacketId(format!("{date}-{time}-{suffix}"))
    }

    /// Generate a new id anchored to the current time, using OS randomness.
    pub fn generate(now: DateTime<Utc>) -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::generate_at(now, bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PacketId {
    type Err = InvalidPacketId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid(s) {
            Ok(PacketId(s.to_string()))
        } else {
            Err(InvalidPacketId(s.to_string()))
        }
    }
}

fn is_valid(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let [date, time, suffix] = parts.as_slice() else {
        return false;
    };
    date.len() == 8
        && time.len() == 6
        && suffix.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && time.chars().all(|c| c.is_ascii_digit())
        && suffix.chars().all(|c| c.is_ascii_hexdigit())
}

impl AsRef<str> for PacketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
