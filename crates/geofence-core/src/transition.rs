//! Geofence transition kinds and masks.

use std::fmt::{self, Display, Formatter};
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single boundary-crossing transition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The monitored subject entered the region.
    Enter,
    /// The monitored subject exited the region.
    Exit,
    /// The monitored subject stayed inside the region past the loitering delay.
    Dwell,
    /// A transition kind this library does not know about.
    Unknown,
}

impl Transition {
    /// Decode a wire transition code. Codes outside the known set map to
    /// [`Transition::Unknown`] rather than failing.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            b if b == TransitionMask::ENTER.bits() => Transition::Enter,
            b if b == TransitionMask::EXIT.bits() => Transition::Exit,
            b if b == TransitionMask::DWELL.bits() => Transition::Dwell,
            _ => Transition::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Enter => "Enter",
            Transition::Exit => "Exit",
            Transition::Dwell => "Dwell",
            Transition::Unknown => "Unknown",
        }
    }
}

impl Display for Transition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enter" => Ok(Transition::Enter),
            "exit" => Ok(Transition::Exit),
            "dwell" => Ok(Transition::Dwell),
            "unknown" => Ok(Transition::Unknown),
            _ => Err(format!("Unknown transition: {s}")),
        }
    }
}

/// Bitmask of transition kinds a geofence monitors.
///
/// The bit layout matches the wire encoding of the monitoring service, so a
/// mask round-trips through [`TransitionMask::bits`] / [`TransitionMask::from_bits`]
/// unchanged. Unrecognized bits are preserved on decode but never match any
/// known [`Transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionMask(u32);

impl TransitionMask {
    /// Monitor region entry.
    pub const ENTER: TransitionMask = TransitionMask(1);
    /// Monitor region exit.
    pub const EXIT: TransitionMask = TransitionMask(1 << 1);
    /// Monitor dwelling inside the region.
    pub const DWELL: TransitionMask = TransitionMask(1 << 2);

    /// The empty mask.
    #[must_use]
    pub fn empty() -> Self {
        TransitionMask(0)
    }

    /// Rebuild a mask from its wire bits.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        TransitionMask(bits)
    }

    /// Wire bits of this mask.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in this mask.
    #[must_use]
    pub fn contains(&self, other: TransitionMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mask monitors the given transition kind.
    #[must_use]
    pub fn monitors(&self, transition: Transition) -> bool {
        match transition {
            Transition::Enter => self.contains(Self::ENTER),
            Transition::Exit => self.contains(Self::EXIT),
            Transition::Dwell => self.contains(Self::DWELL),
            Transition::Unknown => false,
        }
    }

    /// Set every bit of `other` in this mask.
    pub fn insert(&mut self, other: TransitionMask) {
        self.0 |= other.0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TransitionMask {
    fn default() -> Self {
        TransitionMask::ENTER
    }
}

impl BitOr for TransitionMask {
    type Output = TransitionMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        TransitionMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransitionMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Display for TransitionMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::ENTER) {
            parts.push("enter");
        }
        if self.contains(Self::EXIT) {
            parts.push("exit");
        }
        if self.contains(Self::DWELL) {
            parts.push("dwell");
        }
        if parts.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&parts.join("|"))
        }
    }
}
