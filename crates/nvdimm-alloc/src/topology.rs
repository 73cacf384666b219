//! Physical DIMM topology and interleave pattern matching.
//!
//! The platform is fixed at 2 memory controllers per socket with 3 channels
//! each. A DIMM's canonical position within its socket is
//! `2 * (channel % 3) + memory_controller`, giving the 6-slot grid:
//!
//! ```text
//! ---------
//! | 0 | 1 |
//! | 2 | 3 |
//! | 4 | 5 |
//! ---------
//! ```
//!
//! Channel numbering is assumed controller-major: channels `0..3` belong to
//! controller 0 and `3..6` to controller 1, so `channel % CHANNELS_PER_IMC`
//! identifies a DIMM's channel partner on the other controller. The reserve
//! selector and the population check both rely on this numbering.

use crate::dimm::Dimm;

/// Memory controllers per socket.
pub const IMCS_PER_SOCKET: u16 = 2;

/// Channels per memory controller.
pub const CHANNELS_PER_IMC: u32 = 3;

/// DIMM slots per socket.
pub const DIMMS_PER_SOCKET: u32 = IMCS_PER_SOCKET as u32 * CHANNELS_PER_IMC;

/// Highest valid channel index (channels span both controllers).
pub const MAX_CHANNEL: u32 = DIMMS_PER_SOCKET - 1;

/// Errors raised by the interleave set builder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// The candidate DIMMs span more than one socket.
    #[error("DIMMs span multiple sockets; interleave sets are per socket")]
    MultipleSockets,

    /// A DIMM reports a channel index outside the platform's bounds.
    #[error("channel {channel} exceeds the platform maximum of {MAX_CHANNEL}")]
    ChannelOutOfRange {
        /// The offending channel index.
        channel: u32,
    },
}

/// Canonical position of a DIMM within its socket's 6-slot grid.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn dimm_position(dimm: &Dimm) -> u8 {
    let position = 2 * (dimm.channel % CHANNELS_PER_IMC) + u32::from(dimm.memory_controller);
    debug_assert!(position < DIMMS_PER_SOCKET);
    position as u8
}

/// A legal interleave topology: the set of positions a set must populate.
///
/// Bit `i` set means position `i` must hold a DIMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavePattern(u8);

impl InterleavePattern {
    /// Number of DIMMs the pattern interleaves across.
    #[must_use]
    pub fn ways(self) -> u32 {
        self.0.count_ones()
    }

    /// True if the pattern requires a DIMM at `position`.
    #[must_use]
    pub fn contains(self, position: u8) -> bool {
        (self.0 >> position) & 1 == 1
    }

    /// True if every position the pattern requires is set in `population`.
    #[must_use]
    pub fn covered_by(self, population: u8) -> bool {
        self.0 & population == self.0
    }

    /// Raw position bitmask.
    #[must_use]
    pub fn positions(self) -> u8 {
        self.0
    }
}

/// Legal interleave topologies in priority order.
///
/// Widest first; among equal widths, patterns balanced across both memory
/// controllers come before same-controller patterns. The first fully
/// satisfied pattern wins.
pub const INTERLEAVE_PATTERNS: [InterleavePattern; 21] = [
    InterleavePattern(0b11_1111), // x6
    InterleavePattern(0b00_1111), // x4
    InterleavePattern(0b11_1100), // x4
    InterleavePattern(0b11_0011), // x4
    InterleavePattern(0b01_0101), // x3
    InterleavePattern(0b10_1010), // x3
    // favor across memory controller
    InterleavePattern(0b00_0011), // x2
    InterleavePattern(0b00_1100), // x2
    InterleavePattern(0b11_0000), // x2
    // before across channel
    InterleavePattern(0b00_0101), // x2
    InterleavePattern(0b00_1010), // x2
    InterleavePattern(0b01_0100), // x2
    InterleavePattern(0b10_1000), // x2
    InterleavePattern(0b01_0001), // x2
    InterleavePattern(0b10_0010), // x2
    // lastly x1
    InterleavePattern(0b00_0001),
    InterleavePattern(0b00_0010),
    InterleavePattern(0b00_0100),
    InterleavePattern(0b00_1000),
    InterleavePattern(0b01_0000),
    InterleavePattern(0b10_0000),
];

/// Finds the largest legal interleaved subset of `dimms`.
///
/// The DIMMs must all live on one socket. Patterns are tried in
/// [`INTERLEAVE_PATTERNS`] order; a pattern matches only when every position
/// it names is satisfied by a distinct DIMM. Partial matches are discarded,
/// never padded. Returns an empty vector when no pattern is satisfied.
///
/// # Errors
///
/// [`TopologyError::MultipleSockets`] if the DIMMs span sockets,
/// [`TopologyError::ChannelOutOfRange`] if any channel index is out of
/// bounds.
pub fn largest_interleavable_set(dimms: &[Dimm]) -> Result<Vec<Dimm>, TopologyError> {
    validate_dimm_list(dimms)?;
    Ok(first_matching_set(dimms).unwrap_or_default())
}

/// The pattern loop behind [`largest_interleavable_set`], for callers that
/// already hold a validated single-socket list.
pub(crate) fn first_matching_set(dimms: &[Dimm]) -> Option<Vec<Dimm>> {
    for pattern in INTERLEAVE_PATTERNS {
        if let Some(set) = dimms_matching_pattern(dimms, pattern) {
            tracing::debug!(
                positions = pattern.positions(),
                ways = pattern.ways(),
                "matched interleave pattern"
            );
            return Some(set);
        }
    }
    None
}

fn validate_dimm_list(dimms: &[Dimm]) -> Result<(), TopologyError> {
    if let Some(first) = dimms.first() {
        if dimms.iter().any(|d| d.socket != first.socket) {
            return Err(TopologyError::MultipleSockets);
        }
    }
    if let Some(dimm) = dimms.iter().find(|d| d.channel > MAX_CHANNEL) {
        return Err(TopologyError::ChannelOutOfRange {
            channel: dimm.channel,
        });
    }
    Ok(())
}

/// One DIMM per required position, or `None` on any unfilled position.
fn dimms_matching_pattern(dimms: &[Dimm], pattern: InterleavePattern) -> Option<Vec<Dimm>> {
    let mut unfilled = pattern.positions();
    let mut set = Vec::with_capacity(pattern.ways() as usize);

    for dimm in dimms {
        let position = dimm_position(dimm);
        if (unfilled >> position) & 1 == 1 {
            set.push(dimm.clone());
            unfilled &= !(1 << position);
        }
    }

    if unfilled == 0 {
        Some(set)
    } else {
        None
    }
}
