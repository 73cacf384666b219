//! The request-validation and layout-pipeline error taxonomy.

use crate::dimm::DimmUid;

/// Fatal errors from request validation or the layout pipeline.
///
/// Every variant aborts the layout computation immediately; no partial
/// layout reaches the caller. The caller owns translating these into
/// user-facing messages and exit codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BadRequest {
    /// The platform cannot provision what the request asks for.
    #[error("{0} is not supported by this platform")]
    NotSupported(&'static str),

    /// The request supplied no DIMMs.
    #[error("the request contains no DIMMs")]
    NoDimms,

    /// More App-Direct extents than the platform allows.
    #[error("too many App-Direct extents: {0} (maximum 2)")]
    TooManyAppDirectExtents(usize),

    /// More than one capacity target marked remaining.
    #[error("more than one capacity target is marked as remaining")]
    TooManyRemaining,

    /// The reserved-DIMM designation cannot be honored.
    #[error("invalid reserve DIMM request: {0}")]
    ReserveDimm(&'static str),

    /// The request's DIMM list disagrees with the platform inventory.
    #[error("bad DIMM list: {reason} (uid {uid})")]
    DimmList {
        /// The offending DIMM.
        uid: DimmUid,
        /// What disagreed.
        reason: &'static str,
    },

    /// A requested DIMM is unknown to the platform.
    #[error("DIMM {0} does not exist or is not manageable")]
    InvalidDimm(DimmUid),

    /// A socket was only partially requested.
    ///
    /// A request must name either every manageable DIMM on a socket or
    /// exactly the never-configured ones.
    #[error("socket {socket} is only partially included in the request")]
    MissingRequiredDimms {
        /// The partially covered socket.
        socket: u16,
    },

    /// A requested capacity cannot be laid out at all.
    #[error("requested capacity exceeds what the DIMMs can hold")]
    Size,

    /// Memory-Mode capacity ran out mid-layout.
    #[error("could not lay out the requested Memory-Mode capacity; achieved {achieved_gib} GiB")]
    MemorySize {
        /// GiB mapped before capacity ran out.
        achieved_gib: u64,
    },

    /// An interleave set member count has no legal interleave way.
    #[error("no legal interleave way for {member_count} DIMMs")]
    AppDirectSettings {
        /// The unsupported member count.
        member_count: usize,
    },
}
