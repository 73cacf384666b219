//! DIMM value types shared by the request, validation, and layout stages.

use std::fmt;

use crate::layout::BYTES_PER_GIB;

/// Opaque unique handle for a physical DIMM, assigned by device discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimmUid(String);

impl DimmUid {
    /// Borrows the uid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DimmUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DimmUid {
    fn from(uid: &str) -> Self {
        Self(uid.to_owned())
    }
}

impl From<String> for DimmUid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

/// A physical non-volatile DIMM as seen by hardware discovery.
///
/// Immutable input data; the engine never changes what discovery reported.
/// `channel` is zero-indexed and spans both memory controllers on the socket
/// (controller-major numbering, see [`crate::topology`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimm {
    /// Unique handle for this DIMM.
    pub uid: DimmUid,
    /// Raw capacity in bytes.
    pub capacity: u64,
    /// Socket the DIMM is installed on.
    pub socket: u16,
    /// Memory controller within the socket.
    pub memory_controller: u16,
    /// Channel index, spanning both controllers.
    pub channel: u32,
}

impl Dimm {
    /// Raw capacity rounded down to whole GiB.
    #[must_use]
    pub fn capacity_gib(&self) -> u64 {
        self.capacity / BYTES_PER_GIB
    }
}

/// An inventory entry for a manageable DIMM.
///
/// Couples the discovered [`Dimm`] attributes with the configuration state
/// the partial-socket rule needs. The caller builds the inventory from a
/// consistent, already-locked snapshot of device discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredDimm {
    /// Discovered DIMM attributes.
    pub dimm: Dimm,
    /// True if the DIMM has never been configured.
    pub is_new: bool,
}

impl DiscoveredDimm {
    /// Wraps a discovered DIMM that already carries a configuration.
    #[must_use]
    pub fn configured(dimm: Dimm) -> Self {
        Self { dimm, is_new: false }
    }

    /// Wraps a never-configured DIMM.
    #[must_use]
    pub fn fresh(dimm: Dimm) -> Self {
        Self { dimm, is_new: true }
    }
}

/// Builds a DIMM fixture for unit tests.
#[cfg(test)]
pub(crate) fn test_dimm(
    uid: &str,
    socket: u16,
    memory_controller: u16,
    channel: u32,
    capacity_gib: u64,
) -> Dimm {
    Dimm {
        uid: DimmUid::from(uid),
        capacity: capacity_gib * BYTES_PER_GIB,
        socket,
        memory_controller,
        channel,
    }
}
