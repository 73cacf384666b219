//! Memory allocation requests and the percentage-based request builder.

use crate::dimm::{Dimm, DimmUid};
use crate::layout::bytes_to_gib;
use crate::reserve::{select_reserve_dimm, SelectionError};

/// Sentinel capacity meaning "all capacity left over after the other steps".
///
/// Valid in the Memory-Mode target and in an App-Direct extent capacity; at
/// most one target per request may carry it.
pub const CAPACITY_REMAINING: u64 = u64::MAX;

/// How a reserved DIMM's capacity is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveDimmType {
    /// The reserved DIMM becomes block storage.
    Storage,
    /// The reserved DIMM becomes a non-interleaved App-Direct region.
    AppDirectByOne,
}

/// Designates one request DIMM to exclude from the general interleave pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveSpec {
    /// The DIMM to set aside; must name a DIMM present in the request.
    pub uid: DimmUid,
    /// What the reserved DIMM's capacity becomes.
    pub capacity_type: ReserveDimmType,
}

/// One requested App-Direct interleave extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirectExtent {
    /// Requested capacity in GiB, or [`CAPACITY_REMAINING`].
    pub capacity_gib: u64,
    /// Lay non-interleaved x1 sets instead of striping across DIMMs.
    pub by_one: bool,
    /// Channel interleave size in bytes; platform recommendation if absent.
    pub channel_interleave: Option<u64>,
    /// Controller interleave size in bytes; platform recommendation if
    /// absent.
    pub imc_interleave: Option<u64>,
    /// Mirror the extent. No platform support; validation rejects it.
    pub mirrored: bool,
}

impl AppDirectExtent {
    /// An interleaved extent of `capacity_gib` with recommended settings.
    #[must_use]
    pub fn interleaved(capacity_gib: u64) -> Self {
        Self {
            capacity_gib,
            by_one: false,
            channel_interleave: None,
            imc_interleave: None,
            mirrored: false,
        }
    }

    /// A by-one extent of `capacity_gib`.
    #[must_use]
    pub fn by_one(capacity_gib: u64) -> Self {
        Self {
            by_one: true,
            ..Self::interleaved(capacity_gib)
        }
    }

    /// True if the extent takes whatever capacity the other steps leave.
    #[must_use]
    pub fn is_remaining(&self) -> bool {
        self.capacity_gib == CAPACITY_REMAINING
    }
}

/// Immutable input to the layout engine: candidate DIMMs plus the operator's
/// capacity goals.
///
/// Built by the caller from live device discovery; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAllocationRequest {
    /// Candidate DIMMs, in discovery order.
    pub dimms: Vec<Dimm>,
    /// Memory-Mode target in GiB; zero for none, or [`CAPACITY_REMAINING`].
    pub memory_capacity_gib: u64,
    /// Requested App-Direct extents, at most two.
    pub app_direct_extents: Vec<AppDirectExtent>,
    /// Turn whatever capacity is left after the other steps into storage.
    pub storage_remaining: bool,
    /// Optional reserved-DIMM designation.
    pub reserve: Option<ReserveSpec>,
}

impl MemoryAllocationRequest {
    /// True if the Memory-Mode target is the remaining-capacity sentinel.
    #[must_use]
    pub fn memory_is_remaining(&self) -> bool {
        self.memory_capacity_gib == CAPACITY_REMAINING
    }

    /// The designated reserve DIMM, if the request names one it contains.
    #[must_use]
    pub fn reserved_dimm(&self) -> Option<&Dimm> {
        let spec = self.reserve.as_ref()?;
        self.dimms.iter().find(|dimm| dimm.uid == spec.uid)
    }

    /// Number of capacity targets marked [`CAPACITY_REMAINING`].
    #[must_use]
    pub fn remaining_target_count(&self) -> usize {
        let extents = self
            .app_direct_extents
            .iter()
            .filter(|extent| extent.is_remaining())
            .count();
        extents + usize::from(self.memory_is_remaining())
    }

    /// Sum of all candidate DIMM capacities in bytes.
    #[must_use]
    pub fn total_capacity_bytes(&self) -> u64 {
        self.dimms.iter().map(|dimm| dimm.capacity).sum()
    }

    /// Explicitly requested App-Direct GiB, remaining-mode extents excluded.
    #[must_use]
    pub fn requested_app_direct_gib(&self) -> u64 {
        self.app_direct_extents
            .iter()
            .filter(|extent| !extent.is_remaining())
            .map(|extent| extent.capacity_gib)
            .sum()
    }
}

/// Errors raised while building a request from operator percentages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// A percentage above 100 was supplied.
    #[error("invalid percentage: {0} (must be 0-100)")]
    InvalidPercentage(u32),

    /// The builder was given no DIMMs to divide.
    #[error("cannot build a request without DIMMs")]
    NoDimms(#[from] SelectionError),
}

/// Persistent capacity flavor for [`RequestBuilder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistentType {
    /// Interleaved App-Direct.
    #[default]
    AppDirect,
    /// Non-interleaved (by-one) App-Direct.
    AppDirectByOne,
}

/// Builds a [`MemoryAllocationRequest`] from a DIMM snapshot and operator
/// intent expressed as percentages of the total request capacity.
///
/// Memory-Mode and reserve percentages are carved out first; the App-Direct
/// extent receives what is left, unless [`remaining_to_storage`] redirects
/// it. Performs no device I/O.
///
/// [`remaining_to_storage`]: RequestBuilder::remaining_to_storage
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    dimms: Vec<Dimm>,
    memory_percent: u32,
    reserve_percent: u32,
    persistent_type: PersistentType,
    reserve_dimm: Option<ReserveDimmType>,
    remaining_to_storage: bool,
}

impl RequestBuilder {
    /// A builder over an already-discovered DIMM list.
    #[must_use]
    pub fn new(dimms: Vec<Dimm>) -> Self {
        Self {
            dimms,
            memory_percent: 0,
            reserve_percent: 0,
            persistent_type: PersistentType::default(),
            reserve_dimm: None,
            remaining_to_storage: false,
        }
    }

    /// Percent of total capacity to present as Memory-Mode.
    #[must_use]
    pub fn memory_mode_percent(mut self, percent: u32) -> Self {
        self.memory_percent = percent;
        self
    }

    /// Percent of total capacity to leave unprovisioned as reserve.
    #[must_use]
    pub fn reserved_percent(mut self, percent: u32) -> Self {
        self.reserve_percent = percent;
        self
    }

    /// Persistent capacity flavor for the App-Direct extent.
    #[must_use]
    pub fn persistent_type(mut self, persistent_type: PersistentType) -> Self {
        self.persistent_type = persistent_type;
        self
    }

    /// Run the reserve selector over the DIMMs and designate the result as
    /// the reserved DIMM with the given capacity type.
    #[must_use]
    pub fn reserve_dimm(mut self, capacity_type: ReserveDimmType) -> Self {
        self.reserve_dimm = Some(capacity_type);
        self
    }

    /// Direct leftover capacity to storage instead of App-Direct.
    #[must_use]
    pub fn remaining_to_storage(mut self, storage: bool) -> Self {
        self.remaining_to_storage = storage;
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidPercentage`] for percentages over 100, and
    /// [`RequestError::NoDimms`] when reserve selection was requested on an
    /// empty DIMM list.
    pub fn build(self) -> Result<MemoryAllocationRequest, RequestError> {
        for percent in [self.memory_percent, self.reserve_percent] {
            if percent > 100 {
                return Err(RequestError::InvalidPercentage(percent));
            }
        }

        let total_bytes: u64 = self.dimms.iter().map(|dimm| dimm.capacity).sum();
        let total_gib = bytes_to_gib(total_bytes);
        let memory_gib = bytes_to_gib(percent_of(total_bytes, self.memory_percent));
        let reserved_gib = bytes_to_gib(percent_of(total_bytes, self.reserve_percent));

        let mut request = MemoryAllocationRequest {
            dimms: self.dimms,
            memory_capacity_gib: memory_gib,
            storage_remaining: self.remaining_to_storage,
            ..MemoryAllocationRequest::default()
        };

        if let Some(capacity_type) = self.reserve_dimm {
            let uid = select_reserve_dimm(&request.dimms)?;
            request.reserve = Some(ReserveSpec { uid, capacity_type });
        }

        if !self.remaining_to_storage {
            let persistent_gib = total_gib.saturating_sub(memory_gib + reserved_gib);
            if persistent_gib > 0 {
                let extent = match self.persistent_type {
                    PersistentType::AppDirect => AppDirectExtent::interleaved(persistent_gib),
                    PersistentType::AppDirectByOne => AppDirectExtent::by_one(persistent_gib),
                };
                request.app_direct_extents.push(extent);
            }
        }

        tracing::debug!(
            dimms = request.dimms.len(),
            memory_gib,
            reserved_gib,
            "built allocation request"
        );
        Ok(request)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent_of(bytes: u64, percent: u32) -> u64 {
    (u128::from(bytes) * u128::from(percent) / 100) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimm::test_dimm;

    fn four_dimms() -> Vec<Dimm> {
        vec![
            test_dimm("a", 0, 0, 0, 64),
            test_dimm("b", 0, 1, 3, 64),
            test_dimm("c", 0, 0, 1, 64),
            test_dimm("d", 0, 1, 4, 64),
        ]
    }

    #[test]
    fn percentages_split_memory_and_app_direct() {
        let request = RequestBuilder::new(four_dimms())
            .memory_mode_percent(25)
            .build()
            .unwrap();
        assert_eq!(request.memory_capacity_gib, 64);
        assert_eq!(request.app_direct_extents.len(), 1);
        assert_eq!(request.app_direct_extents[0].capacity_gib, 192);
        assert!(!request.app_direct_extents[0].by_one);
    }

    #[test]
    fn reserved_percent_shrinks_app_direct() {
        let request = RequestBuilder::new(four_dimms())
            .memory_mode_percent(25)
            .reserved_percent(25)
            .build()
            .unwrap();
        assert_eq!(request.app_direct_extents[0].capacity_gib, 128);
    }

    #[test]
    fn by_one_persistent_type_is_carried() {
        let request = RequestBuilder::new(four_dimms())
            .persistent_type(PersistentType::AppDirectByOne)
            .build()
            .unwrap();
        assert!(request.app_direct_extents[0].by_one);
    }

    #[test]
    fn remaining_to_storage_suppresses_the_extent() {
        let request = RequestBuilder::new(four_dimms())
            .memory_mode_percent(50)
            .remaining_to_storage(true)
            .build()
            .unwrap();
        assert!(request.app_direct_extents.is_empty());
        assert!(request.storage_remaining);
    }

    #[test]
    fn over_100_percent_is_rejected() {
        let err = RequestBuilder::new(four_dimms())
            .memory_mode_percent(101)
            .build()
            .unwrap_err();
        assert_eq!(err, RequestError::InvalidPercentage(101));
    }

    #[test]
    fn reserve_selection_names_a_request_dimm() {
        let request = RequestBuilder::new(four_dimms())
            .reserve_dimm(ReserveDimmType::Storage)
            .build()
            .unwrap();
        let spec = request.reserve.clone().unwrap();
        assert!(request.dimms.iter().any(|dimm| dimm.uid == spec.uid));
        assert_eq!(spec.capacity_type, ReserveDimmType::Storage);
    }

    #[test]
    fn remaining_target_count_spans_memory_and_extents() {
        let mut request = MemoryAllocationRequest {
            memory_capacity_gib: CAPACITY_REMAINING,
            ..MemoryAllocationRequest::default()
        };
        request
            .app_direct_extents
            .push(AppDirectExtent::interleaved(CAPACITY_REMAINING));
        assert_eq!(request.remaining_target_count(), 2);
    }
}
