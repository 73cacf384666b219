//! The allocator facade: inventory + platform capabilities + one operation.

use crate::config::PlatformConfig;
use crate::dimm::DiscoveredDimm;
use crate::layout::MemoryAllocationLayout;
use crate::request::MemoryAllocationRequest;
use crate::rules::verify_request;
use crate::steps::build_layout;
use crate::Result;

/// Computes memory-allocation layouts against a fixed inventory snapshot.
///
/// Owns the discovered-DIMM inventory and the platform capability query
/// result; each [`layout`] call validates a request against both and runs
/// the step pipeline. The allocator holds no mutable state, so one instance
/// can serve any number of requests.
///
/// [`layout`]: MemoryAllocator::layout
#[derive(Debug, Clone)]
pub struct MemoryAllocator {
    inventory: Vec<DiscoveredDimm>,
    config: PlatformConfig,
}

impl MemoryAllocator {
    /// An allocator over a discovered inventory and platform capabilities.
    #[must_use]
    pub fn new(inventory: Vec<DiscoveredDimm>, config: PlatformConfig) -> Self {
        Self { inventory, config }
    }

    /// The inventory snapshot this allocator validates against.
    #[must_use]
    pub fn inventory(&self) -> &[DiscoveredDimm] {
        &self.inventory
    }

    /// Validates `request` and computes its complete layout.
    ///
    /// # Errors
    ///
    /// [`Error::BadRequest`] from the first failing validation rule or
    /// layout step; no partial layout is returned.
    ///
    /// [`Error::BadRequest`]: crate::Error::BadRequest
    pub fn layout(&self, request: &MemoryAllocationRequest) -> Result<MemoryAllocationLayout> {
        verify_request(request, &self.inventory, &self.config)?;
        Ok(build_layout(request, &self.config)?)
    }
}
