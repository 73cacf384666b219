//! Storage layout step.
//!
//! Runs last among the capacity steps: whatever GiB-aligned capacity the
//! memory and App-Direct steps left unclaimed on each DIMM becomes block
//! storage, the reserved DIMM included. Cannot fail; zero leftover simply
//! lays zero storage.

use crate::layout::{bytes_to_gib, MemoryAllocationLayout};
use crate::request::MemoryAllocationRequest;

/// Turns all unallocated capacity into storage.
pub fn execute(
    request: &MemoryAllocationRequest,
    mut layout: MemoryAllocationLayout,
) -> MemoryAllocationLayout {
    let mut storage_gib = 0u64;
    for dimm in &request.dimms {
        let free_gib = bytes_to_gib(layout.goal(&dimm.uid).unallocated_bytes(dimm.capacity));
        if free_gib > 0 {
            layout.goal_mut(&dimm.uid).storage_size_gib += free_gib;
            storage_gib += free_gib;
        }
    }

    layout.storage_capacity += storage_gib;
    tracing::debug!(storage_gib, "storage laid out");
    layout
}
