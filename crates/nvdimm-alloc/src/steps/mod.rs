//! The ordered layout-step pipeline.
//!
//! Steps run strictly in order -- reserve, memory, App-Direct (one per
//! extent), storage, deviation check -- because later steps depend on the
//! capacity earlier ones consumed. Each step is a pure function taking the
//! layout by value and returning the extended layout; a typed error aborts
//! the whole pipeline with no partial result.
//!
//! Any single capacity target marked [`CAPACITY_REMAINING`] is deferred to
//! run after all explicit capacity steps, immediately before storage.
//!
//! [`CAPACITY_REMAINING`]: crate::request::CAPACITY_REMAINING

pub mod app_direct;
pub mod deviation;
pub mod memory;
pub mod population;
pub mod reserve_dimm;
pub mod storage;

#[cfg(test)]
mod tests;

use crate::config::PlatformConfig;
use crate::dimm::Dimm;
use crate::error::BadRequest;
use crate::layout::{round_down, MemoryAllocationLayout, BYTES_PER_GIB};
use crate::request::MemoryAllocationRequest;

/// Which capacity step was deferred as the remaining-capacity step.
enum RemainingStep {
    Memory,
    AppDirect(usize),
}

/// Runs the full pipeline for `request`, producing a complete layout.
///
/// The request is assumed validated (see [`crate::rules::verify_request`]).
///
/// # Errors
///
/// Any [`BadRequest`] raised by a step; the layout is discarded.
pub fn build_layout(
    request: &MemoryAllocationRequest,
    config: &PlatformConfig,
) -> Result<MemoryAllocationLayout, BadRequest> {
    let mut layout = MemoryAllocationLayout::for_request(request);

    layout = population::execute(request, layout);
    layout = reserve_dimm::execute(request, config, layout)?;

    // Explicit capacity targets first, the remaining-mode target last.
    let mut remaining_step = None;

    if request.memory_is_remaining() {
        remaining_step = Some(RemainingStep::Memory);
    } else if request.memory_capacity_gib > 0 {
        layout = memory::execute(request, layout)?;
    }

    for (index, extent) in request.app_direct_extents.iter().enumerate() {
        if extent.is_remaining() {
            remaining_step = Some(RemainingStep::AppDirect(index));
        } else {
            layout = app_direct::execute(request, index, config, layout)?;
        }
    }

    match remaining_step {
        Some(RemainingStep::Memory) => layout = memory::execute(request, layout)?,
        Some(RemainingStep::AppDirect(index)) => {
            layout = app_direct::execute(request, index, config, layout)?;
        }
        None => {}
    }

    // Anything left after capacity layout becomes storage.
    layout = storage::execute(request, layout);
    layout = deviation::execute(request, layout);

    tracing::debug!(
        memory_gib = layout.memory_capacity,
        app_direct_gib = layout.total_app_direct_gib(),
        storage_gib = layout.storage_capacity,
        warnings = layout.warnings.len(),
        "layout complete"
    );
    Ok(layout)
}

/// DIMMs a general capacity step may lay onto: every request DIMM except the
/// one reserved so far.
pub(crate) fn layout_dimms(
    request: &MemoryAllocationRequest,
    layout: &MemoryAllocationLayout,
) -> Vec<Dimm> {
    request
        .dimms
        .iter()
        .filter(|dimm| layout.reserved_dimm_uid.as_ref() != Some(&dimm.uid))
        .cloned()
        .collect()
}

/// A symmetric slice across DIMMs that still have capacity.
pub(crate) struct SymmetricalSlice {
    /// GiB-aligned bytes to lay on each included DIMM.
    pub bytes_per_dimm: u64,
    /// The DIMMs that still had unallocated capacity.
    pub dimms: Vec<Dimm>,
}

/// Largest per-DIMM slice that fits symmetrically on every DIMM with free
/// capacity, bounded by an even division of `requested_bytes`.
///
/// # Errors
///
/// [`BadRequest::Size`] when no DIMM has unallocated capacity left.
pub(crate) fn largest_per_dimm_symmetrical_bytes(
    dimms: &[Dimm],
    layout: &MemoryAllocationLayout,
    requested_bytes: u64,
) -> Result<SymmetricalSlice, BadRequest> {
    let mut included = Vec::new();
    let mut bytes = u64::MAX;
    for dimm in dimms {
        let free = layout
            .goal(&dimm.uid)
            .unallocated_gib_aligned_bytes(dimm.capacity);
        if free > 0 {
            bytes = bytes.min(free);
            included.push(dimm.clone());
        }
    }
    if included.is_empty() {
        return Err(BadRequest::Size);
    }

    let even_share = requested_bytes / included.len() as u64;
    let bytes_per_dimm = round_down(bytes.min(even_share), BYTES_PER_GIB);
    Ok(SymmetricalSlice {
        bytes_per_dimm,
        dimms: included,
    })
}

/// GiB-aligned unallocated bytes summed over `dimms`.
pub(crate) fn remaining_bytes_from_dimms(
    dimms: &[Dimm],
    layout: &MemoryAllocationLayout,
) -> u64 {
    dimms
        .iter()
        .map(|dimm| {
            layout
                .goal(&dimm.uid)
                .unallocated_gib_aligned_bytes(dimm.capacity)
        })
        .sum()
}
