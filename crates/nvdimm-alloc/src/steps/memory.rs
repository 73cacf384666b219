//! Memory-Mode layout step.
//!
//! Lays the requested volatile capacity across the non-reserved DIMMs in
//! symmetric GiB-aligned slices. Each DIMM's Memory-Mode/persistent split is
//! aligned so the persistent region stays a multiple of the platform's
//! persistent-memory alignment.

use crate::dimm::Dimm;
use crate::error::BadRequest;
use crate::layout::{
    bytes_to_gib, gib_to_bytes, round_down, round_up, MemoryAllocationLayout, BYTES_PER_GIB,
    PM_ALIGNMENT_GIB,
};
use crate::request::MemoryAllocationRequest;
use crate::steps::{largest_per_dimm_symmetrical_bytes, layout_dimms, remaining_bytes_from_dimms};

const PM_ALIGNMENT_BYTES: u64 = PM_ALIGNMENT_GIB * BYTES_PER_GIB;

/// Lays out the Memory-Mode region.
///
/// # Errors
///
/// [`BadRequest::MemorySize`] when the target cannot be met; the error
/// carries the GiB mapped before capacity ran out.
pub fn execute(
    request: &MemoryAllocationRequest,
    mut layout: MemoryAllocationLayout,
) -> Result<MemoryAllocationLayout, BadRequest> {
    let dimms = layout_dimms(request, &layout);
    let target_bytes = requested_bytes(request, &layout, &dimms);
    if target_bytes == 0 {
        return Ok(layout);
    }

    let mut allocated = 0u64;
    let mut aligned_allocated = 0u64;
    while allocated < target_bytes {
        let Ok(slice) =
            largest_per_dimm_symmetrical_bytes(&dimms, &layout, target_bytes - allocated)
        else {
            return Err(exhausted(aligned_allocated));
        };

        for dimm in &slice.dimms {
            let Ok(aligned) = aligned_dimm_bytes(request, dimm, &layout, slice.bytes_per_dimm)
            else {
                return Err(exhausted(aligned_allocated));
            };
            layout.goal_mut(&dimm.uid).memory_size_gib += bytes_to_gib(aligned);
            aligned_allocated += aligned;
            allocated += slice.bytes_per_dimm;
        }
    }

    layout.memory_capacity = bytes_to_gib(aligned_allocated);
    tracing::debug!(memory_gib = layout.memory_capacity, "memory mode laid out");
    Ok(layout)
}

fn exhausted(aligned_allocated: u64) -> BadRequest {
    BadRequest::MemorySize {
        achieved_gib: bytes_to_gib(aligned_allocated),
    }
}

fn requested_bytes(
    request: &MemoryAllocationRequest,
    layout: &MemoryAllocationLayout,
    dimms: &[Dimm],
) -> u64 {
    if request.memory_is_remaining() {
        remaining_bytes_from_dimms(dimms, layout)
    } else {
        gib_to_bytes(request.memory_capacity_gib)
    }
}

/// The aligned number of bytes to add to a DIMM's Memory-Mode partition for
/// a requested slice.
///
/// When Memory-Mode runs as the remaining step with App-Direct extents
/// present, the persistent region is rounded up (memory rounded down);
/// otherwise the nearest achievable alignment is chosen, preferring round-up
/// on ties since rounding up only consumes would-be storage.
fn aligned_dimm_bytes(
    request: &MemoryAllocationRequest,
    dimm: &Dimm,
    layout: &MemoryAllocationLayout,
    requested_bytes: u64,
) -> Result<u64, BadRequest> {
    if requested_bytes < BYTES_PER_GIB {
        return Err(BadRequest::Size);
    }

    let existing = gib_to_bytes(layout.goal(&dimm.uid).memory_size_gib);
    let total = round_down(existing + requested_bytes, BYTES_PER_GIB);
    let dimm_bytes = round_down(dimm.capacity, BYTES_PER_GIB);

    let aligned_total = if request.memory_is_remaining() {
        if request.app_direct_extents.is_empty() {
            total
        } else {
            round_memory_down_to_pm_alignment(total, dimm_bytes)?
        }
    } else {
        round_memory_to_nearest_pm_alignment(total, dimm_bytes)?
    };

    if aligned_total <= existing {
        return Err(BadRequest::Size);
    }
    let aligned = aligned_total - existing;
    if aligned < BYTES_PER_GIB {
        return Err(BadRequest::Size);
    }
    Ok(aligned)
}

/// Rounds the persistent remainder up to the alignment, shrinking memory.
fn round_memory_down_to_pm_alignment(
    memory_bytes: u64,
    dimm_bytes: u64,
) -> Result<u64, BadRequest> {
    let pm_bytes = dimm_bytes.checked_sub(memory_bytes).ok_or(BadRequest::Size)?;
    let pm_aligned = if pm_bytes > 0 {
        round_up(pm_bytes, PM_ALIGNMENT_BYTES)
    } else {
        0
    };
    if pm_aligned > dimm_bytes {
        return Err(BadRequest::Size);
    }
    let aligned_memory = dimm_bytes - pm_aligned;
    if aligned_memory < BYTES_PER_GIB {
        return Err(BadRequest::Size);
    }
    Ok(aligned_memory)
}

/// Rounds the persistent remainder down to the alignment, growing memory. A
/// remainder below one alignment unit collapses to zero, handing the whole
/// DIMM to Memory-Mode.
fn round_memory_up_to_pm_alignment(memory_bytes: u64, dimm_bytes: u64) -> Result<u64, BadRequest> {
    let pm_bytes = dimm_bytes.checked_sub(memory_bytes).ok_or(BadRequest::Size)?;
    let pm_aligned = round_down(pm_bytes, PM_ALIGNMENT_BYTES);
    Ok(dimm_bytes - pm_aligned)
}

fn round_memory_to_nearest_pm_alignment(
    memory_bytes: u64,
    dimm_bytes: u64,
) -> Result<u64, BadRequest> {
    let pm_bytes = dimm_bytes.checked_sub(memory_bytes).ok_or(BadRequest::Size)?;
    if pm_bytes % PM_ALIGNMENT_BYTES == 0 {
        // Already aligned; nothing to trade between memory and persistent.
        return Ok(memory_bytes);
    }

    let up = round_memory_up_to_pm_alignment(memory_bytes, dimm_bytes)
        .ok()
        .filter(|&bytes| bytes > memory_bytes && bytes - memory_bytes >= BYTES_PER_GIB);
    let down = round_memory_down_to_pm_alignment(memory_bytes, dimm_bytes)
        .ok()
        .filter(|&bytes| bytes < memory_bytes && memory_bytes - bytes >= BYTES_PER_GIB);

    match (up, down) {
        (Some(up), Some(down)) => {
            let up_diff = up - memory_bytes;
            let down_diff = memory_bytes - down;
            Ok(if up_diff <= down_diff { up } else { down })
        }
        (Some(up), None) => Ok(up),
        (None, Some(down)) => Ok(down),
        (None, None) => Err(BadRequest::Size),
    }
}
