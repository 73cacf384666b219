//! Terminal deviation check.
//!
//! Never fails; compares what the capacity steps achieved against what the
//! request asked for and attaches at most one advisory warning when the
//! difference exceeds the fixed 10% threshold.

use crate::layout::{LayoutWarning, MemoryAllocationLayout};
use crate::request::MemoryAllocationRequest;

/// Maximum tolerated deviation between requested and achieved capacity.
const DEVIATION_PERCENT_LIMIT: u64 = 10;

/// Appends the goal-adjusted warning when achieved capacity strays too far
/// from the request.
pub fn execute(
    request: &MemoryAllocationRequest,
    mut layout: MemoryAllocationLayout,
) -> MemoryAllocationLayout {
    if memory_deviates(request, &layout) || app_direct_deviates(request, &layout) {
        layout.push_warning(LayoutWarning::GoalAdjustedMoreThan10Percent);
    }
    layout
}

fn memory_deviates(request: &MemoryAllocationRequest, layout: &MemoryAllocationLayout) -> bool {
    if request.memory_is_remaining() {
        // No numeric target to deviate from, but mapping nothing at all for
        // a remaining-mode Memory target still warrants the warning.
        return request.memory_capacity_gib > 0 && layout.memory_capacity == 0;
    }
    if request.memory_capacity_gib == 0 {
        return false;
    }
    exceeds_threshold(request.memory_capacity_gib, layout.memory_capacity)
}

fn app_direct_deviates(request: &MemoryAllocationRequest, layout: &MemoryAllocationLayout) -> bool {
    let requested = request.requested_app_direct_gib();
    if requested == 0 {
        return false;
    }
    // The reserved DIMM's App-Direct capacity was never part of what the
    // request asked for.
    let reserved_gib = layout
        .reserved_dimm_uid
        .as_ref()
        .map_or(0, |uid| layout.goal(uid).app_direct_gib());
    let achieved = layout.total_app_direct_gib().saturating_sub(reserved_gib);
    exceeds_threshold(requested, achieved)
}

fn exceeds_threshold(requested_gib: u64, achieved_gib: u64) -> bool {
    if achieved_gib == 0 {
        return true;
    }
    // Cross-multiplied so fractional deviations are not truncated away:
    // 100 * |achieved - requested| / requested > limit, without the division.
    let difference = u128::from(requested_gib.abs_diff(achieved_gib));
    if 100 * difference > u128::from(DEVIATION_PERCENT_LIMIT) * u128::from(requested_gib) {
        tracing::debug!(requested_gib, achieved_gib, "goal adjusted beyond threshold");
        true
    } else {
        false
    }
}
