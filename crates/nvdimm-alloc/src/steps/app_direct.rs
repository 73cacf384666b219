//! App-Direct layout step, one run per requested extent.
//!
//! Interleaved extents stripe across the widest legal interleave pattern each
//! socket's population satisfies; by-one extents lay an x1 set per DIMM.
//! Every member of a set contributes the same GiB-aligned capacity and
//! shares one platform-unique set id. An extent that cannot be laid in full
//! lays what fits; the deviation check downstream raises the warning.

use std::collections::BTreeMap;

use fxhash::FxHashMap;

use crate::config::PlatformConfig;
use crate::dimm::{Dimm, DimmUid};
use crate::error::BadRequest;
use crate::layout::{
    bytes_to_gib, gib_to_bytes, round_down, AppDirectGoal, InterleaveSettings, InterleaveWays,
    MemoryAllocationLayout, BYTES_PER_GIB,
};
use crate::request::{AppDirectExtent, MemoryAllocationRequest};
use crate::steps::{layout_dimms, remaining_bytes_from_dimms};
use crate::topology;

/// Lays out one App-Direct extent and records its achieved capacity.
///
/// # Errors
///
/// [`BadRequest::AppDirectSettings`] if a matched set has no legal
/// interleave way.
pub fn execute(
    request: &MemoryAllocationRequest,
    extent_index: usize,
    config: &PlatformConfig,
    mut layout: MemoryAllocationLayout,
) -> Result<MemoryAllocationLayout, BadRequest> {
    let extent = &request.app_direct_extents[extent_index];
    let dimms = layout_dimms(request, &layout);
    let laid_bytes = lay_extent(&dimms, extent, config, &mut layout)?;
    if laid_bytes == 0 {
        return Err(BadRequest::Size);
    }

    // Extents may run out of request order (a remaining-mode extent is
    // deferred), so record by index rather than pushing.
    if layout.app_direct_capacities.len() < request.app_direct_extents.len() {
        layout
            .app_direct_capacities
            .resize(request.app_direct_extents.len(), 0);
    }
    layout.app_direct_capacities[extent_index] = bytes_to_gib(laid_bytes);

    tracing::debug!(
        extent = extent_index,
        laid_gib = bytes_to_gib(laid_bytes),
        by_one = extent.by_one,
        "app direct extent laid out"
    );
    Ok(layout)
}

/// Lays `extent` across `dimms`, returning the bytes laid.
///
/// Shared with the reserve-DIMM step, which lays a synthetic by-one extent
/// on the reserved DIMM without recording an extent capacity.
pub(crate) fn lay_extent(
    dimms: &[Dimm],
    extent: &AppDirectExtent,
    config: &PlatformConfig,
    layout: &mut MemoryAllocationLayout,
) -> Result<u64, BadRequest> {
    let requested_bytes = if extent.is_remaining() {
        let remaining = remaining_bytes_from_dimms(dimms, layout);
        if remaining == 0 {
            return Err(BadRequest::Size);
        }
        remaining
    } else {
        gib_to_bytes(extent.capacity_gib)
    };
    if requested_bytes == 0 {
        return Ok(0);
    }

    let channel_size = extent
        .channel_interleave
        .unwrap_or(config.recommended_channel_interleave);
    let imc_size = extent
        .imc_interleave
        .unwrap_or(config.recommended_imc_interleave);

    // Set counts before this extent ran; a set laid by this run may absorb
    // further capacity, sets from earlier extents never do.
    let prior_sets: FxHashMap<DimmUid, usize> = dimms
        .iter()
        .map(|dimm| (dimm.uid.clone(), layout.goal(&dimm.uid).app_direct.len()))
        .collect();

    let laid = Laying {
        channel_size,
        imc_size,
        prior_sets,
        set_id_baseline: config.interleave_set_id_baseline,
    };

    if extent.by_one {
        laid.by_one(dimms, requested_bytes, layout)
    } else {
        laid.interleaved(dimms, requested_bytes, layout)
    }
}

/// Shared parameters of one extent run.
struct Laying {
    channel_size: u64,
    imc_size: u64,
    prior_sets: FxHashMap<DimmUid, usize>,
    set_id_baseline: u16,
}

impl Laying {
    /// Lays x1 sets sized symmetrically; leftover flows to the DIMMs that
    /// still have capacity, extending their sets.
    fn by_one(
        &self,
        dimms: &[Dimm],
        requested_bytes: u64,
        layout: &mut MemoryAllocationLayout,
    ) -> Result<u64, BadRequest> {
        let mut remaining = requested_bytes;
        let mut laid = 0u64;
        loop {
            let candidates: Vec<&Dimm> = dimms
                .iter()
                .filter(|dimm| self.free_bytes(dimm, layout) > 0)
                .collect();
            if remaining == 0 || candidates.is_empty() {
                break;
            }

            let share = round_down(remaining / candidates.len() as u64, BYTES_PER_GIB);
            let min_free = candidates
                .iter()
                .map(|dimm| round_down(self.free_bytes(dimm, layout), BYTES_PER_GIB))
                .min()
                .unwrap_or(0);
            let mut per_dimm = share.min(min_free);
            if per_dimm == 0 {
                // Remainder too small to split; it lands on one DIMM.
                per_dimm = round_down(remaining, BYTES_PER_GIB).min(min_free);
                if per_dimm == 0 {
                    break;
                }
                self.lay_set(std::slice::from_ref(candidates[0]), per_dimm, layout)?;
                laid += per_dimm;
                remaining -= per_dimm;
                continue;
            }

            for dimm in &candidates {
                self.lay_set(std::slice::from_ref(*dimm), per_dimm, layout)?;
            }
            laid += per_dimm * candidates.len() as u64;
            remaining -= per_dimm * candidates.len() as u64;
        }
        Ok(laid)
    }

    fn interleaved(
        &self,
        dimms: &[Dimm],
        requested_bytes: u64,
        layout: &mut MemoryAllocationLayout,
    ) -> Result<u64, BadRequest> {
        let mut sockets: BTreeMap<u16, Vec<Dimm>> = BTreeMap::new();
        for dimm in dimms {
            sockets.entry(dimm.socket).or_default().push(dimm.clone());
        }

        // Even division of the target across every DIMM with capacity.
        let candidate_count = dimms
            .iter()
            .filter(|dimm| self.free_bytes(dimm, layout) > 0)
            .count() as u64;
        if candidate_count == 0 {
            return Ok(0);
        }
        let even_share = round_down(requested_bytes / candidate_count, BYTES_PER_GIB);

        let mut remaining = requested_bytes;
        let mut laid = 0u64;
        for socket_dimms in sockets.values() {
            let mut candidates: Vec<Dimm> = socket_dimms
                .iter()
                .filter(|dimm| self.free_bytes(dimm, layout) > 0)
                .cloned()
                .collect();

            while remaining > 0 && !candidates.is_empty() {
                let Some(set) = topology::first_matching_set(&candidates) else {
                    break;
                };
                let count = set.len() as u64;
                let share = even_share.min(round_down(remaining / count, BYTES_PER_GIB));
                let min_free = set
                    .iter()
                    .map(|dimm| self.free_bytes(dimm, layout))
                    .min()
                    .unwrap_or(0);
                let per_dimm = share.min(round_down(min_free, BYTES_PER_GIB));
                if per_dimm == 0 {
                    break;
                }

                self.lay_set(&set, per_dimm, layout)?;
                laid += per_dimm * count;
                remaining -= per_dimm * count;
                candidates.retain(|dimm| self.free_bytes(dimm, layout) > 0);
            }
        }
        Ok(laid)
    }

    fn free_bytes(&self, dimm: &Dimm, layout: &MemoryAllocationLayout) -> u64 {
        layout
            .goal(&dimm.uid)
            .unallocated_app_direct_bytes(dimm.capacity)
    }

    /// Lays `bytes_per_dimm` onto every member as one interleave set,
    /// extending a set this extent already laid when the shape matches.
    fn lay_set(
        &self,
        set: &[Dimm],
        bytes_per_dimm: u64,
        layout: &mut MemoryAllocationLayout,
    ) -> Result<(), BadRequest> {
        let ways = InterleaveWays::from_member_count(set.len())?;
        let members: Vec<DimmUid> = set.iter().map(|dimm| dimm.uid.clone()).collect();
        let settings = InterleaveSettings {
            ways,
            channel_size: self.channel_size,
            imc_size: self.imc_size,
            members,
        };
        let size_gib = bytes_to_gib(bytes_per_dimm);

        let first = &set[0].uid;
        let first_goal = layout.goal(first);
        let laid_this_run =
            first_goal.app_direct.len() > self.prior_sets.get(first).copied().unwrap_or(0);
        if laid_this_run
            && first_goal
                .app_direct
                .last()
                .is_some_and(|existing| existing.settings.matches(&settings))
        {
            for dimm in set {
                if let Some(existing) = layout.goal_mut(&dimm.uid).app_direct.last_mut() {
                    existing.size_gib += size_gib;
                }
            }
            return Ok(());
        }

        let set_id = layout.next_interleave_set_id(self.set_id_baseline);
        for dimm in set {
            layout.goal_mut(&dimm.uid).app_direct.push(AppDirectGoal {
                size_gib,
                set_id,
                settings: settings.clone(),
            });
        }
        Ok(())
    }
}
