//! Reserve-DIMM layout step.
//!
//! Runs first: it pulls the designated DIMM out of the general interleave
//! pool so no later capacity step stripes across it. The reserved DIMM's
//! whole capacity is laid immediately through a synthetic single-DIMM
//! sub-request, either as storage or as a non-interleaved App-Direct set.

use crate::config::PlatformConfig;
use crate::error::BadRequest;
use crate::layout::{bytes_to_gib, MemoryAllocationLayout};
use crate::request::{AppDirectExtent, MemoryAllocationRequest, ReserveDimmType};
use crate::steps::{app_direct, storage};

/// Excludes the reserved DIMM, laying its capacity per the reserve type.
///
/// # Errors
///
/// [`BadRequest::ReserveDimm`] when the request holds a single DIMM
/// (reserving it would leave nothing to provision) or names a DIMM the
/// request does not contain.
pub fn execute(
    request: &MemoryAllocationRequest,
    config: &PlatformConfig,
    mut layout: MemoryAllocationLayout,
) -> Result<MemoryAllocationLayout, BadRequest> {
    let Some(spec) = &request.reserve else {
        return Ok(layout);
    };
    if request.dimms.is_empty() {
        return Err(BadRequest::NoDimms);
    }
    if request.dimms.len() < 2 {
        return Err(BadRequest::ReserveDimm(
            "cannot reserve the only DIMM in the request",
        ));
    }
    let Some(dimm) = request.reserved_dimm() else {
        return Err(BadRequest::ReserveDimm(
            "the reserved DIMM is not part of the request",
        ));
    };

    match spec.capacity_type {
        ReserveDimmType::Storage => {
            let sub_request = MemoryAllocationRequest {
                dimms: vec![dimm.clone()],
                storage_remaining: true,
                ..MemoryAllocationRequest::default()
            };
            layout = storage::execute(&sub_request, layout);
            tracing::debug!(uid = %dimm.uid, "reserved DIMM laid as storage");
        }
        ReserveDimmType::AppDirectByOne => {
            let extent = AppDirectExtent::by_one(dimm.capacity_gib());
            let laid = app_direct::lay_extent(
                std::slice::from_ref(dimm),
                &extent,
                config,
                &mut layout,
            )?;
            tracing::debug!(
                uid = %dimm.uid,
                laid_gib = bytes_to_gib(laid),
                "reserved DIMM laid as by-one App-Direct"
            );
        }
    }

    layout.reserved_dimm_uid = Some(dimm.uid.clone());
    Ok(layout)
}
