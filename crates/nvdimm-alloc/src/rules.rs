//! Ordered request-validation rules.
//!
//! Every rule runs before any capacity is laid out; the first failure aborts
//! the request. Order matters: cheap structural checks come first, inventory
//! cross-checks last.

use std::collections::BTreeSet;

use fxhash::FxHashSet;

use crate::config::PlatformConfig;
use crate::dimm::{DimmUid, DiscoveredDimm};
use crate::error::BadRequest;
use crate::layout::MAX_APP_DIRECT_SLOTS;
use crate::request::MemoryAllocationRequest;

/// Runs every request rule in order.
///
/// # Errors
///
/// The first rule violation, as a [`BadRequest`].
pub fn verify_request(
    request: &MemoryAllocationRequest,
    inventory: &[DiscoveredDimm],
    config: &PlatformConfig,
) -> Result<(), BadRequest> {
    verify_provisioning_supported(request, config)?;
    verify_has_dimms(request)?;
    verify_extent_count(request)?;
    verify_remaining_count(request)?;
    verify_reserve_spec(request)?;
    verify_dimm_list(request, inventory)?;
    verify_whole_sockets(request, inventory)?;
    tracing::debug!(dimms = request.dimms.len(), "request passed validation");
    Ok(())
}

fn verify_provisioning_supported(
    request: &MemoryAllocationRequest,
    config: &PlatformConfig,
) -> Result<(), BadRequest> {
    if request.memory_capacity_gib > 0 && !config.memory_mode_supported {
        return Err(BadRequest::NotSupported("Memory-Mode provisioning"));
    }
    if !request.app_direct_extents.is_empty() && !config.app_direct_supported {
        return Err(BadRequest::NotSupported("App-Direct provisioning"));
    }
    if request.app_direct_extents.iter().any(|extent| extent.mirrored) {
        return Err(BadRequest::NotSupported("mirrored App-Direct"));
    }
    Ok(())
}

fn verify_has_dimms(request: &MemoryAllocationRequest) -> Result<(), BadRequest> {
    if request.dimms.is_empty() {
        return Err(BadRequest::NoDimms);
    }
    Ok(())
}

fn verify_extent_count(request: &MemoryAllocationRequest) -> Result<(), BadRequest> {
    let count = request.app_direct_extents.len();
    if count > MAX_APP_DIRECT_SLOTS {
        return Err(BadRequest::TooManyAppDirectExtents(count));
    }
    Ok(())
}

fn verify_remaining_count(request: &MemoryAllocationRequest) -> Result<(), BadRequest> {
    if request.remaining_target_count() > 1 {
        return Err(BadRequest::TooManyRemaining);
    }
    Ok(())
}

fn verify_reserve_spec(request: &MemoryAllocationRequest) -> Result<(), BadRequest> {
    if request.reserve.is_some() && request.reserved_dimm().is_none() {
        return Err(BadRequest::ReserveDimm(
            "the reserved DIMM is not part of the request",
        ));
    }
    Ok(())
}

/// The DIMM-list rule: uids unique, every DIMM known to the platform, and
/// request attributes equal to the discovered ones.
///
/// Channel is deliberately not compared; discovery is the sole authority for
/// channel numbering.
fn verify_dimm_list(
    request: &MemoryAllocationRequest,
    inventory: &[DiscoveredDimm],
) -> Result<(), BadRequest> {
    let mut seen: FxHashSet<&DimmUid> = FxHashSet::default();
    for dimm in &request.dimms {
        if !seen.insert(&dimm.uid) {
            return Err(BadRequest::DimmList {
                uid: dimm.uid.clone(),
                reason: "duplicate uid in request",
            });
        }
    }

    for requested in &request.dimms {
        let Some(discovered) = inventory.iter().find(|entry| entry.dimm.uid == requested.uid)
        else {
            return Err(BadRequest::InvalidDimm(requested.uid.clone()));
        };

        if requested.socket != discovered.dimm.socket {
            return Err(BadRequest::DimmList {
                uid: requested.uid.clone(),
                reason: "socket id disagrees with discovery",
            });
        }
        if requested.memory_controller != discovered.dimm.memory_controller {
            return Err(BadRequest::DimmList {
                uid: requested.uid.clone(),
                reason: "memory controller disagrees with discovery",
            });
        }
        if requested.capacity != discovered.dimm.capacity {
            return Err(BadRequest::DimmList {
                uid: requested.uid.clone(),
                reason: "capacity disagrees with discovery",
            });
        }
        if requested.channel > crate::topology::MAX_CHANNEL {
            return Err(BadRequest::DimmList {
                uid: requested.uid.clone(),
                reason: "channel index exceeds the platform maximum",
            });
        }
    }
    Ok(())
}

/// The partial-socket rule: for each requested socket, the request must name
/// either all manageable DIMMs on it or exactly the never-configured ones.
fn verify_whole_sockets(
    request: &MemoryAllocationRequest,
    inventory: &[DiscoveredDimm],
) -> Result<(), BadRequest> {
    let sockets: BTreeSet<u16> = request.dimms.iter().map(|dimm| dimm.socket).collect();

    for socket in sockets {
        let requested: BTreeSet<&DimmUid> = request
            .dimms
            .iter()
            .filter(|dimm| dimm.socket == socket)
            .map(|dimm| &dimm.uid)
            .collect();
        let all: BTreeSet<&DimmUid> = inventory
            .iter()
            .filter(|entry| entry.dimm.socket == socket)
            .map(|entry| &entry.dimm.uid)
            .collect();

        if requested != all {
            let fresh: BTreeSet<&DimmUid> = inventory
                .iter()
                .filter(|entry| entry.dimm.socket == socket && entry.is_new)
                .map(|entry| &entry.dimm.uid)
                .collect();
            if requested != fresh {
                return Err(BadRequest::MissingRequiredDimms { socket });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimm::{test_dimm, Dimm};
    use crate::request::{AppDirectExtent, ReserveDimmType, ReserveSpec, CAPACITY_REMAINING};

    fn snapshot() -> Vec<Dimm> {
        vec![
            test_dimm("a", 0, 0, 0, 64),
            test_dimm("b", 0, 1, 3, 64),
            test_dimm("c", 1, 0, 0, 32),
            test_dimm("d", 1, 1, 3, 32),
        ]
    }

    fn inventory() -> Vec<DiscoveredDimm> {
        snapshot().into_iter().map(DiscoveredDimm::configured).collect()
    }

    fn request_for(dimms: Vec<Dimm>) -> MemoryAllocationRequest {
        MemoryAllocationRequest {
            dimms,
            ..MemoryAllocationRequest::default()
        }
    }

    #[test]
    fn request_from_snapshot_verifies() {
        let request = request_for(snapshot());
        verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap();
    }

    #[test]
    fn empty_request_is_rejected() {
        let request = request_for(Vec::new());
        assert_eq!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::NoDimms
        );
    }

    #[test]
    fn duplicate_uid_is_rejected() {
        let mut dimms = snapshot();
        dimms.push(dimms[0].clone());
        let request = request_for(dimms);
        assert!(matches!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::DimmList { .. }
        ));
    }

    #[test]
    fn unknown_uid_is_rejected() {
        let mut dimms = snapshot();
        dimms[0] = test_dimm("ghost", 0, 0, 1, 64);
        let request = request_for(dimms);
        assert!(matches!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::InvalidDimm(uid) if uid.as_str() == "ghost"
        ));
    }

    #[test]
    fn attribute_mismatch_is_rejected() {
        let mut dimms = snapshot();
        dimms[0].socket = 1;
        // keep socket 0 whole so the partial-socket rule is not what fires
        let request = request_for(dimms);
        assert!(matches!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::DimmList { reason, .. } if reason.contains("socket")
        ));
    }

    #[test]
    fn partial_socket_is_rejected() {
        let dimms = vec![snapshot()[0].clone(), snapshot()[2].clone(), snapshot()[3].clone()];
        let request = request_for(dimms);
        assert_eq!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::MissingRequiredDimms { socket: 0 }
        );
    }

    #[test]
    fn new_dimms_alone_satisfy_the_socket_rule() {
        let mut inventory = inventory();
        inventory[0].is_new = true;
        let request = request_for(vec![snapshot()[0].clone()]);
        verify_request(&request, &inventory, &PlatformConfig::default()).unwrap();
    }

    #[test]
    fn reserve_uid_must_name_a_request_dimm() {
        let mut request = request_for(snapshot());
        request.reserve = Some(ReserveSpec {
            uid: DimmUid::from("ghost"),
            capacity_type: ReserveDimmType::Storage,
        });
        assert!(matches!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::ReserveDimm(_)
        ));
    }

    #[test]
    fn too_many_extents_are_rejected() {
        let mut request = request_for(snapshot());
        request.app_direct_extents = vec![
            AppDirectExtent::interleaved(16),
            AppDirectExtent::interleaved(16),
            AppDirectExtent::interleaved(16),
        ];
        assert_eq!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::TooManyAppDirectExtents(3)
        );
    }

    #[test]
    fn two_remaining_targets_are_rejected() {
        let mut request = request_for(snapshot());
        request.memory_capacity_gib = CAPACITY_REMAINING;
        request
            .app_direct_extents
            .push(AppDirectExtent::interleaved(CAPACITY_REMAINING));
        assert_eq!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::TooManyRemaining
        );
    }

    #[test]
    fn unsupported_features_are_rejected() {
        let mut request = request_for(snapshot());
        request.memory_capacity_gib = 64;
        let config = PlatformConfig {
            memory_mode_supported: false,
            ..PlatformConfig::default()
        };
        assert!(matches!(
            verify_request(&request, &inventory(), &config).unwrap_err(),
            BadRequest::NotSupported(_)
        ));

        let mut request = request_for(snapshot());
        let mut extent = AppDirectExtent::interleaved(16);
        extent.mirrored = true;
        request.app_direct_extents.push(extent);
        assert_eq!(
            verify_request(&request, &inventory(), &PlatformConfig::default()).unwrap_err(),
            BadRequest::NotSupported("mirrored App-Direct")
        );
    }
}
