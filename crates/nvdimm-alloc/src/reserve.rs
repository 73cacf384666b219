//! Reserve DIMM selection.
//!
//! Chooses exactly one DIMM to exclude from the general interleave pool,
//! typically to soak up odd capacity as storage. Selection walks a strict
//! priority chain of heuristics; each heuristic is tried across every socket
//! (in ascending socket order) before falling through to the next.

use std::collections::BTreeMap;

use crate::dimm::{Dimm, DimmUid};
use crate::topology::CHANNELS_PER_IMC;

/// Errors raised by reserve DIMM selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// No DIMMs were supplied to choose from.
    #[error("cannot select a reserve DIMM from an empty DIMM list")]
    NoDimms,
}

/// DIMMs of one socket, in request order.
type SocketDimms<'a> = BTreeMap<u16, Vec<&'a Dimm>>;

/// Picks the DIMM to set aside from the general interleave pool.
///
/// Heuristics, in priority order:
/// 1. the only DIMM alone on its memory controller, on a socket where at
///    least one controller is fully populated
/// 2. a DIMM whose channel partner on the other controller is absent
/// 3. the single uniquely sized DIMM on a socket
/// 4. the smallest DIMM on a socket holding mixed capacities
/// 5. the first DIMM of the first socket
///
/// The returned uid is always present in the input.
///
/// # Errors
///
/// [`SelectionError::NoDimms`] if `dimms` is empty.
pub fn select_reserve_dimm(dimms: &[Dimm]) -> Result<DimmUid, SelectionError> {
    if dimms.is_empty() {
        return Err(SelectionError::NoDimms);
    }

    let mut sockets = SocketDimms::new();
    for dimm in dimms {
        sockets.entry(dimm.socket).or_default().push(dimm);
    }

    let heuristics: [(&str, fn(&SocketDimms<'_>) -> Option<DimmUid>); 4] = [
        ("alone-on-controller", select_alone_on_controller),
        ("missing-channel-partner", select_missing_channel_partner),
        ("uniquely-sized", select_uniquely_sized),
        ("smallest-sized", select_smallest_sized),
    ];

    for (name, heuristic) in heuristics {
        if let Some(uid) = heuristic(&sockets) {
            tracing::debug!(heuristic = name, %uid, "selected reserve DIMM");
            return Ok(uid);
        }
    }

    // Fallback: first DIMM of the first socket.
    let uid = sockets
        .values()
        .next()
        .and_then(|socket| socket.first())
        .map(|dimm| dimm.uid.clone())
        .ok_or(SelectionError::NoDimms)?;
    tracing::debug!(heuristic = "first-dimm", %uid, "selected reserve DIMM");
    Ok(uid)
}

/// A DIMM alone on its controller, where a sibling controller on the same
/// socket is fully populated. Skipped when several DIMMs are isolated, since
/// the choice would be arbitrary.
fn select_alone_on_controller(sockets: &SocketDimms<'_>) -> Option<DimmUid> {
    for socket_dimms in sockets.values() {
        let by_controller = group_by_controller(socket_dimms);

        let isolated: Vec<&Dimm> = by_controller
            .values()
            .filter(|dimms| dimms.len() == 1)
            .map(|dimms| dimms[0])
            .collect();
        let fully_populated = by_controller
            .values()
            .any(|dimms| dimms.len() == CHANNELS_PER_IMC as usize);

        if isolated.len() == 1 && fully_populated {
            return Some(isolated[0].uid.clone());
        }
    }
    None
}

/// A DIMM whose channel partner (same `channel % CHANNELS_PER_IMC` on the
/// other controller) does not exist.
fn select_missing_channel_partner(sockets: &SocketDimms<'_>) -> Option<DimmUid> {
    for socket_dimms in sockets.values() {
        let mut partnerships: BTreeMap<u32, Vec<&Dimm>> = BTreeMap::new();
        for &dimm in socket_dimms {
            partnerships
                .entry(dimm.channel % CHANNELS_PER_IMC)
                .or_default()
                .push(dimm);
        }

        for partners in partnerships.values() {
            if partners.len() == 1 {
                return Some(partners[0].uid.clone());
            }
        }
    }
    None
}

/// The single DIMM whose capacity is unique among its socket's DIMMs.
fn select_uniquely_sized(sockets: &SocketDimms<'_>) -> Option<DimmUid> {
    for socket_dimms in sockets.values() {
        let unique: Vec<&Dimm> = group_by_capacity(socket_dimms)
            .values()
            .filter(|dimms| dimms.len() == 1)
            .map(|dimms| dimms[0])
            .collect();
        if unique.len() == 1 {
            return Some(unique[0].uid.clone());
        }
    }
    None
}

/// The first of the smallest-capacity DIMMs, on a socket that holds more
/// than one distinct capacity.
fn select_smallest_sized(sockets: &SocketDimms<'_>) -> Option<DimmUid> {
    for socket_dimms in sockets.values() {
        let by_capacity = group_by_capacity(socket_dimms);
        if by_capacity.len() > 1 {
            // Ascending key order: the first group holds the smallest DIMMs.
            let smallest = by_capacity.values().next()?;
            return Some(smallest[0].uid.clone());
        }
    }
    None
}

fn group_by_controller<'a>(dimms: &[&'a Dimm]) -> BTreeMap<u16, Vec<&'a Dimm>> {
    let mut by_controller: BTreeMap<u16, Vec<&Dimm>> = BTreeMap::new();
    for &dimm in dimms {
        by_controller
            .entry(dimm.memory_controller)
            .or_default()
            .push(dimm);
    }
    by_controller
}

fn group_by_capacity<'a>(dimms: &[&'a Dimm]) -> BTreeMap<u64, Vec<&'a Dimm>> {
    let mut by_capacity: BTreeMap<u64, Vec<&Dimm>> = BTreeMap::new();
    for &dimm in dimms {
        by_capacity.entry(dimm.capacity).or_default().push(dimm);
    }
    by_capacity
}
