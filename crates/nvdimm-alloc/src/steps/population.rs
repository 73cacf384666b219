//! Asymmetrical-population warning step.
//!
//! Interleaving performs best when every DIMM on a socket has the same size
//! and every channel holds a partner pair across the two controllers. When
//! Memory-Mode or App-Direct capacity is requested off a population that
//! breaks either property, a single advisory warning is attached; layout
//! proceeds regardless.

use std::collections::BTreeMap;

use crate::dimm::Dimm;
use crate::layout::{LayoutWarning, MemoryAllocationLayout};
use crate::request::MemoryAllocationRequest;
use crate::topology::CHANNELS_PER_IMC;

/// Flags asymmetric DIMM populations.
pub fn execute(
    request: &MemoryAllocationRequest,
    mut layout: MemoryAllocationLayout,
) -> MemoryAllocationLayout {
    let wants_interleaving =
        request.memory_capacity_gib > 0 || !request.app_direct_extents.is_empty();
    if !wants_interleaving {
        return layout;
    }

    let mut sockets: BTreeMap<u16, Vec<&Dimm>> = BTreeMap::new();
    for dimm in &request.dimms {
        sockets.entry(dimm.socket).or_default().push(dimm);
    }

    for (socket, dimms) in &sockets {
        if capacities_differ(dimms) || has_unpartnered_channel(dimms) {
            tracing::debug!(socket, "asymmetric DIMM population");
            layout.push_warning(LayoutWarning::NonOptimalPopulation);
            break;
        }
    }
    layout
}

fn capacities_differ(dimms: &[&Dimm]) -> bool {
    dimms
        .first()
        .is_some_and(|first| dimms.iter().any(|dimm| dimm.capacity != first.capacity))
}

/// True if any channel-partnership group holds exactly one DIMM.
fn has_unpartnered_channel(dimms: &[&Dimm]) -> bool {
    let mut groups: BTreeMap<u32, usize> = BTreeMap::new();
    for dimm in dimms {
        *groups.entry(dimm.channel % CHANNELS_PER_IMC).or_default() += 1;
    }
    groups.values().any(|&count| count == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimm::test_dimm;

    fn request_with_memory(dimms: Vec<Dimm>) -> MemoryAllocationRequest {
        MemoryAllocationRequest {
            dimms,
            memory_capacity_gib: 32,
            ..MemoryAllocationRequest::default()
        }
    }

    #[test]
    fn balanced_population_raises_no_warning() {
        let request = request_with_memory(vec![
            test_dimm("a", 0, 0, 0, 64),
            test_dimm("b", 0, 1, 3, 64),
        ]);
        let layout = execute(&request, MemoryAllocationLayout::for_request(&request));
        assert!(layout.warnings.is_empty());
    }

    #[test]
    fn mixed_capacities_raise_the_warning() {
        let request = request_with_memory(vec![
            test_dimm("a", 0, 0, 0, 64),
            test_dimm("b", 0, 1, 3, 32),
        ]);
        let layout = execute(&request, MemoryAllocationLayout::for_request(&request));
        assert_eq!(layout.warnings, vec![LayoutWarning::NonOptimalPopulation]);
    }

    #[test]
    fn unpartnered_channel_raises_the_warning() {
        // Both DIMMs on controller 0; neither channel has its partner.
        let request = request_with_memory(vec![
            test_dimm("a", 0, 0, 0, 64),
            test_dimm("b", 0, 0, 1, 64),
        ]);
        let layout = execute(&request, MemoryAllocationLayout::for_request(&request));
        assert_eq!(layout.warnings, vec![LayoutWarning::NonOptimalPopulation]);
    }

    #[test]
    fn storage_only_requests_skip_the_check() {
        let request = MemoryAllocationRequest {
            dimms: vec![test_dimm("a", 0, 0, 0, 64), test_dimm("b", 0, 0, 1, 32)],
            storage_remaining: true,
            ..MemoryAllocationRequest::default()
        };
        let layout = execute(&request, MemoryAllocationLayout::for_request(&request));
        assert!(layout.warnings.is_empty());
    }

    #[test]
    fn warning_is_raised_once_across_sockets() {
        let request = request_with_memory(vec![
            test_dimm("a", 0, 0, 0, 64),
            test_dimm("b", 0, 1, 3, 32),
            test_dimm("c", 1, 0, 0, 64),
            test_dimm("d", 1, 1, 3, 32),
        ]);
        let layout = execute(&request, MemoryAllocationLayout::for_request(&request));
        assert_eq!(layout.warnings.len(), 1);
    }
}
