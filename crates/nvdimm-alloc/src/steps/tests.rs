//! End-to-end pipeline scenarios.

use crate::config::PlatformConfig;
use crate::dimm::{test_dimm, Dimm};
use crate::error::BadRequest;
use crate::layout::{InterleaveWays, LayoutWarning};
use crate::request::{
    AppDirectExtent, MemoryAllocationRequest, ReserveDimmType, ReserveSpec, CAPACITY_REMAINING,
};
use crate::steps::build_layout;

fn pair() -> Vec<Dimm> {
    // One socket, one DIMM per controller, both on channel 0.
    vec![test_dimm("a", 0, 0, 0, 64), test_dimm("b", 0, 1, 0, 64)]
}

fn four_way_socket() -> Vec<Dimm> {
    vec![
        test_dimm("a", 0, 0, 0, 64),
        test_dimm("b", 0, 1, 3, 64),
        test_dimm("c", 0, 0, 1, 64),
        test_dimm("d", 0, 1, 4, 64),
    ]
}

fn request_for(dimms: Vec<Dimm>) -> MemoryAllocationRequest {
    MemoryAllocationRequest {
        dimms,
        ..MemoryAllocationRequest::default()
    }
}

#[test]
fn targetless_request_lays_everything_as_storage() {
    let request = request_for(pair());
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.memory_capacity, 0);
    assert!(layout.app_direct_capacities.is_empty());
    assert_eq!(layout.storage_capacity, 128);
    assert_eq!(layout.reserved_dimm_uid, None);
    assert!(layout.warnings.is_empty());
    for uid in ["a", "b"] {
        assert_eq!(layout.goal(&uid.into()).storage_size_gib, 64);
    }
}

#[test]
fn reserving_with_a_single_dimm_fails() {
    let mut request = request_for(vec![test_dimm("a", 0, 0, 0, 64)]);
    request.reserve = Some(ReserveSpec {
        uid: "a".into(),
        capacity_type: ReserveDimmType::Storage,
    });
    let err = build_layout(&request, &PlatformConfig::default()).unwrap_err();
    assert!(matches!(err, BadRequest::ReserveDimm(_)));
}

#[test]
fn alignment_overshoot_raises_the_deviation_warning() {
    // 100 GiB over two 64 GiB DIMMs: the 50 GiB per-DIMM split cannot keep
    // the persistent remainder 32 GiB aligned, so each DIMM rounds up to a
    // full 64 GiB of Memory-Mode.
    let mut request = request_for(pair());
    request.memory_capacity_gib = 100;
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.memory_capacity, 128);
    assert_eq!(layout.storage_capacity, 0);
    assert_eq!(
        layout.warnings,
        vec![LayoutWarning::GoalAdjustedMoreThan10Percent]
    );
}

#[test]
fn memory_app_direct_and_storage_share_a_socket() {
    let mut request = request_for(four_way_socket());
    request.memory_capacity_gib = 128;
    request
        .app_direct_extents
        .push(AppDirectExtent::interleaved(64));
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.memory_capacity, 128);
    assert_eq!(layout.app_direct_capacities, vec![64]);
    assert_eq!(layout.storage_capacity, 64);
    assert!(layout.warnings.is_empty());
    for uid in ["a", "b", "c", "d"] {
        let goal = layout.goal(&uid.into());
        assert_eq!(goal.memory_size_gib, 32);
        assert_eq!(goal.app_direct.len(), 1);
        assert_eq!(goal.app_direct[0].size_gib, 16);
        assert_eq!(goal.app_direct[0].settings.ways, InterleaveWays::X4);
        assert_eq!(goal.storage_size_gib, 16);
    }
}

#[test]
fn remaining_memory_runs_after_explicit_extents() {
    let mut request = request_for(pair());
    request.memory_capacity_gib = CAPACITY_REMAINING;
    request
        .app_direct_extents
        .push(AppDirectExtent::interleaved(64));
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.app_direct_capacities, vec![64]);
    assert_eq!(layout.memory_capacity, 64);
    assert_eq!(layout.storage_capacity, 0);
    assert!(layout.warnings.is_empty());
}

#[test]
fn storage_remaining_flag_claims_the_leftover() {
    let mut request = request_for(pair());
    request.memory_capacity_gib = 64;
    request.storage_remaining = true;
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.memory_capacity, 64);
    assert_eq!(layout.storage_capacity, 64);
    assert!(layout.warnings.is_empty());
}

#[test]
fn by_one_reserve_flows_through_the_pipeline() {
    let mut request = request_for(vec![
        test_dimm("a", 0, 0, 0, 64),
        test_dimm("b", 0, 1, 3, 64),
        test_dimm("c", 0, 0, 1, 64),
    ]);
    request.reserve = Some(ReserveSpec {
        uid: "c".into(),
        capacity_type: ReserveDimmType::AppDirectByOne,
    });
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.reserved_dimm_uid, Some("c".into()));
    let reserved = layout.goal(&"c".into());
    assert_eq!(reserved.app_direct.len(), 1);
    assert_eq!(reserved.app_direct[0].size_gib, 64);
    assert_eq!(reserved.app_direct[0].settings.ways, InterleaveWays::X1);
    // Reserve capacity is not an extent and storage claims the rest.
    assert!(layout.app_direct_capacities.is_empty());
    assert_eq!(layout.storage_capacity, 128);
}

#[test]
fn asymmetric_population_warns_but_lays_out() {
    let mut request = request_for(vec![
        test_dimm("a", 0, 0, 0, 64),
        test_dimm("b", 0, 1, 0, 32),
    ]);
    request.memory_capacity_gib = 96;
    let layout = build_layout(&request, &PlatformConfig::default()).unwrap();

    assert_eq!(layout.memory_capacity, 96);
    assert_eq!(layout.goal(&"a".into()).memory_size_gib, 64);
    assert_eq!(layout.goal(&"b".into()).memory_size_gib, 32);
    assert_eq!(layout.warnings, vec![LayoutWarning::NonOptimalPopulation]);
}

#[test]
fn interleave_set_ids_start_above_the_configured_baseline() {
    let config = PlatformConfig {
        interleave_set_id_baseline: 5,
        ..PlatformConfig::default()
    };
    let mut request = request_for(pair());
    request
        .app_direct_extents
        .push(AppDirectExtent::interleaved(64));
    let layout = build_layout(&request, &config).unwrap();

    for uid in ["a", "b"] {
        assert_eq!(layout.goal(&uid.into()).app_direct[0].set_id, 6);
    }
}

#[test]
fn remaining_extent_with_nothing_left_fails() {
    let mut request = request_for(pair());
    request.memory_capacity_gib = 128;
    request
        .app_direct_extents
        .push(AppDirectExtent::interleaved(CAPACITY_REMAINING));
    let err = build_layout(&request, &PlatformConfig::default()).unwrap_err();
    assert_eq!(err, BadRequest::Size);
}
