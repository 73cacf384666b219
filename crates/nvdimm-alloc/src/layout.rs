//! Layout accumulator: the per-DIMM capacity partition computed for a
//! request, ultimately written to hardware configuration by the caller.

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::dimm::DimmUid;
use crate::error::BadRequest;
use crate::request::MemoryAllocationRequest;

/// Bytes per GiB.
pub const BYTES_PER_GIB: u64 = 1 << 30;

/// Persistent-memory partition alignment in GiB.
///
/// The Memory-Mode/persistent split on each DIMM must leave the persistent
/// region a multiple of this.
pub const PM_ALIGNMENT_GIB: u64 = 32;

/// Maximum App-Direct interleave sets a single DIMM can participate in.
pub const MAX_APP_DIRECT_SLOTS: usize = 2;

pub(crate) fn round_down(value: u64, alignment: u64) -> u64 {
    value / alignment * alignment
}

pub(crate) fn round_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

pub(crate) fn bytes_to_gib(bytes: u64) -> u64 {
    bytes / BYTES_PER_GIB
}

pub(crate) fn gib_to_bytes(gib: u64) -> u64 {
    gib * BYTES_PER_GIB
}

/// Number of DIMMs an interleave set stripes across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterleaveWays {
    /// Non-interleaved single-DIMM set.
    X1,
    /// Two-way interleave.
    X2,
    /// Three-way interleave.
    X3,
    /// Four-way interleave.
    X4,
    /// Six-way interleave.
    X6,
}

impl InterleaveWays {
    /// Maps a member count onto a legal interleave way.
    ///
    /// # Errors
    ///
    /// [`BadRequest::AppDirectSettings`] when no legal way exists for the
    /// count (e.g. five DIMMs).
    pub fn from_member_count(count: usize) -> Result<Self, BadRequest> {
        match count {
            1 => Ok(Self::X1),
            2 => Ok(Self::X2),
            3 => Ok(Self::X3),
            4 => Ok(Self::X4),
            6 => Ok(Self::X6),
            _ => Err(BadRequest::AppDirectSettings { member_count: count }),
        }
    }

    /// The member count as a number.
    #[must_use]
    pub fn count(self) -> usize {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X3 => 3,
            Self::X4 => 4,
            Self::X6 => 6,
        }
    }
}

/// Interleave parameters of one App-Direct set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveSettings {
    /// Interleave ways.
    pub ways: InterleaveWays,
    /// Channel interleave size in bytes.
    pub channel_size: u64,
    /// Memory-controller interleave size in bytes.
    pub imc_size: u64,
    /// Member DIMMs, in lay order.
    pub members: Vec<DimmUid>,
}

impl InterleaveSettings {
    /// True if a set with `self` can absorb capacity intended for `other`.
    ///
    /// Ways must agree; for anything wider than x1 the interleave sizes and
    /// member lists must match too.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.ways == other.ways
            && (self.ways == InterleaveWays::X1
                || (self.channel_size == other.channel_size
                    && self.imc_size == other.imc_size
                    && self.members == other.members))
    }
}

/// One App-Direct interleave-set slot of a DIMM goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirectGoal {
    /// Capacity this DIMM contributes to the set, in GiB.
    pub size_gib: u64,
    /// Platform-unique interleave set id.
    pub set_id: u16,
    /// Interleave parameters shared by every member of the set.
    pub settings: InterleaveSettings,
}

/// The capacity partition computed for a single DIMM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimmGoal {
    /// Memory-Mode capacity in GiB.
    pub memory_size_gib: u64,
    /// App-Direct interleave set memberships, at most two per DIMM.
    pub app_direct: SmallVec<[AppDirectGoal; MAX_APP_DIRECT_SLOTS]>,
    /// Block storage capacity in GiB.
    pub storage_size_gib: u64,
}

impl DimmGoal {
    /// Total App-Direct GiB across both slots.
    #[must_use]
    pub fn app_direct_gib(&self) -> u64 {
        self.app_direct.iter().map(|set| set.size_gib).sum()
    }

    /// Bytes of the DIMM not yet claimed by any capacity type.
    ///
    /// The Memory-Mode partition consumes metadata, so carving it rounds the
    /// remainder down to a whole GiB.
    #[must_use]
    pub fn unallocated_bytes(&self, dimm_capacity: u64) -> u64 {
        let mut remaining = dimm_capacity;
        if self.memory_size_gib > 0 {
            remaining = remaining.saturating_sub(gib_to_bytes(self.memory_size_gib));
            remaining = round_down(remaining, BYTES_PER_GIB);
        }
        remaining = remaining.saturating_sub(gib_to_bytes(self.app_direct_gib()));
        remaining.saturating_sub(gib_to_bytes(self.storage_size_gib))
    }

    /// Unclaimed bytes rounded down to a whole GiB.
    #[must_use]
    pub fn unallocated_gib_aligned_bytes(&self, dimm_capacity: u64) -> u64 {
        round_down(self.unallocated_bytes(dimm_capacity), BYTES_PER_GIB)
    }

    /// Unclaimed bytes available for another App-Direct set, zero once both
    /// slots are occupied.
    #[must_use]
    pub fn unallocated_app_direct_bytes(&self, dimm_capacity: u64) -> u64 {
        if self.app_direct.len() >= MAX_APP_DIRECT_SLOTS {
            0
        } else {
            self.unallocated_bytes(dimm_capacity)
        }
    }
}

/// Advisory warnings attached to a successful layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutWarning {
    /// Achieved capacity deviates from the request by more than 10%.
    GoalAdjustedMoreThan10Percent,
    /// DIMM population is asymmetric; performance will be non-optimal.
    NonOptimalPopulation,
}

/// The complete layout computed for one request.
///
/// Created empty, threaded through the step pipeline, returned complete. It
/// has no independent persistence; whoever calls the engine owns writing it
/// to hardware configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryAllocationLayout {
    /// Total Memory-Mode capacity laid out, in GiB.
    pub memory_capacity: u64,
    /// App-Direct capacity laid out per extent, in GiB, in extent order.
    pub app_direct_capacities: Vec<u64>,
    /// Total storage capacity, in GiB.
    pub storage_capacity: u64,
    /// Per-DIMM goals, keyed by uid.
    pub goals: FxHashMap<DimmUid, DimmGoal>,
    /// The DIMM excluded from the general interleave pool, if any.
    pub reserved_dimm_uid: Option<DimmUid>,
    /// Advisory warnings, in the order the pipeline raised them.
    pub warnings: Vec<LayoutWarning>,
}

impl MemoryAllocationLayout {
    /// An empty layout with a zeroed goal for every DIMM in the request.
    #[must_use]
    pub fn for_request(request: &MemoryAllocationRequest) -> Self {
        let mut layout = Self::default();
        for dimm in &request.dimms {
            layout.goals.insert(dimm.uid.clone(), DimmGoal::default());
        }
        layout
    }

    /// The goal record for `uid`; zeroed default if the DIMM is unknown.
    #[must_use]
    pub fn goal(&self, uid: &DimmUid) -> DimmGoal {
        self.goals.get(uid).cloned().unwrap_or_default()
    }

    /// Mutable goal record for `uid`, created on first touch.
    pub fn goal_mut(&mut self, uid: &DimmUid) -> &mut DimmGoal {
        self.goals.entry(uid.clone()).or_default()
    }

    /// Appends `warning` unless it is already present.
    pub fn push_warning(&mut self, warning: LayoutWarning) {
        if !self.warnings.contains(&warning) {
            tracing::warn!(?warning, "layout warning");
            self.warnings.push(warning);
        }
    }

    /// Next unique interleave set id.
    ///
    /// One above the highest of the platform baseline and every id already
    /// assigned in this layout.
    #[must_use]
    pub fn next_interleave_set_id(&self, platform_baseline: u16) -> u16 {
        let laid_max = self
            .goals
            .values()
            .flat_map(|goal| goal.app_direct.iter())
            .map(|set| set.set_id)
            .max()
            .unwrap_or(0);
        laid_max.max(platform_baseline) + 1
    }

    /// Total App-Direct GiB across every goal, the reserved DIMM included.
    #[must_use]
    pub fn total_app_direct_gib(&self) -> u64 {
        self.goals.values().map(DimmGoal::app_direct_gib).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimm::test_dimm;

    fn x1_settings(uid: &str) -> InterleaveSettings {
        InterleaveSettings {
            ways: InterleaveWays::X1,
            channel_size: 4096,
            imc_size: 4096,
            members: vec![DimmUid::from(uid)],
        }
    }

    #[test]
    fn unallocated_subtracts_every_capacity_type() {
        let dimm = test_dimm("a", 0, 0, 0, 128);
        let mut goal = DimmGoal {
            memory_size_gib: 32,
            ..DimmGoal::default()
        };
        goal.app_direct.push(AppDirectGoal {
            size_gib: 64,
            set_id: 1,
            settings: x1_settings("a"),
        });
        goal.storage_size_gib = 16;
        assert_eq!(goal.unallocated_bytes(dimm.capacity), 16 * BYTES_PER_GIB);
    }

    #[test]
    fn full_app_direct_slots_leave_no_app_direct_capacity() {
        let dimm = test_dimm("a", 0, 0, 0, 128);
        let mut goal = DimmGoal::default();
        for set_id in 1..=2 {
            goal.app_direct.push(AppDirectGoal {
                size_gib: 16,
                set_id,
                settings: x1_settings("a"),
            });
        }
        assert!(goal.unallocated_bytes(dimm.capacity) > 0);
        assert_eq!(goal.unallocated_app_direct_bytes(dimm.capacity), 0);
    }

    #[test]
    fn set_ids_respect_platform_baseline() {
        let mut layout = MemoryAllocationLayout::default();
        assert_eq!(layout.next_interleave_set_id(0), 1);
        assert_eq!(layout.next_interleave_set_id(7), 8);

        layout.goal_mut(&DimmUid::from("a")).app_direct.push(AppDirectGoal {
            size_gib: 4,
            set_id: 9,
            settings: x1_settings("a"),
        });
        assert_eq!(layout.next_interleave_set_id(7), 10);
    }

    #[test]
    fn duplicate_warnings_collapse() {
        let mut layout = MemoryAllocationLayout::default();
        layout.push_warning(LayoutWarning::NonOptimalPopulation);
        layout.push_warning(LayoutWarning::NonOptimalPopulation);
        assert_eq!(layout.warnings.len(), 1);
    }

    #[test]
    fn x1_settings_match_ignores_members() {
        let a = x1_settings("a");
        let b = x1_settings("b");
        assert!(a.matches(&b));

        let wide_a = InterleaveSettings {
            ways: InterleaveWays::X2,
            ..x1_settings("a")
        };
        let wide_b = InterleaveSettings {
            ways: InterleaveWays::X2,
            ..x1_settings("b")
        };
        assert!(!wide_a.matches(&wide_b));
    }
}
