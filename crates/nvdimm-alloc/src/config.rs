//! Platform capability configuration.

use serde::{Deserialize, Serialize};

/// Platform capabilities and defaults supplied by the caller.
///
/// Carries what a firmware capability query would report: which provisioning
/// modes the platform supports, the recommended interleave sizes applied when
/// an extent does not specify its own, and the highest interleave set id
/// already in use on the platform (from existing pools and goals). The engine
/// performs no device I/O itself, so the caller owns keeping this snapshot
/// consistent with the hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// True if the platform can provision Memory-Mode capacity.
    pub memory_mode_supported: bool,
    /// True if the platform can provision App-Direct capacity.
    pub app_direct_supported: bool,
    /// Recommended channel interleave size in bytes.
    pub recommended_channel_interleave: u64,
    /// Recommended memory-controller interleave size in bytes.
    pub recommended_imc_interleave: u64,
    /// Highest interleave set id already assigned on the platform.
    ///
    /// New sets receive ids above this baseline so they stay unique across
    /// pre-existing pools and configuration goals.
    pub interleave_set_id_baseline: u16,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            memory_mode_supported: true,
            app_direct_supported: true,
            recommended_channel_interleave: 4096,
            recommended_imc_interleave: 4096,
            interleave_set_id_baseline: 0,
        }
    }
}
