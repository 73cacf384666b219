//! # NVDIMM Allocation Engine
//!
//! Partitions the non-volatile DIMMs of a server into three capacity types --
//! Memory-Mode (volatile), App-Direct (persistent, optionally interleaved),
//! and Storage (block) -- and groups DIMMs into electrically valid interleave
//! sets.
//!
//! This crate provides:
//! - **Interleave matching**: the largest legal interleaved DIMM subset for a
//!   socket, driven by a priority-ordered pattern table
//! - **Reserve selection**: a heuristic chain that picks exactly one DIMM to
//!   set aside from the general interleave pool
//! - **Request validation**: ordered rules that keep a request consistent
//!   with the discovered DIMM inventory
//! - **Layout pipeline**: reserve -> memory -> app-direct -> storage ->
//!   deviation check, each step a pure `(request, layout) -> layout` function
//!
//! ## Design Principles
//!
//! 1. **One request in, one layout out** - no shared state between calls
//! 2. **No device I/O** - the caller supplies a locked inventory snapshot
//! 3. **Fail fast** - malformed requests abort before any capacity is laid
//! 4. **Advisory deviations never abort** - they surface as layout warnings
//!
//! ## Example
//!
//! ```rust,ignore
//! use nvdimm_alloc::{MemoryAllocator, PlatformConfig, RequestBuilder};
//!
//! let allocator = MemoryAllocator::new(inventory, PlatformConfig::default());
//! let request = RequestBuilder::new(dimms).memory_mode_percent(40).build()?;
//! let layout = allocator.layout(&request)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod allocator;
pub mod config;
pub mod dimm;
pub mod error;
pub mod layout;
pub mod request;
pub mod reserve;
pub mod rules;
pub mod steps;
pub mod topology;

// Re-export key types
pub use allocator::MemoryAllocator;
pub use config::PlatformConfig;
pub use dimm::{Dimm, DimmUid, DiscoveredDimm};
pub use error::BadRequest;
pub use layout::{LayoutWarning, MemoryAllocationLayout};
pub use request::{AppDirectExtent, MemoryAllocationRequest, RequestBuilder};

/// Result type for nvdimm-alloc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for nvdimm-alloc.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request validation or layout pipeline errors.
    #[error("bad request: {0}")]
    BadRequest(#[from] error::BadRequest),

    /// Interleave topology errors.
    #[error("topology error: {0}")]
    Topology(#[from] topology::TopologyError),

    /// Reserve DIMM selection errors.
    #[error("reserve selection error: {0}")]
    Selection(#[from] reserve::SelectionError),

    /// Percentage-based request construction errors.
    #[error("request error: {0}")]
    Request(#[from] request::RequestError),
}
