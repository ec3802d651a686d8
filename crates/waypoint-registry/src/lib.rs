//! The registry service that ties the workspace together.
//!
//! [`Registry`] wires a [`waypoint_store::LinkStore`] backend, a
//! [`waypoint_codegen::CodeGenerator`], the sliding-window rate limiter
//! and the lifecycle sweeper behind a single API: create, resolve,
//! search, export, delete and sweep.

pub mod allocator;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod service;

pub use allocator::{AllocationTier, Allocator, DEFAULT_TIERS};
pub use error::{RegistryError, Result};
pub use export::ExportFormat;
pub use lifecycle::{SweepPolicy, SweepReport, Sweeper};
pub use service::{
    CreateOutcome, CreateRequest, Registry, RegistrySettings, ResolveOutcome, SortKey,
    GLOBAL_IDENTITY,
};
