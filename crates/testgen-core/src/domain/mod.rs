//! Domain model: module lifecycle, coverage snapshots, attempts, errors.

pub mod attempt;
pub mod coverage;
pub mod digest;
pub mod error;
pub mod module;

pub use attempt::{GenerationAttempt, RejectReason, ValidationResult};
pub use coverage::{CoverageReport, Region, RegionKind};
pub use digest::{content_digest, file_digest};
pub use error::{Result, TestgenError};
pub use module::{ChangeRecord, ModuleEntry, ModuleState};
