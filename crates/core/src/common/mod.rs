//! Common types shared by every part of the assembler.
//!
//! This module provides:
//! 1. **Errors:** Validation, allocation, firmware, and top-level build errors.
//! 2. **Host architecture:** The `HostArch` enum that drives context-dependent defaults.

/// Host architecture enum and machine-type helpers.
pub mod arch;
/// Validation, allocation, and build error types.
pub mod error;

pub use arch::{HostArch, MICROVM, ParseArchError};
pub use error::{
    AllocationError, BuildError, FirmwareError, Result, ValidationError, ValidationErrors,
};
