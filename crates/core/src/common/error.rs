//! Error types for configuration loading, validation, and resource allocation.
//!
//! This module defines every failure an assembly run can report. It provides:
//! 1. **Validation:** `ValidationError`, one structured variant per malformed-input shape.
//! 2. **Aggregation:** `ValidationErrors`, the all-problems-at-once list that aborts a run.
//! 3. **Allocation:** `AllocationError` for slot exhaustion, slot collisions, and index reuse.
//! 4. **Top level:** `BuildError`, the error returned by the assembler and config loader.
//! 5. **Firmware:** `FirmwareError` for UEFI image discovery on the host.

use std::fmt;
use std::path::{Path, PathBuf};

/// A single malformed, missing, or conflicting setting.
///
/// `kind` is the name of the configuration element that failed (for example
/// `"BlockDevice"` or `"Machine"`); it is always a static label so errors stay
/// cheap to build and easy to match in tests.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is empty or unset.
    #[error("{kind} is missing required field `{field}`")]
    Missing {
        /// Element that failed validation.
        kind: &'static str,
        /// Name of the empty field.
        field: &'static str,
    },

    /// Two fields that cannot be combined are both set.
    #[error("{kind} fields `{first}` and `{second}` are mutually exclusive")]
    Exclusive {
        /// Element that failed validation.
        kind: &'static str,
        /// First conflicting field.
        first: &'static str,
        /// Second conflicting field.
        second: &'static str,
    },

    /// Neither of two alternative fields is set.
    #[error("{kind} requires either `{first}` or `{second}` to be set")]
    OneRequired {
        /// Element that failed validation.
        kind: &'static str,
        /// First alternative.
        first: &'static str,
        /// Second alternative.
        second: &'static str,
    },

    /// A field holds a value outside its accepted set or format.
    #[error("{kind} field `{field}` has invalid value '{value}', expected {expected}")]
    InvalidValue {
        /// Element that failed validation.
        kind: &'static str,
        /// Offending field.
        field: &'static str,
        /// Value found in the configuration.
        value: String,
        /// Human-readable description of what is accepted.
        expected: &'static str,
    },

    /// A combination the hypervisor cannot express.
    #[error("{kind} {detail}")]
    Unsupported {
        /// Element that failed validation.
        kind: &'static str,
        /// Explanation of the unsupported combination.
        detail: String,
    },

    /// Two elements of the same category share an explicit identifier.
    #[error("{kind} identifier '{id}' is used more than once")]
    DuplicateId {
        /// Category in which the duplicate was found.
        kind: &'static str,
        /// The repeated identifier.
        id: String,
    },

    /// The CPU topology asks for fewer hot-pluggable CPUs than boot CPUs.
    #[error("MaxCPUs {max_cpus} must be equal to or greater than CPUs {cpus}")]
    MaxCpus {
        /// Requested maximum CPU count.
        max_cpus: u32,
        /// Requested boot CPU count.
        cpus: u32,
    },
}

/// Every validation problem found during one assembly pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Creates an empty accumulator.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Records one problem.
    pub fn push(&mut self, err: ValidationError) {
        self.0.push(err);
    }

    /// Records the error of `result`, if any.
    pub fn check(&mut self, result: Result<(), ValidationError>) {
        if let Err(err) = result {
            self.push(err);
        }
    }

    /// Returns `true` when no problem has been recorded.
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded problems.
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the recorded problems in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Returns `Ok(())` when empty, otherwise the aggregated `BuildError`.
    pub fn into_result(self) -> Result<(), BuildError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Invalid(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid setting(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Failure to place a device on the bus or to record an index.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// Every automatically assignable slot is taken.
    #[error("no free PCI slot left (searched 0x{last:02x} down to 0x{first:02x})")]
    Exhausted {
        /// Lowest slot the search considers.
        first: usize,
        /// Highest slot the search considers.
        last: usize,
    },

    /// An explicitly requested slot is already occupied.
    #[error("PCI slot 0x{slot:02x} is already allocated")]
    Collision {
        /// The occupied slot.
        slot: usize,
    },

    /// A slot number beyond the end of the bus.
    #[error("PCI slot {slot} is out of range")]
    OutOfRange {
        /// The rejected slot.
        slot: usize,
    },

    /// An explicit index has already been recorded for a category.
    #[error("{category} index {index} already set")]
    IndexTaken {
        /// Registry category (for example `bootindex`).
        category: String,
        /// The repeated index.
        index: u32,
    },

    /// The registry was asked about the empty category name.
    #[error("invalid empty index category")]
    EmptyCategory,
}

/// Top-level error of configuration loading and command-line assembly.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// One or more settings failed validation; no tokens were produced.
    #[error("{0}")]
    Invalid(ValidationErrors),

    /// Bus or index allocation failed while rendering.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// The persisted configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The persisted configuration could not be read or written.
    #[error("failed to access configuration '{}': {source}", path.display())]
    ConfigIo {
        /// File that was being accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

impl BuildError {
    /// Returns the validation problems if this is an aggregated validation failure.
    pub const fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Failure to locate UEFI firmware images on the host.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FirmwareError {
    /// One or both images of a code/vars pair do not exist.
    #[error("firmware images not found: {}", join_paths(missing))]
    MissingFiles {
        /// Paths that were checked and are absent.
        missing: Vec<PathBuf>,
    },

    /// No candidate pair exists under the firmware directory.
    #[error("{prefix}VMF code and vars missing, check {}", base.display())]
    NotFound {
        /// Architecture prefix (`O` or `AA`).
        prefix: &'static str,
        /// Directory that was searched.
        base: PathBuf,
    },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", Path::display(p)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
