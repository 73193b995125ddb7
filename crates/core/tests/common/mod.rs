//! Shared fixtures, mocks, and harness helpers for the assembler tests.

/// `mockall` doubles of the injected collaborators.
pub mod mocks;
