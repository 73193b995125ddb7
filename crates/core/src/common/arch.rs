//! Host architecture identification.
//!
//! Several rendering decisions depend on the architecture the hypervisor runs on:
//! the default virtio transport, NUMA memory-backend support, TPM device naming,
//! and the UEFI firmware file prefix. The architecture is always passed in
//! explicitly so assemblies are reproducible on any build host.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Machine type that lacks NUMA and PCI; devices use MMIO transports on it.
pub const MICROVM: &str = "microvm";

/// Architecture of the host that will run the hypervisor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostArch {
    /// 64-bit x86 (`amd64`).
    #[default]
    X86_64,
    /// 32-bit x86 (`386`).
    X86,
    /// 64-bit ARM (`arm64`).
    Aarch64,
    /// IBM Z mainframe.
    S390x,
    /// Little-endian 64-bit POWER.
    Ppc64le,
    /// 64-bit RISC-V.
    Riscv64,
    /// Anything else; treated with the generic defaults.
    Other,
}

impl HostArch {
    /// Returns the architecture this binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => Self::X86_64,
            "x86" => Self::X86,
            "aarch64" => Self::Aarch64,
            "s390x" => Self::S390x,
            "powerpc64" if cfg!(target_endian = "little") => Self::Ppc64le,
            "riscv64" => Self::Riscv64,
            _ => Self::Other,
        }
    }

    /// Returns `true` for the two x86 flavours.
    pub const fn is_x86(self) -> bool {
        matches!(self, Self::X86_64 | Self::X86)
    }

    /// Returns whether guest memory can be attached as a NUMA node backend.
    ///
    /// # Arguments
    ///
    /// * `machine_type` - The configured machine type (for example `q35`).
    ///
    /// # Returns
    ///
    /// `true` on x86, ppc64le, and aarch64 hosts unless the machine is `microvm`.
    pub fn supports_dimm(self, machine_type: &str) -> bool {
        match self {
            Self::X86_64 | Self::X86 | Self::Ppc64le | Self::Aarch64 => machine_type != MICROVM,
            _ => false,
        }
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::X86 => "x86",
            Self::Aarch64 => "aarch64",
            Self::S390x => "s390x",
            Self::Ppc64le => "ppc64le",
            Self::Riscv64 => "riscv64",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for HostArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an architecture name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown host architecture '{0}'")]
pub struct ParseArchError(pub String);

impl FromStr for HostArch {
    type Err = ParseArchError;

    /// Accepts both Rust target names and Go-style names (`amd64`, `386`, `arm64`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "x86" | "386" | "i386" | "i686" => Ok(Self::X86),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "s390x" => Ok(Self::S390x),
            "ppc64le" | "powerpc64le" => Ok(Self::Ppc64le),
            "riscv64" => Ok(Self::Riscv64),
            "other" => Ok(Self::Other),
            other => Err(ParseArchError(other.to_string())),
        }
    }
}
