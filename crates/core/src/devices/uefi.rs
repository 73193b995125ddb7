//! UEFI firmware flash pair.
//!
//! The code image is mapped read-only and the variable store read-write, both as raw
//! pflash drives. `UefiFirmware::discover` locates a distribution-installed pair.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{Device, DeviceContext, require};
use crate::common::{AllocationError, FirmwareError, HostArch, ValidationError};

/// Directory under which distributions install `OVMF/` and `AAVMF/`.
pub const DEFAULT_FIRMWARE_ROOT: &str = "/usr/share";

const SECBOOT_SUFFIX: &str = ".secboot.fd";
const FOUR_MB: &str = "_4M";

/// (code variant, vars variant, x86_64 only)
const SECURE_CANDIDATES: [(&str, &str, bool); 4] = [
    ("_4M.secboot", "_4M.ms", true),
    ("_4M.secboot", "_4M.secboot", true),
    (".secboot", ".secboot", true),
    (".ms", ".ms", false),
];

const INSECURE_CANDIDATES: [(&str, &str, bool); 2] = [("_4M", "_4M", true), ("", "", false)];

/// A UEFI code image and its variable store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UefiFirmware {
    /// Read-only firmware code image.
    #[serde(rename = "uefi-code")]
    pub code: String,
    /// Writable variable store.
    #[serde(rename = "uefi-vars")]
    pub vars: String,
}

impl UefiFirmware {
    /// Creates a pair from explicit paths.
    pub fn new(code: impl Into<String>, vars: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            vars: vars.into(),
        }
    }

    /// File-name prefix of the firmware family for `arch`.
    pub const fn prefix(arch: HostArch) -> &'static str {
        match arch {
            HostArch::X86_64 => "O",
            HostArch::Aarch64 => "AA",
            _ => "",
        }
    }

    /// Returns `true` when the code image is a secure-boot build.
    pub fn is_secure_boot(&self) -> bool {
        self.code.ends_with(SECBOOT_SUFFIX)
    }

    /// Returns `true` for the 4 MiB flash layout.
    pub fn is_4mb(&self) -> bool {
        self.code.contains(FOUR_MB)
    }

    /// Checks that both images exist on the host.
    pub fn exists(&self) -> Result<(), FirmwareError> {
        let missing: Vec<PathBuf> = [&self.code, &self.vars]
            .into_iter()
            .map(PathBuf::from)
            .filter(|path| !path.is_file())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FirmwareError::MissingFiles { missing })
        }
    }

    /// Finds an installed firmware pair.
    ///
    /// Searches `<root>/<P>VMF/` where `P` is the family prefix of `arch`, trying
    /// candidates from most to least specific; the first pair whose images both
    /// exist wins.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding the firmware directories, usually `/usr/share`.
    /// * `arch` - Host architecture the guest will run on.
    /// * `secure_boot` - Whether a secure-boot build is required.
    ///
    /// # Errors
    ///
    /// `FirmwareError::NotFound` when no candidate pair is installed.
    pub fn discover(root: &Path, arch: HostArch, secure_boot: bool) -> Result<Self, FirmwareError> {
        let prefix = Self::prefix(arch);
        let base = root.join(format!("{prefix}VMF"));
        let candidates: &[(&str, &str, bool)] = if secure_boot {
            &SECURE_CANDIDATES
        } else {
            &INSECURE_CANDIDATES
        };

        for &(code, vars, x86_only) in candidates {
            if x86_only && arch != HostArch::X86_64 {
                continue;
            }
            let candidate = Self::new(
                base.join(format!("{prefix}VMF_CODE{code}.fd")).to_string_lossy(),
                base.join(format!("{prefix}VMF_VARS{vars}.fd")).to_string_lossy(),
            );
            match candidate.exists() {
                Ok(()) => return Ok(candidate),
                Err(err) => debug!(%err, "skipping firmware candidate"),
            }
        }
        Err(FirmwareError::NotFound { prefix, base })
    }
}

impl Device for UefiFirmware {
    fn kind(&self) -> &'static str {
        "UEFIFirmwareDevice"
    }

    fn id(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(self.kind(), "uefi-code", &self.code)?;
        require(self.kind(), "uefi-vars", &self.vars)
    }

    fn render(&self, _ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        Ok(vec![
            "-drive".to_string(),
            format!("if=pflash,format=raw,readonly=on,file={}", self.code),
            "-drive".to_string(),
            format!("if=pflash,format=raw,file={}", self.vars),
        ])
    }
}
