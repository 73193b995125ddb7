//! Trusted platform module.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, one_of, require};
use crate::common::{AllocationError, HostArch, ValidationError};

const KIND: &str = "TPMDevice";

/// TPM backed by an external emulator such as swtpm.
pub const TPM_EMULATOR: &str = "emulator";
/// TPM passed through from the host.
pub const TPM_PASSTHROUGH: &str = "passthrough";

/// A TPM backend with its character device and frontend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TpmDevice {
    /// Backend identifier; the chardev is named `chr<id>`.
    pub id: String,
    /// Frontend driver, `tpm-tis` or `tpm-crb`.
    pub driver: String,
    /// Backend type, `emulator` or `passthrough`.
    #[serde(rename = "type")]
    pub tpm_type: String,
    /// Control socket of the emulator.
    pub path: String,
}

impl TpmDevice {
    fn device_name(&self, arch: HostArch) -> String {
        if self.driver == drivers::TPM_TIS && arch == HostArch::Aarch64 {
            format!("{}-device", self.driver)
        } else {
            self.driver.clone()
        }
    }
}

impl Device for TpmDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(KIND, "id", &self.id)?;
        require(KIND, "driver", &self.driver)?;
        require(KIND, "path", &self.path)?;
        require(KIND, "type", &self.tpm_type)?;
        one_of(
            KIND,
            "type",
            &self.tpm_type,
            &[TPM_EMULATOR, TPM_PASSTHROUGH],
            "'emulator' or 'passthrough'",
        )
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let chardev = format!("chr{}", self.id);
        let mut tokens: Vec<String> = flag(
            "-chardev",
            &[
                "socket".to_string(),
                format!("id={chardev}"),
                format!("path={}", self.path),
            ],
        )
        .into();
        tokens.extend(flag(
            "-tpmdev",
            &[
                self.tpm_type.clone(),
                format!("id={}", self.id),
                format!("chardev={chardev}"),
            ],
        ));
        tokens.extend(flag(
            "-device",
            &[self.device_name(ctx.arch()), format!("tpmdev={}", self.id)],
        ));
        Ok(tokens)
    }
}
