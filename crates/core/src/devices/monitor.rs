//! Human monitor endpoint.

use serde::{Deserialize, Serialize};

use super::chardev::CharBackend;
use super::serial::{endpoint, validate_endpoint};
use super::traits::{Device, DeviceContext};
use crate::common::{AllocationError, ValidationError};

/// A `-monitor` endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MonitorDevice {
    /// Plain endpoint name, e.g. `stdio`.
    pub name: String,
    /// Existing character device to connect to.
    pub chardev_id: String,
    /// Host backend; only `socket` is accepted.
    pub backend: Option<CharBackend>,
    /// Socket path.
    pub path: String,
}

impl Device for MonitorDevice {
    fn kind(&self) -> &'static str {
        "MonitorDevice"
    }

    fn id(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_endpoint(
            self.kind(),
            &self.name,
            &self.chardev_id,
            self.backend,
            &self.path,
        )
    }

    fn render(&self, _ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        Ok(vec![
            "-monitor".to_string(),
            endpoint(&self.name, &self.chardev_id, self.backend, &self.path),
        ])
    }
}
