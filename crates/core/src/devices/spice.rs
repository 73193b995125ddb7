//! Spice remote display.
//!
//! Besides the `-spice` server itself, a display brings a virtio-serial port wired to
//! the `vdagent` channel so the guest agent can reach the client.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, or_default};
use crate::common::{AllocationError, ValidationError};
use crate::config::defaults;

const KIND: &str = "SpiceDevice";

/// Guest-visible name of the agent port.
pub const SPICE_PORT_NAME: &str = "com.redhat.spice.0";
/// Character device carrying the agent channel.
pub const SPICE_CHARDEV_ID: &str = "spicechannel0";

/// A Spice display server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpiceDevice {
    /// Display identifier.
    pub id: String,
    /// Plain-text port.
    pub port: String,
    /// Listen address; loopback when empty.
    pub host_address: String,
    /// TLS port.
    pub tls_port: String,
    /// Allows clients to connect without a password.
    pub disable_ticketing: bool,
}

impl Device for SpiceDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match (self.port.is_empty(), self.tls_port.is_empty()) {
            (true, true) => Err(ValidationError::OneRequired {
                kind: KIND,
                first: "port",
                second: "tls-port",
            }),
            (false, false) => Err(ValidationError::Exclusive {
                kind: KIND,
                first: "port",
                second: "tls-port",
            }),
            _ => Ok(()),
        }
    }

    fn render(&self, _ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let mut server = Vec::new();
        if !self.port.is_empty() {
            server.push(format!("port={}", self.port));
        }
        if !self.tls_port.is_empty() {
            server.push(format!("tls-port={}", self.tls_port));
        }
        server.push(format!(
            "addr={}",
            or_default(&self.host_address, defaults::SPICE_ADDR)
        ));
        if self.disable_ticketing {
            server.push("disable-ticketing=on".to_string());
        }

        let mut tokens: Vec<String> = flag("-spice", &server).into();
        tokens.push("-device".to_string());
        tokens.push(format!("{}-pci", drivers::VIRTIO_SERIAL));
        tokens.extend(flag(
            "-device",
            &[
                drivers::VIRTSERIALPORT.to_string(),
                format!("chardev={SPICE_CHARDEV_ID}"),
                format!("name={SPICE_PORT_NAME}"),
            ],
        ));
        tokens.extend(flag(
            "-chardev",
            &[
                "spicevmc".to_string(),
                format!("id={SPICE_CHARDEV_ID}"),
                "name=vdagent".to_string(),
            ],
        ));
        Ok(tokens)
    }
}
