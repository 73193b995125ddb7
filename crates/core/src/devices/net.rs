//! Network devices.
//!
//! A network device renders as a `-netdev` backend and a `-device` frontend. Tap
//! backends may be handed pre-opened descriptors instead of an interface name; those
//! go into the run's descriptor table and enable multi-queue on the frontend.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, check_boot_index, flag, require};
use crate::common::{AllocationError, ValidationError};
use crate::transport::Transport;

const KIND: &str = "NetDevice";

/// Rendering of a port rule whose fields are all unset.
pub const EMPTY_PORT_RULE: &str = "::0-:0";

/// Network backend type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetType {
    /// User-mode (SLIRP) networking.
    #[default]
    User,
    /// Multicast socket.
    Mcastsocket,
    /// Host tap interface.
    Tap,
    /// Macvtap interface; only usable through pre-opened descriptors.
    Macvtap,
    /// Ipvtap interface.
    Ipvtap,
    /// Veth pair behind a tap.
    Vethtap,
    /// Directly assigned PCI function.
    Vfio,
    /// vhost-user socket.
    Vhostuser,
}

impl NetType {
    /// Returns whether this backend can be rendered.
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::User | Self::Mcastsocket | Self::Tap | Self::Macvtap)
    }

    /// Keyword of the `-netdev` backend.
    pub const fn netdev_keyword(self) -> Option<&'static str> {
        match self {
            Self::User => Some("user"),
            Self::Mcastsocket => Some("socket"),
            Self::Tap | Self::Macvtap | Self::Ipvtap | Self::Vethtap => Some("tap"),
            Self::Vfio | Self::Vhostuser => None,
        }
    }

    /// Configuration name of the type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Mcastsocket => "mcastsocket",
            Self::Tap => "tap",
            Self::Macvtap => "macvtap",
            Self::Ipvtap => "ipvtap",
            Self::Vethtap => "vethtap",
            Self::Vfio => "vfio",
            Self::Vhostuser => "vhostuser",
        }
    }
}

/// Tap backend settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetTap {
    /// Host interface name.
    pub ifname: String,
    /// Deconfiguration script.
    #[serde(rename = "downscript-file")]
    pub downscript: String,
    /// Configuration script.
    #[serde(rename = "upscript-file")]
    pub script: String,
}

/// One side of a forwarding rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    /// Address; empty means any.
    pub address: String,
    /// Port number.
    pub port: u16,
}

/// A user-mode host-to-guest forwarding rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PortRule {
    /// `tcp` or `udp`.
    pub protocol: String,
    /// Host side.
    pub host_port: Port,
    /// Guest side.
    pub guest_port: Port,
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.protocol,
            self.host_port.address,
            self.host_port.port,
            self.guest_port.address,
            self.guest_port.port
        )
    }
}

/// User-mode backend settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetUser {
    /// Enables IPv4.
    #[serde(rename = "ipv4-enable")]
    pub ipv4: bool,
    /// Guest network, e.g. `10.0.2.0/24`.
    #[serde(rename = "ipv4-network-address")]
    pub ipv4_net_addr: String,
    /// Forwarding rules.
    #[serde(rename = "host-port-rules")]
    pub host_forward: Vec<PortRule>,
}

/// Multicast socket backend settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McastSocket {
    /// Multicast group address.
    pub address: String,
    /// Multicast port.
    pub port: String,
}

/// A guest network interface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetDevice {
    /// Backend type.
    #[serde(rename = "type")]
    pub net_type: NetType,
    /// Frontend driver, e.g. `virtio-net` or `e1000`.
    pub driver: String,
    /// Backend identifier.
    pub id: String,
    /// Parent bus of the frontend.
    pub bus: String,
    /// Requested slot; no slot is taken when empty.
    #[serde(rename = "address")]
    pub addr: String,
    /// Pre-opened tap queue descriptors.
    pub fds: Vec<i32>,
    /// Pre-opened vhost descriptors.
    pub vhost_fds: Vec<i32>,
    /// Enables in-kernel vhost.
    #[serde(rename = "vhost-enable")]
    pub vhost: bool,
    /// Guest MAC address.
    #[serde(rename = "macaddress")]
    pub mac_address: String,
    /// Forces legacy-only virtio on PCI.
    pub disable_modern: bool,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Transport override.
    pub transport: Option<Transport>,
    /// Tap backend settings.
    #[serde(rename = "tap-device")]
    pub tap: NetTap,
    /// User-mode backend settings.
    #[serde(rename = "user-device")]
    pub user: NetUser,
    /// Multicast backend settings.
    pub mcast_socket: McastSocket,
    /// Boot order: `auto` or an explicit index.
    #[serde(rename = "bootindex")]
    pub boot_index: Option<String>,
}

impl NetDevice {
    fn frontend_name(&self, transport: Transport) -> Option<String> {
        if self.driver == drivers::VIRTIO_NET {
            Some(transport.device_name(drivers::VIRTIO_NET))
        } else if self.driver.is_empty() {
            None
        } else {
            Some(self.driver.clone())
        }
    }

    fn netdev_params(&self, keyword: &str, ctx: &mut DeviceContext<'_>) -> Vec<String> {
        let mut params = vec![keyword.to_string(), format!("id={}", self.id)];
        if self.vhost {
            params.push("vhost=on".to_string());
            if !self.vhost_fds.is_empty() {
                params.push(format!("vhostfds={}", join_fds(&ctx.append_fds(&self.vhost_fds))));
            }
        }
        match self.net_type {
            NetType::Tap | NetType::Macvtap if !self.fds.is_empty() => {
                params.push(format!("fds={}", join_fds(&ctx.append_fds(&self.fds))));
            }
            NetType::Tap => {
                params.push(format!("ifname={}", self.tap.ifname));
                if !self.tap.downscript.is_empty() {
                    params.push(format!("downscript={}", self.tap.downscript));
                }
                if !self.tap.script.is_empty() {
                    params.push(format!("script={}", self.tap.script));
                }
            }
            NetType::User => {
                params.push(format!("ipv4={}", if self.user.ipv4 { "on" } else { "off" }));
                params.extend(
                    self.user
                        .host_forward
                        .iter()
                        .map(ToString::to_string)
                        .filter(|rule| rule != EMPTY_PORT_RULE)
                        .map(|rule| format!("hostfwd={rule}")),
                );
                if !self.user.ipv4_net_addr.is_empty() {
                    params.push(format!("net={}", self.user.ipv4_net_addr));
                }
            }
            NetType::Mcastsocket => {
                params.push(format!(
                    "mcast={}:{}",
                    self.mcast_socket.address, self.mcast_socket.port
                ));
            }
            _ => {}
        }
        params
    }

    fn device_params(
        &self,
        name: String,
        ctx: &mut DeviceContext<'_>,
    ) -> Result<Vec<String>, AllocationError> {
        let transport = ctx.transport();
        let virtio = name.starts_with("virtio");
        let mut params = vec![
            name,
            format!("netdev={}", self.id),
            format!("mac={}", self.mac_address),
        ];
        if !self.bus.is_empty() {
            params.push(format!("bus={}", self.bus));
        }
        if !self.addr.is_empty() {
            let slot = ctx.allocate_slot(&self.addr)?;
            params.push(format!("addr=0x{slot:02x}"));
        }
        if let Some(index) = ctx.resolve_boot_index(self.boot_index.as_deref())? {
            params.push(format!("bootindex={index}"));
        }
        if virtio {
            params.extend(transport.disable_modern(self.disable_modern).map(String::from));
        }
        if !self.fds.is_empty() {
            let mut mq = "mq=on".to_string();
            if transport.is_pci() {
                // one vector per tx and rx queue, plus config and control
                mq.push_str(&format!(",vectors={}", self.fds.len() * 2 + 2));
            }
            params.push(mq);
        }
        if transport.is_pci() && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        if transport.is_ccw() {
            params.extend(ctx.iommu_platform().map(String::from));
            params.push(format!("devno={}", self.devno));
        }
        Ok(params)
    }
}

fn join_fds(fds: &[u32]) -> String {
    fds.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(":")
}

impl Device for NetDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(KIND, "id", &self.id)?;
        if !self.net_type.is_supported() {
            return Err(ValidationError::InvalidValue {
                kind: KIND,
                field: "type",
                value: self.net_type.as_str().to_string(),
                expected: "one of user, mcastsocket, tap, macvtap",
            });
        }
        if self.net_type == NetType::Tap && self.fds.is_empty() {
            require(KIND, "tap-device.ifname", &self.tap.ifname)?;
        }
        if self.net_type == NetType::Mcastsocket {
            require(KIND, "mcast-socket.address", &self.mcast_socket.address)?;
            require(KIND, "mcast-socket.port", &self.mcast_socket.port)?;
        }
        check_boot_index(KIND, self.boot_index.as_deref())
    }

    fn transport_override(&self) -> Option<Transport> {
        self.transport
    }

    fn boot_index(&self) -> Option<&str> {
        self.boot_index.as_deref()
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        if self.net_type == NetType::Macvtap && self.fds.is_empty() {
            return Ok(Vec::new());
        }
        let mut tokens = Vec::new();
        if let Some(keyword) = self.net_type.netdev_keyword() {
            tokens.extend(flag("-netdev", &self.netdev_params(keyword, ctx)));
        }
        if let Some(name) = self.frontend_name(ctx.transport()) {
            tokens.extend(flag("-device", &self.device_params(name, ctx)?));
        }
        Ok(tokens)
    }
}
