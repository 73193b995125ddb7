//! Block devices.
//!
//! A block device renders as a `-drive` backend plus, unless it is drive-only, a
//! `-device` frontend. Virtio disks on the PCI transport take a root bus slot; SCSI and
//! IDE disks attach to a controller that has already been emitted.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, check_boot_index, flag, or_default, require};
use crate::common::{AllocationError, ValidationError};
use crate::config::defaults;
use crate::transport::Transport;

const KIND: &str = "BlockDevice";

/// Asynchronous I/O engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aio {
    /// Thread pool.
    Threads,
    /// Linux native AIO.
    Native,
    /// Linux `io_uring`.
    IoUring,
}

/// Host page-cache behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Write-through host cache.
    Writethrough,
    /// Write-back host cache.
    Writeback,
    /// Bypass the host cache.
    None,
    /// Bypass the host cache and flush every write.
    Directsync,
    /// Ignore flush requests.
    Unsafe,
}

/// Handling of guest discard requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscardMode {
    /// Drop discard requests.
    Ignore,
    /// Pass discards through to the image.
    Unmap,
}

/// Zero-write detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectZeroes {
    /// Detect and convert to zero writes.
    On,
    /// No detection.
    Off,
    /// Detect and unmap where possible.
    Unmap,
}

macro_rules! keyword {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Keyword used on the command line.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

keyword!(Aio { Threads => "threads", Native => "native", IoUring => "io_uring" });
keyword!(CacheMode {
    Writethrough => "writethrough",
    Writeback => "writeback",
    None => "none",
    Directsync => "directsync",
    Unsafe => "unsafe",
});
keyword!(DiscardMode { Ignore => "ignore", Unmap => "unmap" });
keyword!(DetectZeroes { On => "on", Off => "off", Unmap => "unmap" });

/// A disk, CD-ROM, or flash image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BlockDevice {
    /// Frontend driver, e.g. `virtio-blk`, `scsi-hd`, `ide-cd`.
    pub driver: String,
    /// Drive identifier, referenced by the frontend.
    pub id: String,
    /// Image path.
    pub file: String,
    /// Drive interface, `none` for a separate frontend.
    pub interface: String,
    /// I/O engine.
    pub aio: Option<Aio>,
    /// Image format, e.g. `qcow2` or `raw`.
    pub format: String,
    /// Keeps SCSI passthrough commands enabled.
    pub scsi: bool,
    /// Keeps the guest-visible write cache enabled (virtio only).
    pub write_cache: bool,
    /// Boot order: `auto` or an explicit index.
    #[serde(rename = "bootindex")]
    pub boot_index: Option<String>,
    /// Media hint, e.g. `cdrom`.
    pub media: String,
    /// Logical and physical block size in bytes.
    pub block_size: u32,
    /// Reported rotation rate; not allowed on virtio drivers.
    pub rotation_rate: u32,
    /// Requested slot for virtio disks on PCI; automatic when empty.
    pub bus_addr: String,
    /// Parent bus or controller bus.
    pub bus: String,
    /// Disk serial; the drive id when empty.
    pub serial: String,
    /// Host cache mode.
    pub cache: Option<CacheMode>,
    /// Forces legacy-only virtio on PCI.
    pub disable_modern: bool,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Allows other processes to share the image.
    pub share_rw: bool,
    /// Opens the image read-only.
    pub read_only: bool,
    /// Transport override.
    pub transport: Option<Transport>,
    /// Discard handling.
    pub discard: Option<DiscardMode>,
    /// Zero-write detection.
    pub detect_zeroes: Option<DetectZeroes>,
    /// Emits only the `-drive` backend.
    pub drive_only: bool,
}

impl BlockDevice {
    fn is_virtio(&self) -> bool {
        self.driver.starts_with("virtio")
    }

    fn drive_params(&self) -> Vec<String> {
        let mut params = vec![
            format!("file={}", self.file),
            format!("id={}", self.id),
            format!("if={}", self.interface),
            format!("format={}", self.format),
        ];
        if let Some(aio) = self.aio {
            params.push(format!("aio={}", aio.as_str()));
        }
        if let Some(cache) = self.cache {
            params.push(format!("cache={}", cache.as_str()));
        }
        if let Some(discard) = self.discard {
            params.push(format!("discard={}", discard.as_str()));
        }
        if let Some(detect) = self.detect_zeroes {
            params.push(format!("detect-zeroes={}", detect.as_str()));
        }
        if !self.media.is_empty() {
            params.push(format!("media={}", self.media));
        }
        if self.read_only {
            params.push("readonly=on".to_string());
        }
        params
    }
}

impl Device for BlockDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(KIND, "id", &self.id)?;
        require(KIND, "driver", &self.driver)?;
        require(KIND, "file", &self.file)?;
        require(KIND, "interface", &self.interface)?;
        require(KIND, "format", &self.format)?;
        if self.rotation_rate > 0 && self.is_virtio() {
            return Err(ValidationError::Unsupported {
                kind: KIND,
                detail: format!(
                    "'{}' cannot set rotation-rate on driver '{}'",
                    self.id, self.driver
                ),
            });
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
        let mut tokens: Vec<String> = flag("-drive", &self.drive_params()).into();
        if self.drive_only {
            return Ok(tokens);
        }

        let transport = ctx.transport();
        let virtio_blk = self.driver == drivers::VIRTIO_BLOCK;
        let name = if virtio_blk {
            transport.device_name(drivers::VIRTIO_BLOCK)
        } else {
            self.driver.clone()
        };
        let mut params = vec![
            name,
            format!("drive={}", self.id),
            format!("serial={}", or_default(&self.serial, &self.id)),
        ];
        if let Some(index) = ctx.resolve_boot_index(self.boot_index.as_deref())? {
            params.push(format!("bootindex={index}"));
        }
        if virtio_blk {
            params.extend(transport.disable_modern(self.disable_modern).map(String::from));
            if transport.is_pci() {
                let slot = ctx.allocate_slot(&self.bus_addr)?;
                params.push(format!("addr=0x{slot:02x}"));
                params.push(format!("bus={}", or_default(&self.bus, defaults::PCIE_BUS)));
            }
        }
        if self.driver == drivers::SCSI_HD && !self.bus.is_empty() {
            params.push(format!("bus={}", self.bus));
        }
        if self.driver == drivers::IDE_CD {
            params.push(format!("bus={}", or_default(&self.bus, defaults::IDE_BUS)));
        }
        if self.rotation_rate > 0 && !self.is_virtio() {
            params.push(format!("rotation_rate={}", self.rotation_rate));
        }
        if self.block_size > 0 {
            params.push(format!("logical_block_size={}", self.block_size));
            params.push(format!("physical_block_size={}", self.block_size));
        }
        if !self.scsi && self.driver != drivers::IDE_CD {
            params.push("scsi=off".to_string());
        }
        if !self.write_cache && virtio_blk {
            params.push("config-wce=off".to_string());
        }
        if transport.is_pci() && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        if transport.is_ccw() {
            params.push(format!("devno={}", self.devno));
        }
        if self.share_rw {
            params.push("share-rw=on".to_string());
        }
        tokens.extend(flag("-device", &params));
        Ok(tokens)
    }
}
