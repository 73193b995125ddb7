//! QEMU command-line assembly library.
//!
//! This crate turns a declarative virtual machine description into the exact, ordered
//! argument vector of a hypervisor invocation, with the following:
//! 1. **Config:** The `Config` aggregate and its JSON persistence.
//! 2. **Devices:** A closed catalogue of device kinds, each validating and rendering itself.
//! 3. **Bus:** The root PCI slot allocator and per-category index registry.
//! 4. **Transport:** PCI / channel I/O / MMIO selection from host architecture and machine type.
//! 5. **Builder:** The validate, normalize, render pipeline over a fixed stage order.
//! 6. **Sockets:** Collection of the host socket paths a configuration creates.
//!
//! Assembly never launches anything; the caller gets tokens and a descriptor table.
//!
//! ```
//! use qcmd_core::{Assembler, BuildOptions, Config, HostArch, NullLogger};
//!
//! let config = Config::from_json(r#"{
//!     "machine": { "type": "q35" },
//!     "memory": { "size": "2048" },
//!     "smp": { "cpus": 2 }
//! }"#).unwrap();
//! let options = BuildOptions { arch: HostArch::X86_64, ..BuildOptions::default() };
//! let invocation = Assembler::new(options).build(&config, &NullLogger).unwrap();
//! assert_eq!(invocation.args, ["-machine", "q35", "-m", "2048", "-smp", "2"]);
//! ```

/// Assembly pipeline, per-run context, stages, and logging.
pub mod builder;
/// Slot allocator and index registry.
pub mod bus;
/// Errors and host architecture.
pub mod common;
/// Virtual machine description.
pub mod config;
/// Device catalogue.
pub mod devices;
/// Socket path collection.
pub mod sockets;
/// Virtio transport selection.
pub mod transport;

/// Pipeline entry points; construct an `Assembler` with `BuildOptions` or call `assemble`.
pub use crate::builder::{
    Assembler, BuildOptions, Invocation, Logger, NullLogger, Stage, TracingLogger, assemble,
};
/// Collision handling for explicit bus addresses.
pub use crate::bus::CollisionPolicy;
/// Error types and the crate-wide result alias.
pub use crate::common::{
    AllocationError, BuildError, FirmwareError, HostArch, Result, ValidationError,
    ValidationErrors,
};
/// Root configuration type; load from JSON or build with `Config::default()`.
pub use crate::config::Config;
/// Socket path collection.
pub use crate::sockets::socket_paths;
/// Virtio bus family.
pub use crate::transport::Transport;
