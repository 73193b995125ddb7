//! Command-line assembly.
//!
//! An assembly run turns one [`Config`] into the ordered argument vector of a
//! hypervisor invocation. It proceeds in three phases:
//! 1. **Validate:** Every setting and device is checked and all problems are collected.
//!    Any problem aborts the run before a single token is produced.
//! 2. **Normalize:** Each device's transport is resolved once and explicit boot indices
//!    are reserved, so later `auto` requests cannot take them.
//! 3. **Render:** Stages are emitted in [`Stage::ORDER`]; devices in
//!    [`DeviceCategory::ORDER`]. Allocation failures abort the run.
//!
//! All mutable state lives in a [`BuildContext`] created for the run and dropped with
//! it, so independent runs never share allocations.

/// Per-run bus, registry, and descriptor state.
pub mod context;
/// Diagnostics sink.
pub mod logger;
/// Emission stages.
pub mod stage;

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

pub use context::{BuildContext, FIRST_CHILD_FD};
pub use logger::{LOG_TARGET, Logger, NullLogger, TracingLogger};
pub use stage::Stage;

use crate::bus::CollisionPolicy;
use crate::common::{AllocationError, HostArch, Result, ValidationError, ValidationErrors};
use crate::config::Config;
use crate::devices::{AUTO_BOOT_INDEX, Device, DeviceCategory, DeviceContext};
use crate::transport::Transport;

/// Host-side settings of an assembly run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    /// Architecture of the host that will run the hypervisor.
    pub arch: HostArch,
    /// Handling of explicit bus addresses that are already taken.
    pub policy: CollisionPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            arch: HostArch::current(),
            policy: CollisionPolicy::Strict,
        }
    }
}

/// A finished invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Argument vector, without the program name.
    pub args: Vec<String>,
    /// Host descriptors the process inherits; entry `i` is descriptor `3 + i` in the child.
    pub fds: Vec<i32>,
}

/// A device with its transport resolved.
struct Planned<'c> {
    device: &'c dyn Device,
    transport: Transport,
}

/// Turns configurations into invocations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Assembler {
    options: BuildOptions,
}

impl Assembler {
    /// Creates an assembler for one host setup.
    pub const fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Host-side settings in use.
    pub const fn options(&self) -> BuildOptions {
        self.options
    }

    /// Checks a configuration without rendering it.
    ///
    /// # Errors
    ///
    /// `BuildError::Invalid` listing every problem found.
    pub fn validate(&self, config: &Config) -> Result<()> {
        collect_problems(config).into_result()
    }

    /// Assembles a configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - The machine to assemble.
    /// * `logger` - Receives notices about skipped settings.
    ///
    /// # Returns
    ///
    /// The argument vector and the descriptors it expects to inherit.
    ///
    /// # Errors
    ///
    /// `BuildError::Invalid` with every validation problem, or `BuildError::Allocation`
    /// when the bus or an index namespace is exhausted or collides. No partial output is
    /// ever returned.
    pub fn build(&self, config: &Config, logger: &dyn Logger) -> Result<Invocation> {
        logger.info(&format!(
            "assembling '{}' for {} ({:?} collisions)",
            config.name, self.options.arch, self.options.policy
        ));
        self.validate(config)?;

        let mut ctx = BuildContext::new(
            self.options.arch,
            self.options.policy,
            &config.machine.machine_type,
        );
        let plan = normalize(config, &mut ctx)?;

        let mut args = Vec::new();
        for stage in Stage::ORDER {
            let before = args.len();
            render_stage(stage, config, &plan, &mut ctx, logger, &mut args)?;
            debug!(%stage, tokens = args.len() - before, "rendered stage");
        }

        logger.info(&format!("assembled {} arguments", args.len()));
        Ok(Invocation {
            args,
            fds: ctx.into_fds(),
        })
    }
}

/// Assembles `config` for the current host with strict collision handling.
///
/// # Errors
///
/// See [`Assembler::build`].
pub fn assemble(config: &Config, logger: &dyn Logger) -> Result<Vec<String>> {
    Assembler::default()
        .build(config, logger)
        .map(|invocation| invocation.args)
}

fn collect_problems(config: &Config) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    config.machine.validate(&mut errors);
    if let Some(spice) = &config.spice {
        errors.check(spice.validate());
    }
    if let Some(tpm) = &config.tpm {
        errors.check(tpm.validate());
    }
    config.smbios.validate(&mut errors);
    for qmp in &config.qmp_sockets {
        errors.check(qmp.validate());
    }

    for category in DeviceCategory::ORDER {
        let mut seen = HashSet::new();
        for device in category.devices(config) {
            errors.check(device.validate());
            if let Some(id) = device.id()
                && !seen.insert(id)
            {
                errors.push(ValidationError::DuplicateId {
                    kind: device.kind(),
                    id: id.to_string(),
                });
            }
        }
    }

    errors.check(config.smp.validate());
    errors
}

fn normalize<'c>(
    config: &'c Config,
    ctx: &mut BuildContext,
) -> Result<Vec<(DeviceCategory, Vec<Planned<'c>>)>, AllocationError> {
    let mut plan = Vec::with_capacity(DeviceCategory::ORDER.len());
    for category in DeviceCategory::ORDER {
        let mut planned = Vec::new();
        for device in category.devices(config) {
            let transport = ctx.resolver().resolve(device.transport_override());
            debug!(kind = device.kind(), %transport, "resolved transport");
            if let Some(index) = device
                .boot_index()
                .filter(|index| !index.is_empty() && *index != AUTO_BOOT_INDEX)
                .and_then(|index| index.parse::<u32>().ok())
            {
                ctx.registry_mut().set_boot_index(index)?;
            }
            planned.push(Planned { device, transport });
        }
        plan.push((category, planned));
    }
    Ok(plan)
}

fn render_device(
    device: &dyn Device,
    transport: Transport,
    config: &Config,
    ctx: &mut BuildContext,
) -> Result<Vec<String>, AllocationError> {
    device.render(&mut DeviceContext::new(ctx, &config.knobs, transport))
}

fn render_stage(
    stage: Stage,
    config: &Config,
    plan: &[(DeviceCategory, Vec<Planned<'_>>)],
    ctx: &mut BuildContext,
    logger: &dyn Logger,
    out: &mut Vec<String>,
) -> Result<(), AllocationError> {
    let default_transport = ctx.resolver().default_transport();
    match stage {
        Stage::Identity => {
            push_option(out, "-name", &config.name);
            push_option(out, "-uuid", &config.uuid);
        }
        Stage::Machine => out.extend(config.machine.args()),
        Stage::Cpu => {
            if !config.cpu_model.is_empty() {
                let mut params = vec![config.cpu_model.clone()];
                params.extend(config.cpu_model_flags.iter().cloned());
                out.push("-cpu".to_string());
                out.push(params.join(","));
            }
        }
        Stage::Display => {
            if let Some(spice) = &config.spice {
                out.extend(render_device(spice, default_transport, config, ctx)?);
            }
        }
        Stage::Tpm => {
            if let Some(tpm) = &config.tpm {
                out.extend(render_device(tpm, default_transport, config, ctx)?);
            }
        }
        Stage::Smbios => out.extend(config.smbios.args()),
        Stage::Qmp => out.extend(config.qmp_sockets.iter().flat_map(|qmp| qmp.args())),
        Stage::Memory => out.extend(config.memory.args()),
        Stage::Devices => {
            for (category, planned) in plan {
                for Planned { device, transport } in planned {
                    let tokens = render_device(*device, *transport, config, ctx)?;
                    debug!(%category, kind = device.kind(), tokens = tokens.len(), "rendered device");
                    out.extend(tokens);
                }
            }
        }
        Stage::Rtc => match &config.rtc {
            Some(rtc) if rtc.is_valid() => out.extend(rtc.args()),
            Some(rtc) => logger.warn(&format!(
                "skipping real-time clock: clock '{}' and driftfix '{}' must be host|rt|vm and slew|none",
                rtc.clock, rtc.driftfix
            )),
            None => {}
        },
        Stage::Global => {
            for param in &config.global_params {
                push_option(out, "-global", param);
            }
        }
        Stage::Pflash => {
            for image in &config.pflash {
                push_option(out, "-pflash", image);
            }
        }
        Stage::Vga => push_option(out, "-vga", &config.vga),
        Stage::Knobs => {
            let numa = ctx.arch().supports_dimm(&config.machine.machine_type);
            out.extend(config.memory.backend_args(&config.knobs, numa));
            out.extend(config.knobs.args());
        }
        Stage::Kernel => out.extend(config.kernel.args()),
        Stage::Bios => push_option(out, "-bios", &config.bios),
        Stage::IoThreads => {
            for thread in config.iothreads.iter().filter(|t| !t.id.is_empty()) {
                out.push("-object".to_string());
                out.push(format!("iothread,id={}", thread.id));
            }
        }
        Stage::Incoming => out.extend(config.incoming.args(ctx)),
        Stage::Files => {
            push_option(out, "-pidfile", &config.pid_file);
            push_option(out, "-D", &config.log_file);
        }
        Stage::FwCfg => {
            for entry in &config.fw_cfg {
                match entry.validate() {
                    Ok(()) => out.extend(entry.args()),
                    Err(err) => logger.error(&format!("skipping fw_cfg entry: {err}")),
                }
            }
        }
        Stage::Sandbox => push_option(out, "-sandbox", &config.seccomp_sandbox),
        Stage::Smp => out.extend(config.smp.args()),
    }
    Ok(())
}

/// Pushes `flag value` when `value` is set.
fn push_option(out: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        out.push(flag.to_string());
        out.push(value.to_string());
    }
}
