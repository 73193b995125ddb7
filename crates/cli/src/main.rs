//! QEMU command-line assembler CLI.
//!
//! This binary wraps `qcmd-core` for shell use. It provides:
//! 1. **Build:** Assemble a JSON machine description into an argument vector.
//! 2. **Check:** Validate a description and report every problem at once.
//! 3. **Sockets:** List the unix sockets the invocation will create.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use qcmd_core::builder::FIRST_CHILD_FD;
use qcmd_core::{
    Assembler, BuildError, BuildOptions, CollisionPolicy, Config, HostArch, Invocation,
    TracingLogger, socket_paths,
};

/// Exit status for any failure after the configuration was read, including
/// output that cannot be encoded.
const EXIT_INVALID: i32 = 1;
/// Exit status for a configuration that cannot be read or parsed.
const EXIT_CONFIG: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "qcmd",
    author,
    version,
    about = "Deterministic QEMU command-line assembly",
    long_about = "Assemble, validate, or inspect a QEMU invocation described by a JSON file.\n\nExamples:\n  qcmd build vm.json\n  qcmd build vm.json --arch aarch64 --format shell\n  qcmd check vm.json\n  qcmd sockets vm.json"
)]
struct Cli {
    /// Log debug diagnostics to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble the argument vector and print it.
    Build {
        /// Machine description (JSON).
        config: PathBuf,

        /// Host architecture (defaults to the one this binary runs on).
        #[arg(long)]
        arch: Option<HostArch>,

        /// Handling of explicit PCI addresses that are already taken.
        #[arg(long, value_enum, default_value_t = Policy::Strict)]
        policy: Policy,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Lines)]
        format: Format,

        /// Also print the host descriptors the invocation inherits.
        #[arg(long)]
        fds: bool,
    },

    /// Validate the description without assembling it.
    Check {
        /// Machine description (JSON).
        config: PathBuf,

        /// Host architecture (defaults to the one this binary runs on).
        #[arg(long)]
        arch: Option<HostArch>,
    },

    /// Print the unix socket paths the invocation creates.
    Sockets {
        /// Machine description (JSON).
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// Fail on a taken explicit address.
    Strict,
    /// Move the device to a free slot instead.
    Legacy,
}

impl From<Policy> for CollisionPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Strict => Self::Strict,
            Policy::Legacy => Self::Legacy,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// One token per line.
    Lines,
    /// A single shell-quoted line.
    Shell,
    /// A JSON array (or object with `--fds`).
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            config,
            arch,
            policy,
            format,
            fds,
        } => cmd_build(&config, arch, policy.into(), format, fds),
        Commands::Check { config, arch } => cmd_check(&config, arch),
        Commands::Sockets { config } => {
            for path in socket_paths(&load(&config)) {
                println!("{path}");
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the description or exits with the configuration status.
fn load(path: &Path) -> Config {
    match Config::load(path) {
        Ok(config) => {
            debug!(path = %path.display(), "loaded configuration");
            config
        }
        Err(e) => fail(&e),
    }
}

fn options(arch: Option<HostArch>, policy: CollisionPolicy) -> BuildOptions {
    BuildOptions {
        arch: arch.unwrap_or_else(HostArch::current),
        policy,
    }
}

fn cmd_build(path: &Path, arch: Option<HostArch>, policy: CollisionPolicy, format: Format, fds: bool) {
    let config = load(path);
    let assembler = Assembler::new(options(arch, policy));
    let invocation = match assembler.build(&config, &TracingLogger) {
        Ok(invocation) => invocation,
        Err(e) => fail(&e),
    };
    print_invocation(&invocation, format, fds);
}

fn cmd_check(path: &Path, arch: Option<HostArch>) {
    let config = load(path);
    match Assembler::new(options(arch, CollisionPolicy::Strict)).validate(&config) {
        Ok(()) => println!("{}: ok", path.display()),
        Err(e) => fail(&e),
    }
}

fn print_invocation(invocation: &Invocation, format: Format, fds: bool) {
    match format {
        Format::Lines => {
            for arg in &invocation.args {
                println!("{arg}");
            }
        }
        Format::Shell => {
            let line: Vec<String> = invocation.args.iter().map(|a| shell_quote(a)).collect();
            println!("{}", line.join(" "));
        }
        Format::Json => {
            match encode_json(invocation, fds) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("Error: failed to encode output: {e}");
                    process::exit(EXIT_INVALID);
                }
            }
            return;
        }
    }
    if fds {
        for (child, host) in (FIRST_CHILD_FD..).zip(&invocation.fds) {
            println!("# fd {child} <- host fd {host}");
        }
    }
}

/// Pretty JSON of the arguments, or of the whole invocation when `fds` is set.
fn encode_json(invocation: &Invocation, fds: bool) -> serde_json::Result<String> {
    if fds {
        serde_json::to_string_pretty(invocation)
    } else {
        serde_json::to_string_pretty(&invocation.args)
    }
}

/// Quotes `arg` for a POSIX shell when it contains anything but safe characters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Prints `err` and exits with the status matching its class.
fn fail(err: &BuildError) -> ! {
    eprintln!("Error: {err}");
    process::exit(exit_code(err));
}

const fn exit_code(err: &BuildError) -> i32 {
    match err {
        BuildError::Invalid(_) | BuildError::Allocation(_) => EXIT_INVALID,
        BuildError::ConfigParse(_) | BuildError::ConfigIo { .. } => EXIT_CONFIG,
    }
}
