mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::{AnyProvider, EXIT_FAILURE};
use craftbox_backend::{
    lxd_provider, multipass_provider, AllowInstall, BackendLocator, DenyInstall, InstallPolicy,
    InstanceConfig, ProviderError,
};
use craftbox_image::{BuilddImage, ImageAlias};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendKind {
    Multipass,
    Lxd,
}

#[derive(Debug, Args)]
struct InstanceOpts {
    /// Backend environment provider.
    #[arg(long, value_enum, default_value_t = BackendKind::Multipass)]
    backend: BackendKind,

    /// Instance name, unique within the backend.
    #[arg(long, default_value = "craftbox-builder")]
    name: String,

    /// Ubuntu image alias (xenial, bionic, focal) or version id.
    #[arg(long, default_value = "focal")]
    image: String,

    /// CPU count for a newly launched instance.
    #[arg(long)]
    cpus: Option<u32>,

    /// Memory in GiB for a newly launched instance.
    #[arg(long)]
    mem: Option<u32>,

    /// Disk size in GiB for a newly launched instance.
    #[arg(long)]
    disk: Option<u32>,

    /// Fail on an incompatible instance instead of replacing it.
    #[arg(long, default_value_t = false)]
    no_auto_clean: bool,

    /// Permit installing a missing backend tool via snap.
    #[arg(long, default_value_t = false)]
    allow_install: bool,

    /// Deferred shutdown window in minutes at teardown (multipass only).
    #[arg(long)]
    stop_delay: Option<u32>,
}

#[derive(Debug, Parser)]
#[command(
    name = "craftbox",
    version,
    about = "Ephemeral build environments over multipass and LXD"
)]
struct Cli {
    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision the build environment, reusing a compatible instance.
    Setup {
        #[command(flatten)]
        opts: InstanceOpts,
    },
    /// Run a command inside the environment (after --).
    Run {
        #[command(flatten)]
        opts: InstanceOpts,
        /// KEY=VALUE overrides for the remote process environment.
        #[arg(long = "env")]
        env: Vec<String>,
        /// Command and arguments to run.
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },
    /// Copy a host file or directory into the environment.
    Push {
        #[command(flatten)]
        opts: InstanceOpts,
        source: PathBuf,
        destination: PathBuf,
        /// Remove the destination tree before copying.
        #[arg(long, default_value_t = false)]
        delete: bool,
    },
    /// Copy an environment file or directory onto the host.
    Pull {
        #[command(flatten)]
        opts: InstanceOpts,
        source: PathBuf,
        destination: PathBuf,
        /// Remove the destination tree before copying.
        #[arg(long, default_value_t = false)]
        delete: bool,
    },
    /// Show whether the instance exists and is running.
    Status {
        #[command(flatten)]
        opts: InstanceOpts,
    },
    /// Stop the environment, optionally deleting it.
    Teardown {
        #[command(flatten)]
        opts: InstanceOpts,
        /// Also delete the instance and its storage.
        #[arg(long, default_value_t = false)]
        clean: bool,
    },
}

fn provider_for(opts: &InstanceOpts) -> Result<AnyProvider, ProviderError> {
    let alias: ImageAlias = opts
        .image
        .parse()
        .map_err(ProviderError::Unsupported)?;

    let mut config = InstanceConfig::new(&opts.name, alias);
    if let Some(cpus) = opts.cpus {
        config = config.with_cpus(cpus);
    }
    if let Some(mem) = opts.mem {
        config = config.with_mem_gb(mem);
    }
    if let Some(disk) = opts.disk {
        config = config.with_disk_gb(disk);
    }

    let image = BuilddImage::new(alias);
    let locator = BackendLocator::from_env();
    let policy: &dyn InstallPolicy = if opts.allow_install {
        &AllowInstall
    } else {
        &DenyInstall
    };

    match opts.backend {
        BackendKind::Multipass => multipass_provider(&locator, policy, image, config).map(|p| {
            AnyProvider::Multipass(
                p.auto_clean(!opts.no_auto_clean)
                    .stop_delay_mins(opts.stop_delay),
            )
        }),
        BackendKind::Lxd => lxd_provider(&locator, policy, image, config).map(|p| {
            AnyProvider::Lxd(
                p.auto_clean(!opts.no_auto_clean)
                    .stop_delay_mins(opts.stop_delay),
            )
        }),
    }
}

fn execute(cli: Cli) -> Result<u8, String> {
    macro_rules! with_provider {
        ($opts:expr, $provider:ident, $body:expr) => {
            match provider_for($opts) {
                #[allow(unused_mut)]
                Ok(mut $provider) => $body,
                Err(err) => Ok(commands::report(&err)),
            }
        };
    }

    match &cli.command {
        Commands::Setup { opts } => with_provider!(opts, p, commands::setup::run(&mut p)),
        Commands::Run { opts, env, command } => {
            with_provider!(opts, p, commands::run::run(&mut p, command, env))
        }
        Commands::Push {
            opts,
            source,
            destination,
            delete,
        } => with_provider!(
            opts,
            p,
            commands::push::run(&mut p, source, destination, *delete)
        ),
        Commands::Pull {
            opts,
            source,
            destination,
            delete,
        } => with_provider!(
            opts,
            p,
            commands::pull::run(&mut p, source, destination, *delete)
        ),
        Commands::Status { opts } => with_provider!(opts, p, commands::status::run(&p)),
        Commands::Teardown { opts, clean } => {
            with_provider!(opts, p, commands::teardown::run(&mut p, *clean))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CRAFTBOX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
