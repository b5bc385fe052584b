use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use stickcp::cli::{inventory, prompt};
use stickcp::config::AppConfig;
use stickcp::context::AppContext;
use stickcp::core::{BindingPolicy, Device, Orchestrator, TransferStrategy, WorkflowError};
use stickcp::logging::{self, LogConfig};
use tracing::{error, info};

const EXIT_FAILURE: u8 = 1;
const EXIT_DECLINED: u8 = 3;

#[derive(Parser)]
#[command(name = "stickcp", version)]
#[command(about = "Copy, mirror and format removable drives with verification", long_about = None)]
#[command(arg_required_else_help = true)]
#[command(
    after_help = "Only one stickcp may drive a mount point at a time. Wrap concurrent \
                  invocations in an external lock such as flock(1)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default /etc/stickcp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount DEVICE, copy SOURCE onto it verbatim, verify, unmount
    Copy(TransferArgs),
    /// Mount DEVICE, mirror SOURCE onto it (deleting extras), verify, unmount
    Mirror(TransferArgs),
    /// Reformat DEVICE as exFAT, asking first if it holds a filesystem
    Format {
        device: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Volume label for the new filesystem
        #[arg(long)]
        label: Option<String>,
    },
    /// List attached block devices
    List,
}

#[derive(Args)]
struct TransferArgs {
    source: PathBuf,
    device: PathBuf,
}

/// Flags that override configuration. Absent flags are not serialized so
/// they never mask file or environment values.
#[derive(Args, Serialize)]
struct GlobalArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    mount_point: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true, value_enum)]
    binding_policy: Option<BindingPolicy>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    remove_mount_point: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    simulation: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(short, long, global = true)]
    verbose: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(skip)]
    format_label: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    if let Commands::Format { label, .. } = &cli.command {
        cli.global.format_label = label.clone();
    }

    let config = match AppConfig::new(cli.config.as_deref(), Some(&cli.global)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("stickcp: {:#}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    });

    let ctx = match AppContext::new(config).context("Failed to initialise hardware adapter") {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("stickcp: {:#}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    info!(adapter = ctx.adapter.name(), "Starting");

    match run(cli.command, Orchestrator::new(ctx)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_declined() => {
            info!("{}", e);
            eprintln!("stickcp: {}", e);
            ExitCode::from(EXIT_DECLINED)
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("stickcp: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(command: Commands, orchestrator: Orchestrator) -> Result<(), WorkflowError> {
    match command {
        Commands::Copy(args) => transfer(&orchestrator, args, TransferStrategy::VerbatimCopy).await,
        Commands::Mirror(args) => transfer(&orchestrator, args, TransferStrategy::MirrorSync).await,
        Commands::Format { device, yes, .. } => {
            let device = Device::new(device);
            let request = if yes {
                orchestrator.run_format(&device, |_| true).await?
            } else {
                orchestrator
                    .run_format(&device, |sig| prompt::confirm_format(&device, sig))
                    .await?
            };
            println!("Formatted {} as exFAT", request.device);
            Ok(())
        }
        Commands::List => {
            let devices = orchestrator.list_devices().await?;
            print!("{}", inventory::render_table(&devices));
            Ok(())
        }
    }
}

async fn transfer(
    orchestrator: &Orchestrator,
    args: TransferArgs,
    strategy: TransferStrategy,
) -> Result<(), WorkflowError> {
    let verified = orchestrator
        .run_transfer(&args.source, &Device::new(args.device), strategy)
        .await?;

    println!(
        "{} -> {} ({}, {} bytes verified)",
        verified.source.display(),
        verified.destination.display(),
        verified.strategy.as_str(),
        verified.source_bytes
    );
    Ok(())
}
