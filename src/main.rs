use bsm_client::{open_transport, BsmDevice, Config, Device, ModelLibrary, PollOptions, SnapshotOutcome};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

const DEFAULT_SNAPSHOT: &str = "signed_current_snapshot";

#[derive(Parser)]
#[command(name = "bsm-client", version, about = "Signed snapshots and OCMF transactions from signing meters")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a snapshot and verify its signature
    Snapshot {
        #[arg(default_value = DEFAULT_SNAPSHOT)]
        alias: String,
    },
    /// Verify the signature of the snapshot currently held by the meter
    Verify {
        #[arg(default_value = DEFAULT_SNAPSHOT)]
        alias: String,
    },
    /// Print the OCMF transaction document of the last turn-on/turn-off pair
    Ocmf,
}

fn run(command: Commands) -> Result<bool, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let library = ModelLibrary::load(config.model_definitions.as_deref().map(Path::new))?;

    let transport = open_transport(&config.connection)?;
    let device = Device::new(transport, library, config.bsm.string_encoding)
        .with_max_count(config.connection.max_count);
    let mut bsm = BsmDevice::from_device(device, config.bsm.clone())?;

    let mut trace = |line: &str| info!("{line}");

    match command {
        Commands::Snapshot { alias } => {
            let options = PollOptions::from(&config.bsm.snapshot);
            let (outcome, valid) = bsm.verify_new_snapshot(&alias, &options, Some(&mut trace))?;
            match outcome {
                SnapshotOutcome::Valid(_) => {}
                SnapshotOutcome::Failed(status) => warn!("Snapshot {alias} failed: {status:?}"),
                SnapshotOutcome::TimedOut => warn!("Snapshot {alias} did not finish in time"),
            }
            return Ok(valid);
        }
        Commands::Verify { alias } => {
            return Ok(bsm.verify_snapshot(&alias, true, Some(&mut trace))?);
        }
        Commands::Ocmf => {
            return match bsm.generate_ocmf_xml(true)? {
                Some(xml) => {
                    std::io::stdout().write_all(&xml)?;
                    Ok(true)
                }
                None => {
                    warn!("No OCMF transaction available");
                    Ok(false)
                }
            };
        }
    }
}

fn main() -> ExitCode {
    let default_filter = std::env::var("BSM_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Snapshot { alias: DEFAULT_SNAPSHOT.to_string() });

    return match run(command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    };
}
