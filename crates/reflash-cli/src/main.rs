//! reflash - command-line ECU reflashing tool
//!
//! A thin shell over the library crates: checksum handling, payload
//! preparation and full UDS flash flows for the supported controller
//! families.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reflash_core::FlashFamily;

use crate::commands::FlashArgs;

#[derive(Parser)]
#[command(name = "reflash")]
#[command(author, version, about = "ECU reflashing over UDS/ISO-TP")]
#[command(propagate_version = true)]
struct Cli {
    /// Controller family: simos, dsg (dq250), haldex, dq381
    #[arg(short, long, env = "REFLASH_FAMILY", default_value = "simos", global = true)]
    family: String,

    /// Transport configuration file (TOML)
    #[arg(short, long, env = "REFLASH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// CAN interface shortcut (implies SocketCAN with default ISO-TP
    /// settings)
    #[arg(short, long, env = "REFLASH_INTERFACE", global = true)]
    interface: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a block's flash checksum
    Checksum {
        /// Block file
        file: PathBuf,

        /// Block name or number
        #[arg(short, long)]
        block: String,
    },

    /// Validate and repair a block's flash checksum
    ChecksumFix {
        /// Block file
        file: PathBuf,

        /// Block name or number
        #[arg(short, long)]
        block: String,

        /// Output path (defaults to rewriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// LZSS-compress a file
    Lzss {
        /// Input file
        file: PathBuf,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,

        /// Padding mode: cipher, exact, none
        #[arg(long, default_value = "cipher")]
        padding: String,
    },

    /// Encrypt a payload with the family's block cipher
    Encrypt {
        /// Input file (must be compressed/padded as the family expects)
        file: PathBuf,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Prepare blocks for flashing: checksum, compress, encrypt
    Prepare {
        /// Block files, paired positionally with --block
        files: Vec<PathBuf>,

        /// Block name or number per input file
        #[arg(short, long)]
        block: Vec<String>,

        /// Decode a vendor distribution file instead of block files
        #[arg(long, conflicts_with = "files")]
        frf: Option<PathBuf>,

        /// Directory receiving the prepared block files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Box code recorded in blocks without an embedded one
        #[arg(long, default_value = "")]
        box_code: String,
    },

    /// Flash a calibration block
    FlashCal {
        /// Calibration block file
        file: PathBuf,

        #[command(flatten)]
        flash: FlashArgs,
    },

    /// Flash a full flat image
    FlashBin {
        /// Flat image file
        file: PathBuf,

        #[command(flatten)]
        flash: FlashArgs,
    },

    /// Flash previously prepared block files
    FlashPrepared {
        /// Prepared block files (JSON), flashed in the given order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        flash: FlashArgs,
    },

    /// Read and print controller identification
    GetEcuInfo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let family = FlashFamily::from_name(&cli.family)?;
    let info = family.info()?;
    let transport_config =
        || commands::transport_config(cli.config.as_deref(), cli.interface.as_deref());

    match &cli.command {
        Commands::Checksum { file, block } => commands::checksum(&info, file, block),

        Commands::ChecksumFix {
            file,
            block,
            output,
        } => commands::checksum_fix(&info, file, block, output.as_deref()),

        Commands::Lzss {
            file,
            output,
            padding,
        } => commands::lzss(file, output, padding),

        Commands::Encrypt { file, output } => commands::encrypt(&info, file, output),

        Commands::Prepare {
            files,
            block,
            frf,
            output_dir,
            box_code,
        } => commands::prepare(&info, files, block, frf.as_deref(), output_dir, box_code),

        Commands::FlashCal { file, flash } => {
            commands::flash_cal(&info, &transport_config()?, file, flash).await
        }

        Commands::FlashBin { file, flash } => {
            commands::flash_bin(&info, &transport_config()?, file, flash).await
        }

        Commands::FlashPrepared { files, flash } => {
            commands::flash_prepared(&info, &transport_config()?, files, flash).await
        }

        Commands::GetEcuInfo => commands::get_ecu_info(&info, &transport_config()?).await,
    }
    .context("command failed")
}
