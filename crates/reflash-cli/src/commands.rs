//! Command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use crc::{Crc, CRC_32_ISO_HDLC};
use tracing::{info, warn};

use reflash_core::binfile::blocks_from_bin;
use reflash_core::prepare::{prepare_block, prepare_blocks};
use reflash_core::workshop::WorkshopCode;
use reflash_core::{Block, ChecksumState, FlashInfo, PreparedBlock};
use reflash_crypto::{lzss, Padding};
use reflash_uds::flash::LogProgress;
use reflash_uds::{
    create_transport, FlashOptions, Flasher, SocketCanConfig, TransportConfig, BROADCAST_RX_ID,
    BROADCAST_TX_ID,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Flash-related flags shared by the flash subcommands.
#[derive(clap::Args)]
pub struct FlashArgs {
    /// ASCII tag appended to the tester-present before each checksum
    /// routine
    #[arg(long, default_value = "")]
    pub tuner_tag: String,

    /// Compare the controller's box code against the file before
    /// flashing
    #[arg(long)]
    pub verify_box_code: bool,

    /// Box code recorded in blocks without an embedded one
    #[arg(long, default_value = "")]
    pub box_code: String,
}

/// Resolve the transport configuration from a config file, an interface
/// shortcut, or fall back to the mock (dry run).
pub fn transport_config(
    config: Option<&Path>,
    interface: Option<&str>,
) -> Result<TransportConfig> {
    if let Some(path) = config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading transport config {}", path.display()))?;
        return toml::from_str(&text)
            .with_context(|| format!("parsing transport config {}", path.display()));
    }
    if let Some(interface) = interface {
        return Ok(TransportConfig::SocketCan(SocketCanConfig {
            interface: interface.to_string(),
            isotp: Default::default(),
        }));
    }
    warn!("no transport configured, using the in-memory mock (dry run)");
    Ok(TransportConfig::default())
}

pub fn checksum(info: &FlashInfo, file: &Path, block: &str) -> Result<()> {
    let number = info.block_to_number(block)?;
    let data = read(file)?;
    match info.checksum.validate(info, number, &data) {
        ChecksumState::Valid => {
            println!("{}: checksum valid", file.display());
            Ok(())
        }
        ChecksumState::Invalid => bail!("{}: checksum invalid", file.display()),
        ChecksumState::Failed => bail!("{}: checksum could not be located", file.display()),
    }
}

pub fn checksum_fix(
    info: &FlashInfo,
    file: &Path,
    block: &str,
    output: Option<&Path>,
) -> Result<()> {
    let number = info.block_to_number(block)?;
    let data = read(file)?;
    let (state, fixed) = info.checksum.fix(info, number, data);
    if state != ChecksumState::Valid {
        bail!("{}: checksum could not be located", file.display());
    }
    let target = output.unwrap_or(file);
    std::fs::write(target, &fixed).with_context(|| format!("writing {}", target.display()))?;
    println!("{}: checksum valid", target.display());
    Ok(())
}

pub fn lzss(file: &Path, output: &Path, padding: &str) -> Result<()> {
    let padding = match padding {
        "cipher" => Padding::CipherBlock,
        "exact" => Padding::Exact,
        "none" => Padding::None,
        other => bail!("unknown padding mode '{other}'"),
    };
    let data = read(file)?;
    let compressed = lzss::compress(&data, padding);
    std::fs::write(output, &compressed)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{} -> {} ({} -> {} bytes)",
        file.display(),
        output.display(),
        data.len(),
        compressed.len()
    );
    Ok(())
}

pub fn encrypt(info: &FlashInfo, file: &Path, output: &Path) -> Result<()> {
    let data = read(file)?;
    let encrypted = info.cipher.encrypt(&data)?;
    std::fs::write(output, &encrypted)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{} -> {}", file.display(), output.display());
    Ok(())
}

pub fn prepare(
    info: &FlashInfo,
    files: &[PathBuf],
    blocks: &[String],
    frf: Option<&Path>,
    output_dir: &Path,
    box_code: &str,
) -> Result<()> {
    let plain_blocks = if let Some(frf) = frf {
        let raw = read(frf)?;
        let distribution = reflash_dist::decode(info, &raw)?;
        if !distribution.box_codes.is_empty() {
            info!(box_codes = ?distribution.box_codes, "distribution box codes");
        }
        distribution.into_blocks(info)?
    } else {
        if files.len() != blocks.len() {
            bail!(
                "{} input files but {} --block selectors",
                files.len(),
                blocks.len()
            );
        }
        files
            .iter()
            .zip(blocks)
            .map(|(file, block)| {
                let number = info.block_to_number(block)?;
                Ok(Block::new(number, info.block_name(number), read(file)?))
            })
            .collect::<Result<Vec<_>>>()?
    };

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    for block in &plain_blocks {
        let prepared = prepare_block(info, block, true, box_code)?;
        let path = output_dir.join(format!("{}.json", prepared.name.to_lowercase()));
        std::fs::write(&path, serde_json::to_vec_pretty(&prepared)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("prepared block {} ({}) -> {}", prepared.number, prepared.name, path.display());
    }
    Ok(())
}

pub async fn flash_cal(
    info: &FlashInfo,
    config: &TransportConfig,
    file: &Path,
    args: &FlashArgs,
) -> Result<()> {
    let number = info.block_to_number("CAL")?;
    let block = Block::new(number, info.block_name(number), read(file)?);
    let prepared = prepare_block(info, &block, true, &args.box_code)?;
    let options = flash_options(args, std::slice::from_ref(&block));
    run_flash(info, config, &[prepared], options).await
}

pub async fn flash_bin(
    info: &FlashInfo,
    config: &TransportConfig,
    file: &Path,
    args: &FlashArgs,
) -> Result<()> {
    let image = read(file)?;
    let blocks = blocks_from_bin(info, &image)?;
    if blocks.is_empty() {
        bail!("no blocks of project {} found in {}", info.project_name, file.display());
    }
    let prepared = prepare_blocks(info, &blocks, &args.box_code)?;
    let options = flash_options(args, &blocks);
    run_flash(info, config, &prepared, options).await
}

pub async fn flash_prepared(
    info: &FlashInfo,
    config: &TransportConfig,
    files: &[PathBuf],
    args: &FlashArgs,
) -> Result<()> {
    let prepared: Vec<PreparedBlock> = files
        .iter()
        .map(|file| {
            let text = std::fs::read(file)
                .with_context(|| format!("reading {}", file.display()))?;
            serde_json::from_slice(&text)
                .with_context(|| format!("parsing prepared block {}", file.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let options = flash_options(args, &[]);
    run_flash(info, config, &prepared, options).await
}

pub async fn get_ecu_info(info: &FlashInfo, config: &TransportConfig) -> Result<()> {
    let transport = create_transport(config, info.rx_id, info.tx_id)?;
    let flasher = Flasher::new(info.clone(), transport, FlashOptions::default());
    let idents = flasher.read_ecu_info().await?;
    for ident in idents {
        println!("{:<22} {}", ident.label, ident.value);
    }
    Ok(())
}

/// Assemble flash options: tuner tag, pre-flight check, and a workshop
/// code stamped with today's date, the ASW checksum and the calibration
/// fingerprint.
fn flash_options(args: &FlashArgs, plain_blocks: &[Block]) -> FlashOptions {
    let today = chrono::Local::now().date_naive();

    let asw: Vec<&[u8]> = plain_blocks
        .iter()
        .filter(|b| b.name.starts_with("ASW"))
        .map(|b| b.data.as_slice())
        .collect();
    let asw_checksum = WorkshopCode::asw_checksum_of(&asw);

    let cal_id = plain_blocks
        .iter()
        .find(|b| b.name == "CAL")
        .map(|b| CRC32.checksum(&b.data).to_be_bytes())
        .unwrap_or_default();

    FlashOptions {
        tuner_tag: args.tuner_tag.clone(),
        verify_box_code: args.verify_box_code,
        workshop_code: WorkshopCode::new(
            today.year() as u16,
            today.month() as u8,
            today.day() as u8,
            asw_checksum,
            cal_id,
        ),
    }
}

async fn run_flash(
    info: &FlashInfo,
    config: &TransportConfig,
    blocks: &[PreparedBlock],
    options: FlashOptions,
) -> Result<()> {
    let primary = create_transport(config, info.rx_id, info.tx_id)?;
    let broadcast = create_transport(config, BROADCAST_RX_ID, BROADCAST_TX_ID)?;

    let flasher = Flasher::new(info.clone(), primary, options)
        .with_broadcast(broadcast)
        .with_progress(Arc::new(LogProgress));

    let cancel = flasher.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, stopping at the next safe point");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    info!(
        blocks = blocks.len(),
        family = %info.family,
        "starting flash"
    );
    flasher.flash(blocks).await?;
    println!("flash complete: {} block(s) written", blocks.len());
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}
