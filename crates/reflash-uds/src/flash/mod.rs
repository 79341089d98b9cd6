//! Flash orchestrator
//!
//! Drives the per-controller reflashing state machine over a UDS client:
//!
//! ```text
//! clear emissions (broadcast) -> extended session -> read VIN
//!   -> precondition routine -> programming session -> seed/key unlock
//!   -> write workshop code
//!   -> per block: [erase] -> download -> transfer -> exit
//!                 -> tester present -> checksum routine
//!   -> check dependencies -> settle -> ECU reset -> clear DTCs
//! ```
//!
//! Engine-family blocks numbered above the patch offset take the patch
//! sub-flow instead: the calibration block is erased first, the download
//! is uncompressed, and chunk sizes depend on the write address.
//!
//! A mid-flight failure after RequestDownload leaves the controller
//! unbootable until a later flash completes; the orchestrator makes no
//! rollback attempt.

mod progress;

pub use progress::{FlashProgress, FlashStep, LogProgress, NullProgress};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use reflash_core::family::{FamilyError, FlashInfo, PatchInfo};
use reflash_core::workshop::WorkshopCode;
use reflash_core::PreparedBlock;
use reflash_crypto::{sa2, SeedKeyError};

use crate::transport::{Transport, TransportError};
use crate::uds::did::{read_identification, EcuIdent};
use crate::uds::{
    data_id, dtc_group, reset_type, routine, session, UdsClient, UdsError, OBD_CLEAR_EMISSIONS,
};

/// Wait after CheckProgrammingDependencies before resetting, letting the
/// controller finish its internal bookkeeping.
const SETTLE_AFTER_DEPENDENCIES: Duration = Duration::from_secs(5);

/// Rejected-chunk ceiling for the patch retry loop.
const MAX_CHUNK_REJECTIONS: u32 = 16;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error(transparent)]
    Uds(#[from] UdsError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Family(#[from] FamilyError),

    #[error(transparent)]
    SeedKey(#[from] SeedKeyError),

    #[error("Flash cancelled by the host")]
    Cancelled,

    #[error("Controller sent a {0}-byte seed, expected 4")]
    BadSeed(usize),

    #[error("Box code mismatch: file is for '{file}', controller reports '{ecu}'")]
    BoxCodeMismatch { file: String, ecu: String },

    #[error("Block {0} requires the patch flow but the family has no patch descriptor")]
    PatchUnsupported(u16),

    #[error("Block {number}: controller rejected {attempts} consecutive chunks")]
    ChunkRejected { number: u16, attempts: u32 },
}

/// Caller-tunable flash behavior.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// ASCII tag appended to the TesterPresent before the checksum
    /// routine of blocks above number 1; empty disables it.
    pub tuner_tag: String,
    /// Read the controller's box code before flashing and refuse on
    /// mismatch with the prepared blocks.
    pub verify_box_code: bool,
    /// Traceability record written to DID 0xF15A.
    pub workshop_code: WorkshopCode,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            tuner_tag: String::new(),
            verify_box_code: false,
            workshop_code: WorkshopCode::new(2000, 1, 1, 0, [0; 4]),
        }
    }
}

/// The flash orchestrator. Owns the primary channel for the duration of
/// a flash; the optional broadcast channel is only used for the
/// clear-emissions frames around the session.
pub struct Flasher {
    info: FlashInfo,
    client: UdsClient,
    broadcast: Option<Arc<dyn Transport>>,
    progress: Arc<dyn FlashProgress>,
    cancel: Arc<AtomicBool>,
    options: FlashOptions,
}

impl Flasher {
    pub fn new(info: FlashInfo, transport: Arc<dyn Transport>, options: FlashOptions) -> Self {
        Self {
            info,
            client: UdsClient::new(transport),
            broadcast: None,
            progress: Arc::new(NullProgress),
            cancel: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    /// Attach the broadcast channel used for clear-emissions frames.
    pub fn with_broadcast(mut self, transport: Arc<dyn Transport>) -> Self {
        self.broadcast = Some(transport);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn FlashProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Token the host can set to abort at the next suspension point.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn client(&self) -> &UdsClient {
        &self.client
    }

    /// Run a full flash of the prepared blocks, in caller order.
    pub async fn flash(&self, blocks: &[PreparedBlock]) -> Result<(), FlashError> {
        let result = self.run(blocks).await;
        if let Err(e) = &result {
            warn!(error = %e, "flash aborted");
        }
        self.progress.done(&result);
        if let Err(e) = self.client.transport().close().await {
            warn!(error = %e, "closing primary channel failed");
        }
        if let Some(broadcast) = &self.broadcast {
            if let Err(e) = broadcast.close().await {
                warn!(error = %e, "closing broadcast channel failed");
            }
        }
        result
    }

    async fn run(&self, blocks: &[PreparedBlock]) -> Result<(), FlashError> {
        self.clear_emissions().await?;

        self.checkpoint()?;
        self.progress
            .status(FlashStep::Session, "entering extended session", 0.0);
        self.client
            .diagnostic_session_control(session::EXTENDED)
            .await?;

        self.progress
            .status(FlashStep::Identify, "reading identification", 0.0);
        let vin = self.client.read_data_by_identifier(data_id::VIN).await?;
        info!(vin = %String::from_utf8_lossy(&vin), "controller identification");

        if self.options.verify_box_code {
            self.verify_box_code(blocks).await?;
        }

        self.checkpoint()?;
        self.progress
            .status(FlashStep::Precondition, "checking preconditions", 0.0);
        self.client
            .routine_control_start(routine::PRECONDITION, &[])
            .await?;

        self.progress
            .status(FlashStep::Session, "entering programming session", 0.0);
        self.client
            .diagnostic_session_control(session::PROGRAMMING)
            .await?;

        self.unlock().await?;

        self.progress
            .status(FlashStep::WorkshopCode, "writing workshop code", 0.0);
        let mut record = self.options.workshop_code.encode().to_vec();
        record.push(0x00);
        self.client
            .write_data_by_identifier(data_id::WORKSHOP_CODE, &record)
            .await?;

        for block in blocks {
            self.checkpoint()?;
            if self.patch_descriptor_for(block).is_some() {
                self.patch_block(block).await?;
            } else {
                self.flash_block(block).await?;
            }
        }

        self.progress
            .status(FlashStep::Dependencies, "checking dependencies", 0.0);
        self.client
            .routine_control_start(routine::CHECK_DEPENDENCIES, &[])
            .await?;
        tokio::time::sleep(SETTLE_AFTER_DEPENDENCIES).await;

        self.checkpoint()?;
        self.progress.status(FlashStep::Reset, "resetting", 0.0);
        self.client.ecu_reset(reset_type::HARD_RESET).await?;
        self.client
            .clear_diagnostic_information(dtc_group::ALL)
            .await?;
        self.clear_emissions().await?;

        self.progress.status(FlashStep::Done, "done", 100.0);
        Ok(())
    }

    /// Fire the one-byte OBD clear on the broadcast channel. Nothing
    /// answers the tester there.
    async fn clear_emissions(&self) -> Result<(), FlashError> {
        self.progress
            .status(FlashStep::ClearEmissions, "clearing emissions codes", 0.0);
        if let Some(broadcast) = &self.broadcast {
            broadcast.send(&[OBD_CLEAR_EMISSIONS]).await?;
        }
        Ok(())
    }

    /// Seed/key unlock with the family's SA2 program.
    async fn unlock(&self) -> Result<(), FlashError> {
        self.checkpoint()?;
        self.progress
            .status(FlashStep::Unlock, "security access", 0.0);

        let seed = self.client.security_access_request_seed().await?;
        if seed.len() != 4 {
            return Err(FlashError::BadSeed(seed.len()));
        }
        let seed = u32::from_be_bytes([seed[0], seed[1], seed[2], seed[3]]);
        let key = sa2::derive_key(self.info.sa2_script, seed)?;
        debug!(seed = format_args!("0x{seed:08X}"), "derived security key");
        self.client
            .security_access_send_key(&key.to_be_bytes())
            .await?;
        Ok(())
    }

    async fn verify_box_code(&self, blocks: &[PreparedBlock]) -> Result<(), FlashError> {
        let raw = self
            .client
            .read_data_by_identifier(data_id::SPARE_PART_NUMBER)
            .await?;
        let ecu_code: String = raw
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { ' ' })
            .collect::<String>()
            .trim()
            .to_string();

        for block in blocks {
            if !block.box_code.is_empty() && block.box_code != ecu_code {
                return Err(FlashError::BoxCodeMismatch {
                    file: block.box_code.clone(),
                    ecu: ecu_code,
                });
            }
        }
        Ok(())
    }

    fn patch_descriptor_for(&self, block: &PreparedBlock) -> Option<&PatchInfo> {
        self.info
            .patch
            .as_ref()
            .filter(|patch| block.number > patch.block_offset)
    }

    /// Ordinary per-block flow: erase, download, fixed-size transfer,
    /// exit, tester present, checksum routine.
    async fn flash_block(&self, block: &PreparedBlock) -> Result<(), FlashError> {
        let id = self.info.block_identifier(block.number)?;
        info!(block = block.number, name = %block.name, "flashing block");

        if block.should_erase {
            self.progress.status(
                FlashStep::Erase,
                &format!("erasing {}", block.name),
                0.0,
            );
            self.client
                .routine_control_start(routine::ERASE, &[0x01, id])
                .await?;
        }

        self.progress.status(
            FlashStep::Download,
            &format!("requesting download of {}", block.name),
            0.0,
        );
        let max_block_length = self
            .client
            .request_download(
                block.data_format_identifier(),
                id,
                block.data.len() as u32,
            )
            .await?;
        debug!(max_block_length, "download accepted");

        let chunk_size = self.info.transfer_size(block.number)?;
        let total_chunks = block.data.len().div_ceil(chunk_size).max(1);
        let mut counter: u8 = 1;
        for (index, chunk) in block.data.chunks(chunk_size).enumerate() {
            self.checkpoint()?;
            self.client.transfer_data(counter, chunk).await?;
            counter = counter.wrapping_add(1);
            self.progress.status(
                FlashStep::Transfer,
                &block.name,
                (index + 1) as f32 / total_chunks as f32 * 100.0,
            );
        }

        self.client.request_transfer_exit().await?;
        self.tester_present(block).await?;

        self.progress.status(
            FlashStep::Checksum,
            &format!("verifying {}", block.name),
            0.0,
        );
        let mut params = vec![0x01, id, 0x00, 0x04];
        params.extend_from_slice(&block.uds_checksum);
        self.client
            .routine_control_start(routine::CHECKSUM, &params)
            .await?;
        Ok(())
    }

    /// Patch sub-flow: write an unerased region with address-dependent
    /// chunk sizes. The calibration block is erased first since the
    /// patch forces it to be rewritten afterwards.
    async fn patch_block(&self, block: &PreparedBlock) -> Result<(), FlashError> {
        let patch = self
            .patch_descriptor_for(block)
            .ok_or(FlashError::PatchUnsupported(block.number))?
            .clone();
        let target = block.number - patch.block_offset;
        info!(
            block = block.number,
            target,
            "patch flow: writing unerased region as a patch of block {target}"
        );

        let cal_id = self.info.block_identifier(patch.cal_block)?;
        self.progress
            .status(FlashStep::Erase, "erasing calibration for patch", 0.0);
        self.client
            .routine_control_start(routine::ERASE, &[0x01, cal_id])
            .await?;

        let id = self.info.block_identifier(block.number)?;
        let dfi = (patch.compression << 4) | (patch.encryption & 0x0F);
        self.client
            .request_download(dfi, id, block.data.len() as u32)
            .await?;

        let base = self.info.base_address(block.number)?;
        let total = block.data.len();
        let mut offset = 0usize;
        let mut counter: u8 = 1;

        while offset < total {
            self.checkpoint()?;
            let address = base + offset as u32;
            let size = patch.transfer_size(address).min(total - offset);
            let chunk = &block.data[offset..offset + size];

            let mut rejections = 0u32;
            loop {
                match self.client.transfer_data(counter, chunk).await {
                    Ok(()) => {
                        counter = counter.wrapping_add(1);
                        break;
                    }
                    Err(UdsError::NegativeResponse { nrc, .. }) => {
                        rejections += 1;
                        if rejections >= MAX_CHUNK_REJECTIONS {
                            return Err(FlashError::ChunkRejected {
                                number: block.number,
                                attempts: rejections,
                            });
                        }
                        // The controller expects the counter to advance
                        // even on a resend of the same chunk; unclear
                        // whether required or a tolerated artifact.
                        warn!(
                            %nrc,
                            counter,
                            address = format_args!("0x{address:08X}"),
                            "chunk rejected, resending with advanced counter"
                        );
                        counter = counter.wrapping_add(1);
                    }
                    Err(other) => return Err(other.into()),
                }
            }

            offset += size;
            self.progress.status(
                FlashStep::Transfer,
                &block.name,
                offset as f32 / total as f32 * 100.0,
            );
        }

        self.client.request_transfer_exit().await?;
        Ok(())
    }

    /// TesterPresent before the checksum routine; the tuner tag rides
    /// along as a payload suffix on blocks above number 1.
    async fn tester_present(&self, block: &PreparedBlock) -> Result<(), FlashError> {
        let tag = &self.options.tuner_tag;
        let suffix = if !tag.is_empty() && block.number > 1 {
            tag.as_bytes()
        } else {
            &[]
        };
        self.client.tester_present(suffix).await?;
        Ok(())
    }

    /// Identification sweep used by `get-ecu-info`.
    pub async fn read_ecu_info(&self) -> Result<Vec<EcuIdent>, FlashError> {
        self.client
            .diagnostic_session_control(session::EXTENDED)
            .await?;
        Ok(read_identification(&self.client).await?)
    }

    fn checkpoint(&self) -> Result<(), FlashError> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(FlashError::Cancelled);
        }
        Ok(())
    }
}
