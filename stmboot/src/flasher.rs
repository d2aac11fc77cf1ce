//! Upload orchestration: erase, write, verify, launch.
//!
//! The flasher wraps a [`BootloaderSession`] and runs the full firmware
//! upload pipeline over a list of image blocks. Blocks are transferred
//! strictly in order; the first error aborts the remaining blocks and the
//! launch, reporting how many blocks completed before the failure.

use log::{debug, info};

use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::image::Block;
use crate::is_interrupted_requested;
use crate::protocol::MAX_CHUNK;
use crate::session::{BootloaderSession, SessionConfig, SessionState};

/// Outcome of a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Number of blocks written (and verified, if enabled).
    pub blocks_written: usize,
}

/// An upload failure, carrying how far the pipeline got.
#[derive(Debug, thiserror::Error)]
#[error("upload failed after {completed} block(s): {source}")]
pub struct UploadError {
    /// The underlying protocol or channel error.
    #[source]
    pub source: Error,
    /// Blocks fully completed before the failure.
    pub completed: usize,
}

/// Drives a complete firmware upload over one bootloader session.
pub struct Flasher<C: ByteChannel> {
    session: BootloaderSession<C>,
}

impl<C: ByteChannel> Flasher<C> {
    /// Wrap a channel with default session timings.
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, SessionConfig::default())
    }

    /// Wrap a channel with custom session timings.
    pub fn with_config(channel: C, config: SessionConfig) -> Self {
        Self {
            session: BootloaderSession::with_config(channel, config),
        }
    }

    /// Reset the target into its bootloader and synchronize.
    pub fn connect(&mut self) -> Result<()> {
        self.session.handshake()
    }

    /// Session lifecycle state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Upload `blocks` to the target: mass erase, write each block in order
    /// (reading it back for comparison when `verify` is set), then jump to
    /// the first block's address.
    ///
    /// `progress` is called after each completed block with
    /// `(completed, total)`. On failure the error reports how many blocks
    /// finished; the remaining blocks and the jump are skipped.
    ///
    /// Every block length is checked against the protocol transfer limit
    /// before the erase, so a malformed image never leaves the target wiped
    /// with nothing written.
    pub fn upload(
        &mut self,
        blocks: &[Block],
        verify: bool,
        mut progress: impl FnMut(usize, usize),
    ) -> std::result::Result<UploadReport, UploadError> {
        if blocks.is_empty() {
            return Err(UploadError {
                source: Error::InvalidImage("image contains no blocks".into()),
                completed: 0,
            });
        }
        if let Some(block) = blocks.iter().find(|b| b.is_empty() || b.len() > MAX_CHUNK) {
            return Err(UploadError {
                source: Error::InvalidImage(format!(
                    "block at {:#010x} carries {} byte(s), limit is {MAX_CHUNK}",
                    block.address,
                    block.len()
                )),
                completed: 0,
            });
        }

        let total = blocks.len();
        let mut completed = 0;

        let result = self.run_upload(blocks, verify, &mut completed, &mut progress);
        match result {
            Ok(()) => {
                info!("Upload complete: {total} block(s) written");
                Ok(UploadReport {
                    blocks_written: total,
                })
            },
            Err(source) => Err(UploadError { source, completed }),
        }
    }

    fn run_upload(
        &mut self,
        blocks: &[Block],
        verify: bool,
        completed: &mut usize,
        progress: &mut impl FnMut(usize, usize),
    ) -> Result<()> {
        let total = blocks.len();

        info!("Erasing flash");
        self.session.global_erase()?;

        for block in blocks {
            if is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            debug!(
                "Writing block {}/{total} at {:#010x}",
                *completed + 1,
                block.address
            );
            self.session.write_memory(block.address, &block.data)?;

            if verify {
                let readback = self.session.read_memory(block.address, block.len())?;
                if readback != block.data {
                    return Err(Error::VerifyMismatch {
                        address: block.address,
                    });
                }
            }

            *completed += 1;
            progress(*completed, total);
        }

        let entry = blocks[0].address;
        info!("Launching application at {entry:#010x}");
        self.session.go(entry)
    }

    /// Mass-erase the target's flash without writing anything.
    pub fn erase(&mut self) -> Result<()> {
        self.session.global_erase()
    }

    /// Jump to application code at `address`.
    pub fn go(&mut self, address: u32) -> Result<()> {
        self.session.go(address)
    }

    /// End the session and release the channel.
    pub fn close(&mut self) {
        self.session.close();
    }
}
