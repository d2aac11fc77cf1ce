//! Firmware flashing for STM32 devices over the factory USART bootloader.
//!
//! The library talks the ST application-note AN3155 protocol over a serial
//! port: it resets the target into its built-in bootloader using the RTS/DTR
//! control lines, synchronizes, then erases, writes, optionally verifies,
//! and launches a firmware image.
//!
//! Layers, bottom to top:
//!
//! - [`channel`]: the [`ByteChannel`] transport abstraction and its serial
//!   implementation with exact-read buffering.
//! - [`protocol`]: wire frame construction and protocol constants.
//! - [`session`]: the [`BootloaderSession`] state machine (handshake,
//!   commands, close).
//! - [`image`]: Intel HEX and raw binary loaders producing address/data
//!   [`Block`]s.
//! - [`flasher`]: the [`Flasher`] upload pipeline tying it all together.
//!
//! ```no_run
//! use stmboot::{Flasher, HexImage, SerialChannel, DEFAULT_BAUD};
//!
//! # fn main() -> stmboot::Result<()> {
//! let image = HexImage::from_file("firmware.hex")?;
//! let channel = SerialChannel::open("/dev/ttyUSB0", DEFAULT_BAUD)?;
//! let mut flasher = Flasher::new(channel);
//! flasher.connect()?;
//! if let Err(e) = flasher.upload(&image.blocks, true, |done, total| {
//!     eprintln!("{done}/{total}");
//! }) {
//!     eprintln!("failed after {} block(s): {}", e.completed, e.source);
//! }
//! flasher.close();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, OnceLock};

pub mod channel;
pub mod error;
pub mod flasher;
pub mod image;
pub mod protocol;
pub mod session;

type InterruptChecker = Arc<dyn Fn() -> bool + Send + Sync>;

static INTERRUPT_CHECKER: OnceLock<InterruptChecker> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

pub use {
    channel::{available_ports, ByteChannel, PortInfo, SerialChannel, DEFAULT_BAUD},
    error::{Error, Result},
    flasher::{Flasher, UploadError, UploadReport},
    image::{bin::BinImage, hex::HexImage, Block},
    session::{BootloaderSession, SessionConfig, SessionState},
};
