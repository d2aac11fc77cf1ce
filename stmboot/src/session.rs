//! Bootloader session: the wire protocol state machine.
//!
//! A session owns one [`ByteChannel`] exclusively and drives a single
//! physical target through its reset handshake and command set. The
//! lifecycle is
//!
//! ```text
//! Disconnected -> Handshaking -> Ready -> (operation) -> Ready
//!                      |                       |
//!                      +------> Closed <-------+
//! ```
//!
//! `Closed` is permanent: a failed handshake, a rejected command, or an
//! explicit close ends the session, and no operation is valid afterwards.
//! Nothing here retries; every failure propagates to the caller verbatim
//! and aborts the remaining steps of the operation it occurred in.

use std::thread;
use std::time::Duration;

use log::{debug, info, trace};

use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::protocol::{
    address_frame, command_frame, read_length_frame, write_data_frame, Opcode, ACK,
    ERASE_GLOBAL_FRAME, MAX_CHUNK, SYNC,
};

/// Timing knobs for the reset/sync sequence.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Settle delay after each control-line change.
    pub line_settle: Duration,
    /// Settle delay after a successful sync exchange.
    pub sync_settle: Duration,
    /// Settle delay before restoring the lines on close.
    pub close_settle: Duration,
    /// Timeout for the single sync response byte.
    pub sync_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            line_settle: Duration::from_millis(100),
            sync_settle: Duration::from_millis(200),
            close_settle: Duration::from_millis(100),
            sync_timeout: Duration::from_millis(1000),
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Channel open, target not yet reset into the bootloader.
    Disconnected,
    /// Reset/sync sequence in progress.
    Handshaking,
    /// Bootloader answered the sync byte; commands may be issued.
    Ready,
    /// Session ended; no further operations are valid.
    Closed,
}

/// A bootloader session over one exclusively-owned byte channel.
pub struct BootloaderSession<C: ByteChannel> {
    channel: C,
    config: SessionConfig,
    state: SessionState,
}

impl<C: ByteChannel> BootloaderSession<C> {
    /// Create a session with default timings. The target is not contacted
    /// until [`handshake`](Self::handshake).
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, SessionConfig::default())
    }

    /// Create a session with custom timings.
    pub fn with_config(channel: C, config: SessionConfig) -> Self {
        Self {
            channel,
            config,
            state: SessionState::Disconnected,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn channel(&self) -> &C {
        &self.channel
    }

    /// Reset the target into its bootloader and synchronize.
    ///
    /// Holds the target in reset while selecting boot-from-bootloader via
    /// the control lines, releases reset, then exchanges the sync byte.
    /// Any failure, including an unexpected sync response or a timeout, is
    /// fatal and closes the session; the handshake is never retried.
    pub fn handshake(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => {},
            SessionState::Ready => return Ok(()),
            _ => return Err(Error::SessionClosed),
        }

        self.state = SessionState::Handshaking;
        match self.try_handshake() {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!("Bootloader ready");
                Ok(())
            },
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            },
        }
    }

    fn try_handshake(&mut self) -> Result<()> {
        debug!("Holding reset, selecting bootloader boot");
        self.channel.set_lines(true, false)?;
        thread::sleep(self.config.line_settle);

        debug!("Releasing reset");
        self.channel.set_lines(true, true)?;
        thread::sleep(self.config.line_settle);

        trace!("Sending sync byte {SYNC:#04x}");
        self.channel.write(&[SYNC])?;

        let response = self.channel.read_exact(1, Some(self.config.sync_timeout))?;
        if response[0] != ACK {
            return Err(Error::Handshake(format!(
                "unexpected sync response {:#04x}",
                response[0]
            )));
        }

        thread::sleep(self.config.sync_settle);
        Ok(())
    }

    /// Mass-erase the target's flash.
    pub fn global_erase(&mut self) -> Result<()> {
        self.operation(|s| {
            debug!("Global erase");
            s.command_ack(Opcode::Erase)?;
            s.data_ack(&ERASE_GLOBAL_FRAME, Opcode::Erase)
        })
    }

    /// Write up to [`MAX_CHUNK`] bytes at `address`.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        check_chunk_len(data.len())?;
        self.operation(|s| {
            trace!("Write {} byte(s) at {address:#010x}", data.len());
            s.command_ack(Opcode::WriteMemory)?;
            s.data_ack(&address_frame(address), Opcode::WriteMemory)?;
            s.data_ack(&write_data_frame(data), Opcode::WriteMemory)
        })
    }

    /// Read `len` bytes (1..=[`MAX_CHUNK`]) starting at `address`.
    pub fn read_memory(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        check_chunk_len(len)?;
        self.operation(|s| {
            trace!("Read {len} byte(s) at {address:#010x}");
            s.command_ack(Opcode::ReadMemory)?;
            s.data_ack(&address_frame(address), Opcode::ReadMemory)?;
            s.data_ack(&read_length_frame(len), Opcode::ReadMemory)?;
            // The data itself is the response; no trailing ACK.
            s.channel.read_exact(len, None)
        })
    }

    /// Jump to application code at `address`.
    pub fn go(&mut self, address: u32) -> Result<()> {
        self.operation(|s| {
            debug!("Jumping to {address:#010x}");
            s.command_ack(Opcode::Go)?;
            s.data_ack(&address_frame(address), Opcode::Go)
        })
    }

    /// End the session: restore the control lines so the target boots
    /// normally, then close the channel.
    ///
    /// Best-effort: channel errors during close are logged, not surfaced.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        thread::sleep(self.config.close_settle);
        if let Err(e) = self.channel.set_lines(false, true) {
            debug!("Restoring control lines failed during close: {e}");
        }
        if let Err(e) = self.channel.close() {
            debug!("Channel close failed: {e}");
        }
        self.state = SessionState::Closed;
    }

    /// Run one protocol operation as a fail-fast pipeline. Any error closes
    /// the session permanently.
    fn operation<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.state != SessionState::Ready {
            return Err(Error::SessionClosed);
        }
        match op(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            },
        }
    }

    /// Send `[op, ~op]` and require an ACK.
    fn command_ack(&mut self, op: Opcode) -> Result<()> {
        trace!("Command {op:?} ({:#04x})", op as u8);
        self.channel.write(&command_frame(op))?;
        self.read_ack(op)
    }

    /// Send a pre-checksummed payload frame and require an ACK.
    fn data_ack(&mut self, frame: &[u8], op: Opcode) -> Result<()> {
        self.channel.write(frame)?;
        self.read_ack(op)
    }

    fn read_ack(&mut self, op: Opcode) -> Result<()> {
        let response = self.channel.read_exact(1, None)?;
        // Anything other than the ACK byte is a rejection; the documented
        // NACK value is not singled out.
        if response[0] == ACK {
            Ok(())
        } else {
            Err(Error::Nack {
                opcode: op as u8,
                response: response[0],
            })
        }
    }
}

fn check_chunk_len(len: usize) -> Result<()> {
    if len == 0 || len > MAX_CHUNK {
        return Err(Error::Protocol(format!(
            "transfer length must be 1..={MAX_CHUNK} bytes, got {len}"
        )));
    }
    Ok(())
}
