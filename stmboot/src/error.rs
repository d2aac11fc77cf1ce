//! Error types for stmboot.

use std::io;
use thiserror::Error;

/// Result type for stmboot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for stmboot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error (open, control lines).
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A pending read was not satisfied before its deadline. Bytes that
    /// already arrived stay buffered for the next read.
    #[error("read timed out waiting for {wanted} byte(s), {buffered} buffered")]
    Timeout {
        /// Number of bytes the read asked for.
        wanted: usize,
        /// Number of bytes buffered when the deadline elapsed.
        buffered: usize,
    },

    /// A read was issued while another read was still pending.
    #[error("another read is already in progress")]
    ReadInProgress,

    /// The connection closed while a read was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The bootloader rejected a command or data frame.
    #[error("bootloader NACK for command {opcode:#04x} (response {response:#04x})")]
    Nack {
        /// Opcode of the command the frame belonged to.
        opcode: u8,
        /// The byte the bootloader answered with.
        response: u8,
    },

    /// The reset/sync sequence did not produce a usable bootloader.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An operation was attempted on a closed session.
    #[error("session is closed")]
    SessionClosed,

    /// Protocol usage error (oversized chunk, zero-length transfer).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A HEX record carried an unknown record type.
    #[error("invalid record type ({0})")]
    InvalidRecordType(u8),

    /// The image file is missing, unreadable, or malformed.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Read-back data did not match what was written.
    #[error("verify mismatch at {address:#010x}")]
    VerifyMismatch {
        /// Target address of the block that failed verification.
        address: u32,
    },

    /// The operation was interrupted by the embedding application.
    #[error("interrupted")]
    Interrupted,
}
