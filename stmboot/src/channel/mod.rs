//! Byte channel abstraction over the physical serial link.
//!
//! The protocol layer never touches the serial port directly. It talks to a
//! [`ByteChannel`], which turns the chunked, asynchronous byte stream of a
//! UART into exact-size blocking reads:
//!
//! ```text
//! +--------------------+
//! |  BootloaderSession |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |  ByteChannel trait |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+     +------------------+
//! |   SerialChannel    | --- | reader thread    |
//! |   (serialport)     |     | -> ReceiveBuffer |
//! +--------------------+     +------------------+
//! ```
//!
//! Reads are exact: `read_exact(n)` either returns precisely `n` bytes in
//! arrival order or fails, leaving already-arrived bytes buffered for the
//! next read. At most one read may be pending at a time; a second concurrent
//! read is a usage error, not a race to be resolved.

mod buffer;
mod serial;

pub(crate) use buffer::ReceiveBuffer;
pub use serial::{available_ports, PortInfo, SerialChannel, DEFAULT_BAUD};

use std::time::Duration;

use crate::error::Result;

/// A bidirectional byte stream with exact-size reads and control lines.
pub trait ByteChannel {
    /// Write all bytes and flush the underlying transport.
    ///
    /// The bootloader link is half-duplex: this must not return `Ok` until
    /// every byte has actually been handed to the wire, otherwise a
    /// subsequent read could race an unsent command.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read exactly `len` bytes, in arrival order.
    ///
    /// Returns immediately if enough bytes are already buffered; otherwise
    /// blocks until they arrive, the optional `timeout` elapses
    /// ([`Error::Timeout`](crate::Error::Timeout), buffered bytes retained),
    /// or the connection closes
    /// ([`Error::ConnectionClosed`](crate::Error::ConnectionClosed)).
    fn read_exact(&mut self, len: usize, timeout: Option<Duration>) -> Result<Vec<u8>>;

    /// Set the RTS and DTR control lines, used to drive target reset and
    /// boot-mode selection.
    fn set_lines(&mut self, rts: bool, dtr: bool) -> Result<()>;

    /// Close the channel and release the port.
    fn close(&mut self) -> Result<()>;
}
