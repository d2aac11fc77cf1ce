//! Firmware image loaders.
//!
//! An image is an ordered list of [`Block`]s, each a contiguous run of bytes
//! destined for one target address. Two producers exist:
//!
//! - [`HexImage`](hex::HexImage): Intel HEX text files, one block per DATA
//!   record, with 32-bit extended linear addressing.
//! - [`BinImage`](bin::BinImage): raw binaries chunked into fixed-size
//!   blocks from a base address.
//!
//! Blocks preserve source order and are never coalesced; the upload pipeline
//! consumes them one at a time.

pub mod bin;
pub mod hex;

/// A contiguous run of bytes destined for one target memory address.
///
/// The unit of transfer in the upload pipeline. Read-only once handed to the
/// flasher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Absolute 32-bit target address.
    pub address: u32,
    /// Payload bytes. Never empty for blocks produced by the loaders.
    pub data: Vec<u8>,
}

impl Block {
    /// Create a block.
    pub fn new(address: u32, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
