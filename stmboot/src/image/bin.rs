//! Raw binary image loader.
//!
//! A raw binary carries no addressing information: the file is chunked into
//! fixed-size blocks starting at a configured base address, consecutive
//! blocks incrementing by the block size. The final short block, if any, is
//! kept at its actual length.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::image::Block;

/// Default base address: start of on-chip flash.
pub const DEFAULT_BASE_ADDRESS: u32 = 0x0800_0000;

/// Default transfer block size.
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// A raw binary image chunked into fixed-size blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinImage {
    /// Blocks in file order.
    pub blocks: Vec<Block>,
}

impl BinImage {
    /// Load a raw binary with the default base address and block size.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_at(path, DEFAULT_BASE_ADDRESS, DEFAULT_BLOCK_SIZE)
    }

    /// Load a raw binary chunked into `block_size`-byte blocks from `base`.
    pub fn from_file_at<P: AsRef<Path>>(path: P, base: u32, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| Error::InvalidImage(format!("{}: {e}", path.display())))?;
        let image = Self::from_bytes(&data, base, block_size)?;
        debug!(
            "Chunked {} into {} block(s) from {base:#010x}",
            path.display(),
            image.blocks.len()
        );
        Ok(image)
    }

    /// Chunk a byte buffer into blocks.
    pub fn from_bytes(data: &[u8], base: u32, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidImage("block size must be non-zero".into()));
        }

        let blocks = data
            .chunks(block_size)
            .enumerate()
            .map(|(i, chunk)| {
                Block::new(base + (i * block_size) as u32, chunk.to_vec())
            })
            .collect();

        Ok(Self { blocks })
    }
}
