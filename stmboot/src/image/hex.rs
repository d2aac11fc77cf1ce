//! Intel HEX image loader.
//!
//! Each text line is a record: `:LLAAAATT[DD...]CC` with `LL` the data byte
//! count, `AAAA` a 16-bit address, `TT` the record type, `DD` the data and
//! `CC` a checksum byte. DATA records become blocks at
//! `high_address + AAAA`, where `high_address` is the accumulator set by the
//! most recent Extended Linear Address record.
//!
//! The file is read one line at a time rather than loaded whole; images can
//! be large.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::image::Block;

/// Data record: emits a block.
const RECORD_DATA: u8 = 0;
/// End-of-file record: stops parsing, remaining lines are ignored.
const RECORD_EOF: u8 = 1;
/// Extended segment address: not produced by the toolchains targeted here.
const RECORD_EXT_SEGMENT_ADDR: u8 = 2;
/// Start segment address: ignored.
const RECORD_START_SEGMENT_ADDR: u8 = 3;
/// Extended linear address: supplies the upper 16 address bits.
const RECORD_EXT_LINEAR_ADDR: u8 = 4;
/// Start linear address: ignored.
const RECORD_START_LINEAR_ADDR: u8 = 5;

/// An Intel HEX image: ordered blocks reconstructed from line records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexImage {
    /// Blocks in file order, one per DATA record.
    pub blocks: Vec<Block>,
}

impl HexImage {
    /// Parse an Intel HEX file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::InvalidImage(format!("{}: {e}", path.display())))?;
        let image = Self::from_reader(BufReader::new(file))?;
        debug!(
            "Parsed {} with {} block(s)",
            path.display(),
            image.blocks.len()
        );
        Ok(image)
    }

    /// Parse Intel HEX records from a line-oriented reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut blocks = Vec::new();
        // Upper 16 address bits, persisting across the whole file.
        let mut high_address: u32 = 0;

        for line in reader.lines() {
            // Read failures (including non-UTF-8 content) are image errors,
            // matching what `from_file` reports for an unopenable file.
            let line = line.map_err(|e| Error::InvalidImage(format!("failed to read image: {e}")))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record = Record::parse(line)?;
            trace!(
                "Record type {} address {:#06x} ({} byte(s))",
                record.kind,
                record.address,
                record.data.len()
            );

            match record.kind {
                RECORD_DATA => {
                    if record.data.is_empty() {
                        continue;
                    }
                    blocks.push(Block::new(
                        high_address + u32::from(record.address),
                        record.data,
                    ));
                },
                RECORD_EOF => break,
                RECORD_EXT_SEGMENT_ADDR | RECORD_START_SEGMENT_ADDR
                | RECORD_START_LINEAR_ADDR => {},
                RECORD_EXT_LINEAR_ADDR => {
                    if record.data.len() != 2 {
                        return Err(Error::InvalidImage(format!(
                            "extended linear address record with {} data byte(s)",
                            record.data.len()
                        )));
                    }
                    high_address =
                        u32::from(u16::from_be_bytes([record.data[0], record.data[1]])) << 16;
                },
                other => return Err(Error::InvalidRecordType(other)),
            }
        }

        Ok(Self { blocks })
    }
}

/// One decoded HEX line.
struct Record {
    address: u16,
    kind: u8,
    data: Vec<u8>,
}

impl Record {
    fn parse(line: &str) -> Result<Self> {
        let body = line
            .strip_prefix(':')
            .ok_or_else(|| Error::InvalidImage(format!("record missing ':' prefix: {line}")))?;

        let count = usize::from(hex_byte(body, 0)?);
        let expected_len = 2 + 4 + 2 + count * 2 + 2;
        if body.len() < expected_len {
            return Err(Error::InvalidImage(format!(
                "record truncated: expected {expected_len} hex digits, got {}",
                body.len()
            )));
        }

        let address = u16::from(hex_byte(body, 2)?) << 8 | u16::from(hex_byte(body, 4)?);
        let kind = hex_byte(body, 6)?;

        let mut data = Vec::with_capacity(count);
        for i in 0..count {
            data.push(hex_byte(body, 8 + i * 2)?);
        }

        // Checksum byte is decoded but not verified.
        let _checksum = hex_byte(body, 8 + count * 2)?;

        Ok(Self {
            address,
            kind,
            data,
        })
    }
}

fn hex_byte(s: &str, offset: usize) -> Result<u8> {
    let digits = s
        .get(offset..offset + 2)
        .ok_or_else(|| Error::InvalidImage("record truncated".to_string()))?;
    u8::from_str_radix(digits, 16)
        .map_err(|_| Error::InvalidImage(format!("invalid hex digits '{digits}'")))
}
