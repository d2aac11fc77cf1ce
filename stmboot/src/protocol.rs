//! USART bootloader wire protocol frames.
//!
//! The factory bootloader (ST application note AN3155) frames every command
//! as the opcode followed by its bitwise complement, then answers each frame
//! with a single ACK byte. Payload frames additionally carry a trailing
//! checksum:
//!
//! ```text
//! command frame:      [ OP, ~OP ]                      -> 1 ACK byte
//! address frame:      [ A3, A2, A1, A0, XOR ]          -> 1 ACK byte
//! write data frame:   [ N-1, D0..Dn, XOR(N-1, D0..) ]  -> 1 ACK byte
//! read length frame:  [ N-1, ~(N-1) ]                  -> 1 ACK byte
//! ```
//!
//! The command-frame complement is the bootloader's command-integrity check,
//! distinct from the payload checksums.

use byteorder::{BigEndian, ByteOrder};

/// Synchronization byte opening the handshake.
pub const SYNC: u8 = 0x7F;

/// Acknowledge byte.
pub const ACK: u8 = 0x79;

/// Documented reject byte. Detection is deliberately loose: any response
/// other than [`ACK`] is treated as a rejection.
pub const NACK: u8 = 0x1F;

/// Largest payload a single write or read transaction may carry.
pub const MAX_CHUNK: usize = 256;

/// Bootloader command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Read up to 256 bytes of memory from a given address.
    ReadMemory = 0x11,
    /// Jump to application code at a given address.
    Go = 0x21,
    /// Write up to 256 bytes of memory at a given address.
    WriteMemory = 0x31,
    /// Erase flash memory (mass erase selector used here).
    Erase = 0x43,
}

impl Opcode {
    /// Bitwise complement of the opcode byte.
    pub fn complement(self) -> u8 {
        !(self as u8)
    }
}

/// Mass-erase payload: the global-erase selector plus its complement
/// checksum.
pub const ERASE_GLOBAL_FRAME: [u8; 2] = [0xFF, 0x00];

/// Running XOR of a byte slice.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Build the two-byte command frame for `op`.
pub fn command_frame(op: Opcode) -> [u8; 2] {
    [op as u8, op.complement()]
}

/// Build the address frame: 4 big-endian address bytes plus XOR checksum.
pub fn address_frame(address: u32) -> [u8; 5] {
    let mut frame = [0u8; 5];
    BigEndian::write_u32(&mut frame[..4], address);
    frame[4] = xor_checksum(&frame[..4]);
    frame
}

/// Build the write-memory data frame: `(len - 1)` byte, raw data, XOR
/// checksum over count byte and data.
///
/// `data` must hold between 1 and [`MAX_CHUNK`] bytes; the caller validates.
#[allow(clippy::cast_possible_truncation)]
pub fn write_data_frame(data: &[u8]) -> Vec<u8> {
    debug_assert!(!data.is_empty() && data.len() <= MAX_CHUNK);

    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.push((data.len() - 1) as u8);
    frame.extend_from_slice(data);
    frame.push(xor_checksum(&frame));
    frame
}

/// Build the read-memory length frame: `(len - 1)` byte plus its bitwise
/// complement. Unlike the write path this check is a complement, not an XOR.
#[allow(clippy::cast_possible_truncation)]
pub fn read_length_frame(len: usize) -> [u8; 2] {
    debug_assert!((1..=MAX_CHUNK).contains(&len));

    let count = (len - 1) as u8;
    [count, !count]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_is_opcode_and_complement() {
        assert_eq!(command_frame(Opcode::Erase), [0x43, 0xBC]);
        assert_eq!(command_frame(Opcode::WriteMemory), [0x31, 0xCE]);
        assert_eq!(command_frame(Opcode::ReadMemory), [0x11, 0xEE]);
        assert_eq!(command_frame(Opcode::Go), [0x21, 0xDE]);
    }

    #[test]
    fn test_address_frame_checksum() {
        // 0x08 ^ 0x00 ^ 0x40 ^ 0x00 = 0x48.
        assert_eq!(
            address_frame(0x0800_4000),
            [0x08, 0x00, 0x40, 0x00, 0x48]
        );
    }

    #[test]
    fn test_address_frame_zero_address() {
        assert_eq!(address_frame(0), [0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_write_data_frame_layout_and_checksum() {
        // length byte = 0x01 (n-1), checksum = 0x01 ^ 0x01 ^ 0x02 = 0x02.
        assert_eq!(
            write_data_frame(&[0x01, 0x02]),
            vec![0x01, 0x01, 0x02, 0x02]
        );
    }

    #[test]
    fn test_write_data_frame_single_byte() {
        assert_eq!(write_data_frame(&[0xFF]), vec![0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_data_frame_max_chunk() {
        let data = vec![0xAA; MAX_CHUNK];
        let frame = write_data_frame(&data);
        assert_eq!(frame.len(), MAX_CHUNK + 2);
        assert_eq!(frame[0], 0xFF);
        // 256 copies of 0xAA cancel out, leaving the count byte.
        assert_eq!(*frame.last().unwrap(), 0xFF);
    }

    #[test]
    fn test_read_length_frame_uses_complement_not_xor() {
        assert_eq!(read_length_frame(4), [0x03, 0xFC]);
        assert_eq!(read_length_frame(1), [0x00, 0xFF]);
        assert_eq!(read_length_frame(MAX_CHUNK), [0xFF, 0x00]);
    }

    #[test]
    fn test_erase_global_frame_checksum_is_complement() {
        assert_eq!(ERASE_GLOBAL_FRAME[1], !ERASE_GLOBAL_FRAME[0]);
    }

    #[test]
    fn test_xor_checksum_basics() {
        assert_eq!(xor_checksum(&[]), 0);
        assert_eq!(xor_checksum(&[0x55]), 0x55);
        assert_eq!(xor_checksum(&[0x55, 0x55]), 0);
        assert_eq!(xor_checksum(&[0x08, 0x00, 0x40, 0x00]), 0x48);
    }

    #[test]
    fn test_opcode_complements() {
        assert_eq!(Opcode::ReadMemory.complement(), 0xEE);
        assert_eq!(Opcode::Go.complement(), 0xDE);
        assert_eq!(Opcode::WriteMemory.complement(), 0xCE);
        assert_eq!(Opcode::Erase.complement(), 0xBC);
    }
}
