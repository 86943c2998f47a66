// Host-link transport shared by both MCUs.
//
// Packet on the wire:
//   [COBS-encoded record] [0x00 delimiter]
//
// Record (before COBS):
//   v1: [type:u8] [seq:u8]                       [data:N] [crc16:u16-LE]
//   v2: [type:u8] [seq:u32-LE] [t_src_us:u64-LE] [data:N] [crc16:u16-LE]
//
// CRC16-CCITT (poly 0x1021, init 0xFFFF) over everything preceding the CRC.
// Reliability lives above this layer: corrupt frames are counted and dropped,
// never NAKed.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod cmd;
pub mod cobs;
pub mod crc;
pub mod packet;
pub mod telemetry;

pub use cmd::CmdId;
pub use packet::{Deframer, ParsedPacket, TxState, MAX_FRAME};
