// Record envelope build/parse and byte-stream reassembly.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::cobs;
use crate::crc::crc16;

/// Max raw record size between delimiters (before COBS decode). Sized for
/// the largest telemetry record (a 10 ms PCM chunk on the audio variant).
pub const MAX_FRAME: usize = 768;

/// v1 envelope overhead: type + seq:u8 + crc16.
const V1_OVERHEAD: usize = 1 + 1 + 2;
/// v2 envelope overhead: type + seq:u32 + t_src_us:u64 + crc16.
const V2_OVERHEAD: usize = 1 + 4 + 8 + 2;

pub const PROTOCOL_V1: u8 = 1;
pub const PROTOCOL_V2: u8 = 2;

// ---- TX side ----

/// Shared transmit state: negotiated envelope version plus the global
/// monotonic sequence counter (incremented per outgoing record, all types).
pub struct TxState {
    version: AtomicU8,
    seq: AtomicU32,
}

impl TxState {
    pub const fn new() -> Self {
        Self {
            version: AtomicU8::new(PROTOCOL_V1),
            seq: AtomicU32::new(0),
        }
    }

    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn version(&self) -> u8 {
        self.version.load(Ordering::Acquire)
    }

    /// Switch the negotiated version. Only 1 and 2 are accepted.
    pub fn set_version(&self, version: u8) -> bool {
        if version != PROTOCOL_V1 && version != PROTOCOL_V2 {
            return false;
        }
        self.version.store(version, Ordering::Release);
        true
    }
}

impl Default for TxState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build one wire packet (COBS-encoded record + 0x00 delimiter) into `out`,
/// using the envelope version negotiated in `tx`. Returns the wire length,
/// or 0 if the payload does not fit.
pub fn build(tx: &TxState, type_id: u8, t_src_us: u64, payload: &[u8], out: &mut [u8]) -> usize {
    let seq = tx.next_seq();
    build_with_seq(tx.version(), type_id, seq, t_src_us, payload, out)
}

/// Envelope builder with explicit version + sequence (the normal path is
/// [`build`]; this exists so tests can pin both).
pub fn build_with_seq(
    version: u8,
    type_id: u8,
    seq: u32,
    t_src_us: u64,
    payload: &[u8],
    out: &mut [u8],
) -> usize {
    let mut raw = [0u8; MAX_FRAME];
    let raw_len = if version == PROTOCOL_V2 {
        let total = V2_OVERHEAD + payload.len();
        if total > MAX_FRAME {
            return 0;
        }
        raw[0] = type_id;
        raw[1..5].copy_from_slice(&seq.to_le_bytes());
        raw[5..13].copy_from_slice(&t_src_us.to_le_bytes());
        raw[13..13 + payload.len()].copy_from_slice(payload);
        total
    } else {
        let total = V1_OVERHEAD + payload.len();
        if total > MAX_FRAME {
            return 0;
        }
        raw[0] = type_id;
        raw[1] = seq as u8;
        raw[2..2 + payload.len()].copy_from_slice(payload);
        total
    };

    let crc = crc16(&raw[..raw_len - 2]);
    raw[raw_len - 2..raw_len].copy_from_slice(&crc.to_le_bytes());

    if out.len() < cobs::max_encoded_len(raw_len) + 1 {
        return 0;
    }
    let encoded = cobs::encode(&raw[..raw_len], out);
    out[encoded] = 0x00;
    encoded + 1
}

// ---- RX side ----

/// A validated, decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPacket<'a> {
    pub type_id: u8,
    /// u32 in v2, zero-extended u8 in v1.
    pub seq: u32,
    /// Sender's monotonic clock at production time; 0 in v1.
    pub t_src_us: u64,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// COBS decode failed or the record is shorter than the envelope.
    Malformed,
    /// Integrity check mismatch.
    BadCrc,
}

/// Decode and validate one delimited frame. `version` selects the envelope
/// layout for the sequence-width decode.
pub fn parse<'a>(
    frame: &[u8],
    decode_buf: &'a mut [u8; MAX_FRAME],
    version: u8,
) -> Result<ParsedPacket<'a>, FrameError> {
    if frame.is_empty() || frame.len() > decode_buf.len() {
        return Err(FrameError::Malformed);
    }

    let decoded_len = cobs::decode(frame, decode_buf).ok_or(FrameError::Malformed)?;
    let overhead = if version == PROTOCOL_V2 { V2_OVERHEAD } else { V1_OVERHEAD };
    if decoded_len < overhead {
        return Err(FrameError::Malformed);
    }

    let crc_offset = decoded_len - 2;
    let received = u16::from_le_bytes([decode_buf[crc_offset], decode_buf[crc_offset + 1]]);
    let computed = crc16(&decode_buf[..crc_offset]);
    if received != computed {
        return Err(FrameError::BadCrc);
    }

    let record = &decode_buf[..crc_offset];
    if version == PROTOCOL_V2 {
        Ok(ParsedPacket {
            type_id: record[0],
            seq: u32::from_le_bytes([record[1], record[2], record[3], record[4]]),
            t_src_us: u64::from_le_bytes([
                record[5], record[6], record[7], record[8], record[9], record[10], record[11],
                record[12],
            ]),
            payload: &record[13..],
        })
    } else {
        Ok(ParsedPacket {
            type_id: record[0],
            seq: record[1] as u32,
            t_src_us: 0,
            payload: &record[2..],
        })
    }
}

// ---- Stream reassembly ----

/// Per-link receive counters, surfaced through HEARTBEAT.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkStats {
    pub frames_ok: u32,
    pub bad_crc: u32,
    pub malformed: u32,
    pub overruns: u32,
    pub unknown_type: u32,
}

/// Byte-stream reassembler: buffers bytes until the 0x00 delimiter, dropping
/// the remainder of overlong frames until the next delimiter.
pub struct Deframer {
    buf: [u8; MAX_FRAME],
    pos: usize,
    discard: bool,
    pub stats: LinkStats,
}

impl Deframer {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_FRAME],
            pos: 0,
            discard: false,
            stats: LinkStats {
                frames_ok: 0,
                bad_crc: 0,
                malformed: 0,
                overruns: 0,
                unknown_type: 0,
            },
        }
    }

    /// Feed one byte. Returns the length of a completed frame (retrieve it
    /// with [`Deframer::frame`] before the next push).
    pub fn push(&mut self, byte: u8) -> Option<usize> {
        if byte == 0x00 {
            let len = self.pos;
            let had_frame = len > 0 && !self.discard;
            self.pos = 0;
            self.discard = false;
            return if had_frame { Some(len) } else { None };
        }

        if self.discard {
            return None;
        }
        if self.pos < MAX_FRAME {
            self.buf[self.pos] = byte;
            self.pos += 1;
        } else {
            log::warn!("frame overflow, discarding until delimiter");
            self.stats.overruns += 1;
            self.discard = true;
        }
        None
    }

    /// The frame completed by the last [`Deframer::push`] that returned a length.
    pub fn frame(&self, len: usize) -> &[u8] {
        &self.buf[..len]
    }

    /// Feed a byte run, parsing each completed frame with `version` and
    /// invoking `on_packet` for every record that passes the CRC.
    pub fn feed<F: FnMut(&ParsedPacket<'_>)>(
        &mut self,
        bytes: &[u8],
        version: u8,
        mut on_packet: F,
    ) {
        let mut decode_buf = [0u8; MAX_FRAME];
        for &b in bytes {
            if let Some(len) = self.push(b) {
                match parse(&self.buf[..len], &mut decode_buf, version) {
                    Ok(pkt) => {
                        self.stats.frames_ok += 1;
                        on_packet(&pkt);
                    }
                    Err(FrameError::BadCrc) => {
                        log::debug!("dropped frame: bad crc");
                        self.stats.bad_crc += 1;
                    }
                    Err(FrameError::Malformed) => {
                        log::debug!("dropped frame: malformed");
                        self.stats.malformed += 1;
                    }
                }
            }
        }
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn wire(version: u8, type_id: u8, seq: u32, t_src: u64, payload: &[u8]) -> Vec<u8> {
        let mut out = [0u8; MAX_FRAME * 2];
        let n = build_with_seq(version, type_id, seq, t_src, payload, &mut out);
        assert!(n > 0);
        out[..n].to_vec()
    }

    #[test]
    fn v1_round_trip() {
        let w = wire(PROTOCOL_V1, 0x10, 0x42, 0, &[1, 2, 3, 4]);
        let mut buf = [0u8; MAX_FRAME];
        let pkt = parse(&w[..w.len() - 1], &mut buf, PROTOCOL_V1).unwrap();
        assert_eq!(pkt.type_id, 0x10);
        assert_eq!(pkt.seq, 0x42);
        assert_eq!(pkt.t_src_us, 0);
        assert_eq!(pkt.payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn v2_round_trip() {
        let w = wire(PROTOCOL_V2, 0x80, 0xDEAD_BEEF, 123_456_789_012, &[9; 27]);
        let mut buf = [0u8; MAX_FRAME];
        let pkt = parse(&w[..w.len() - 1], &mut buf, PROTOCOL_V2).unwrap();
        assert_eq!(pkt.seq, 0xDEAD_BEEF);
        assert_eq!(pkt.t_src_us, 123_456_789_012);
        assert_eq!(pkt.payload.len(), 27);
    }

    #[test]
    fn corrupt_frame_is_dropped() {
        // Build the raw record by hand, corrupt a payload byte after the CRC
        // was computed, then encode.
        let mut raw = [0x10u8, 0x01, 5, 6, 0, 0];
        let crc = crc16(&raw[..4]);
        raw[4..].copy_from_slice(&crc.to_le_bytes());
        raw[2] ^= 0x01;

        let mut enc = [0u8; 32];
        let n = cobs::encode(&raw, &mut enc);
        let mut buf = [0u8; MAX_FRAME];
        assert_eq!(
            parse(&enc[..n], &mut buf, PROTOCOL_V1),
            Err(FrameError::BadCrc)
        );
    }

    #[test]
    fn stream_with_garbage_prefix_yields_valid_frames() {
        let a = wire(PROTOCOL_V1, 0x10, 1, 0, &[1, 0, 1, 0]);
        let b = wire(PROTOCOL_V1, 0x11, 2, 0, &[]);

        let mut stream = Vec::new();
        stream.extend_from_slice(&[0xAB, 0xCD, 0xEF]); // garbage fragment
        stream.push(0x00);
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        let mut got = Vec::new();
        let mut df = Deframer::new();
        df.feed(&stream, PROTOCOL_V1, |pkt| got.push((pkt.type_id, pkt.seq)));

        assert_eq!(got, std::vec![(0x10, 1), (0x11, 2)]);
        assert_eq!(df.stats.frames_ok, 2);
        // The garbage region failed CRC or COBS decode, not silently accepted.
        assert_eq!(df.stats.bad_crc + df.stats.malformed, 1);
    }

    #[test]
    fn overlong_frame_discarded_to_next_delimiter() {
        let mut df = Deframer::new();
        for _ in 0..MAX_FRAME + 10 {
            assert_eq!(df.push(0x55), None);
        }
        assert_eq!(df.push(0x00), None); // the runt is dropped whole
        assert_eq!(df.stats.overruns, 1);

        let good = wire(PROTOCOL_V1, 0x12, 3, 0, &[]);
        let mut got = 0;
        df.feed(&good, PROTOCOL_V1, |_| got += 1);
        assert_eq!(got, 1);
    }

    #[test]
    fn negotiation_switches_tx_envelope_and_seq_is_monotonic() {
        let tx = TxState::new();
        assert_eq!(tx.version(), PROTOCOL_V1);
        assert!(tx.set_version(PROTOCOL_V2));
        assert!(!tx.set_version(9));

        let mut seqs = Vec::new();
        for _ in 0..3 {
            let mut out = [0u8; 128];
            let n = build(&tx, 0x80, 42, &[0; 4], &mut out);
            assert!(n > 0);
            let mut buf = [0u8; MAX_FRAME];
            let pkt = parse(&out[..n - 1], &mut buf, PROTOCOL_V2).unwrap();
            assert_eq!(pkt.t_src_us, 42);
            seqs.push(pkt.seq);
        }
        assert_eq!(seqs[1], seqs[0] + 1);
        assert_eq!(seqs[2], seqs[1] + 1);
    }
}
