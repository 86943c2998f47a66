// Consistent Overhead Byte Stuffing.
//
// The encoded region contains no zero bytes, so a single 0x00 is an
// unambiguous frame delimiter on the wire.

/// Worst-case encoded size for `len` input bytes (one code byte per 254-byte
/// run, plus one leading code byte).
pub const fn max_encoded_len(len: usize) -> usize {
    len + len / 254 + 1
}

/// Encode `src` into `dst`. Returns the number of bytes written.
///
/// `dst` must be at least `max_encoded_len(src.len())` bytes.
pub fn encode(src: &[u8], dst: &mut [u8]) -> usize {
    let mut read = 0;
    let mut write = 1;
    let mut code_idx = 0;
    let mut code: u8 = 1;

    while read < src.len() {
        if src[read] == 0x00 {
            dst[code_idx] = code;
            code_idx = write;
            write += 1;
            code = 1;
        } else {
            dst[write] = src[read];
            write += 1;
            code += 1;
            if code == 0xFF {
                dst[code_idx] = code;
                code_idx = write;
                write += 1;
                code = 1;
            }
        }
        read += 1;
    }
    dst[code_idx] = code;
    write
}

/// Decode `src` (one frame, delimiter stripped) into `dst`.
///
/// Returns the decoded length, or `None` for a malformed frame (embedded
/// zero code byte or a run pointing past the end).
pub fn decode(src: &[u8], dst: &mut [u8]) -> Option<usize> {
    if src.is_empty() {
        return None;
    }

    let mut read = 0;
    let mut write = 0;

    while read < src.len() {
        let code = src[read];
        read += 1;
        if code == 0 {
            return None;
        }

        for _ in 1..code {
            if read >= src.len() || write >= dst.len() {
                return None;
            }
            dst[write] = src[read];
            write += 1;
            read += 1;
        }

        if code < 0xFF && read < src.len() {
            if write >= dst.len() {
                return None;
            }
            dst[write] = 0x00;
            write += 1;
        }
    }

    Some(write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn round_trip(input: &[u8]) {
        let mut enc = [0u8; 2048];
        let n = encode(input, &mut enc);
        assert!(n <= max_encoded_len(input.len()));
        assert!(
            enc[..n].iter().all(|&b| b != 0),
            "encoded region must be zero-free"
        );

        let mut dec = [0u8; 2048];
        let m = decode(&enc[..n], &mut dec).unwrap();
        assert_eq!(&dec[..m], input);
    }

    #[test]
    fn round_trips_exhaustive_shapes() {
        round_trip(&[]);
        round_trip(&[0x00]);
        round_trip(&[0x00, 0x00]);
        round_trip(&[0x11, 0x22, 0x00, 0x33]);
        round_trip(&[0x11, 0x00, 0x00, 0x00]);
        round_trip(b"hello world");

        // Length sweep around the 254-byte run boundary, both zero-free
        // and zero-studded payloads.
        for len in [1usize, 2, 63, 253, 254, 255, 300, 508, 509] {
            let zero_free: Vec<u8> = (0..len).map(|i| (i % 255) as u8 + 1).collect();
            round_trip(&zero_free);

            let studded: Vec<u8> = (0..len).map(|i| (i % 7) as u8).collect();
            round_trip(&studded);
        }
    }

    #[test]
    fn terminator_is_unique() {
        let input = [0x01, 0x00, 0x02];
        let mut enc = [0u8; 16];
        let n = encode(&input, &mut enc);
        enc[n] = 0x00;
        let frame = &enc[..n + 1];
        assert_eq!(frame.iter().filter(|&&b| b == 0).count(), 1);
        assert_eq!(frame[n], 0x00);
    }

    #[test]
    fn rejects_embedded_zero_code() {
        let mut dst = [0u8; 16];
        assert_eq!(decode(&[0x00, 0x01], &mut dst), None);
        assert_eq!(decode(&[0x05, 0x01], &mut dst), None); // run past end
    }
}
