//! Wire-format definitions for microTCP segments.
//!
//! Every datagram exchanged between peers is a serialised [`Segment`] (a
//! "bitstream").  This module is responsible for:
//! - Defining the on-wire binary layout (header fields, control bits, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], rejecting
//!   truncated, padded or corrupted input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Control Bits           |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Data Length                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Reserved (x3)                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Checksum (CRC-32)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 32 bytes.
//! seq(4) + ack(4) + control(2) + window(2) + data_len(4) + reserved(12) + checksum(4)

/// Bit-flag constants for the `control` header field.
pub mod flags {
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 1 << 12;
    /// Reset the connection (declared, never sent by this implementation).
    pub const RST: u16 = 1 << 13;
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u16 = 1 << 14;
    /// Finish: sender has no more data to send.
    pub const FIN: u16 = 1 << 15;

    /// Human-readable rendering used in log lines, e.g. `SYN|ACK`.
    pub fn describe(control: u16) -> String {
        let names: Vec<&str> = [(SYN, "SYN"), (FIN, "FIN"), (RST, "RST"), (ACK, "ACK")]
            .iter()
            .filter(|(bit, _)| control & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "NONE".to_string()
        } else {
            names.join("|")
        }
    }
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 32;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CONTROL: usize = 8;
const OFF_WINDOW: usize = 10;
const OFF_DATA_LEN: usize = 12;
const OFF_RESERVED: usize = 16;
const OFF_CHECKSUM: usize = 28;

/// Fixed-size segment header.
///
/// Fields are in host byte order; [`Segment::encode`] converts to big-endian
/// on the wire and [`Segment::decode`] converts back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// Sequence number.  For data segments, the number of the first payload
    /// byte; for SYN segments, the initial sequence number.
    pub seq: u32,
    /// Acknowledgement number (next sequence number expected from the peer).
    pub ack: u32,
    /// Bitmask of [`flags`] constants.
    pub control: u16,
    /// Advertised receive window in bytes.
    pub window: u16,
    /// Length of the payload in bytes.
    ///
    /// On encode this is computed from the actual payload length.
    /// On decode this is validated against the bytes actually received.
    pub data_len: u32,
    /// Reserved for future use; zero on every segment we build.
    pub reserved: [u32; 3],
    /// CRC-32 over the serialised segment with this field zeroed.
    pub checksum: u32,
}

impl Header {
    /// `true` when every bit in `mask` is set.
    pub fn has(&self, mask: u16) -> bool {
        self.control & mask == mask
    }

    /// `true` when the control field is exactly `mask` and nothing else.
    pub fn is_exactly(&self, mask: u16) -> bool {
        self.control == mask
    }
}

/// A complete protocol segment: header + payload bytes.
///
/// An empty `payload` is the only representation of a segment without data,
/// so `header.data_len == payload.len()` holds for every decoded segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Build a segment ready for [`encode`](Self::encode).
    pub fn new(seq: u32, ack: u32, control: u16, window: u16, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                seq,
                ack,
                control,
                window,
                data_len: payload.len() as u32,
                reserved: [0; 3],
                checksum: 0,
            },
            payload,
        }
    }

    /// Length of the serialised form: header plus payload, no padding.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialise this segment into a newly allocated bitstream.
    ///
    /// `header.data_len` and `header.checksum` are computed from the actual
    /// payload; any values already stored in those fields are ignored.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack.to_be_bytes());
        buf[OFF_CONTROL..OFF_CONTROL + 2].copy_from_slice(&self.header.control.to_be_bytes());
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.header.window.to_be_bytes());
        buf[OFF_DATA_LEN..OFF_DATA_LEN + 4]
            .copy_from_slice(&(self.payload.len() as u32).to_be_bytes());
        for (i, word) in self.header.reserved.iter().enumerate() {
            let off = OFF_RESERVED + i * 4;
            buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
        }
        // Checksum field stays zero while the CRC is computed.
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let crc = crc32(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&crc.to_be_bytes());

        buf
    }

    /// Parse a [`Segment`] from the bytes actually read off the transport.
    ///
    /// `data_len` is untrusted: the payload copy is bounded by `buf.len()`.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`] or than `data_len` claims,
    /// - `buf` carries bytes past the declared payload, or
    /// - the checksum does not verify.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let data_len = read_u32(buf, OFF_DATA_LEN);
        let available = buf.len() - HEADER_LEN;
        let declared = data_len as usize;
        if declared > available {
            return Err(PacketError::Truncated {
                expected: HEADER_LEN.saturating_add(declared),
                actual: buf.len(),
            });
        }
        if declared < available {
            return Err(PacketError::Corrupted {
                declared,
                actual: available,
            });
        }

        let checksum = read_u32(buf, OFF_CHECKSUM);
        let computed = checksum_with_zeroed_field(buf);
        if computed != checksum {
            return Err(PacketError::ChecksumInvalid {
                carried: checksum,
                computed,
            });
        }

        Ok(Segment {
            header: Header {
                seq: read_u32(buf, OFF_SEQ),
                ack: read_u32(buf, OFF_ACK),
                control: read_u16(buf, OFF_CONTROL),
                window: read_u16(buf, OFF_WINDOW),
                data_len,
                reserved: [
                    read_u32(buf, OFF_RESERVED),
                    read_u32(buf, OFF_RESERVED + 4),
                    read_u32(buf, OFF_RESERVED + 8),
                ],
                checksum,
            },
            payload: buf[HEADER_LEN..HEADER_LEN + declared].to_vec(),
        })
    }
}

/// Read the control bits of a bitstream without validating it.
///
/// Returns `None` when `buf` is too short to hold a header.
pub fn peek_control(buf: &[u8]) -> Option<u16> {
    (buf.len() >= HEADER_LEN).then(|| read_u16(buf, OFF_CONTROL))
}

/// Read the payload length a bitstream claims, without validating it.
pub fn peek_data_len(buf: &[u8]) -> Option<u32> {
    (buf.len() >= HEADER_LEN).then(|| read_u32(buf, OFF_DATA_LEN))
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Fewer bytes than the header (or the declared payload) requires.
    #[error("truncated segment: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// More payload bytes present than `data_len` declares.
    #[error("corrupted segment: data_len {declared} but {actual} payload bytes present")]
    Corrupted { declared: usize, actual: usize },
    /// Checksum did not match the recomputed value.
    #[error("checksum mismatch: carried {carried:#010x}, computed {computed:#010x}")]
    ChecksumInvalid { carried: u32, computed: u32 },
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// CRC-32 of `buf` as if its checksum field were zero.
fn checksum_with_zeroed_field(buf: &[u8]) -> u32 {
    let crc = crc32_update(!0, &buf[..OFF_CHECKSUM]);
    let crc = crc32_update(crc, &[0u8; 4]);
    !crc32_update(crc, &buf[OFF_CHECKSUM + 4..])
}

// ---------------------------------------------------------------------------
// CRC-32 (IEEE 802.3, reflected)
// ---------------------------------------------------------------------------

const CRC32_POLY: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ u32::from(byte)) & 0xff) as usize] ^ (crc >> 8);
    }
    crc
}

/// Compute the CRC-32 of `data`.
///
/// The caller must zero any checksum field within `data` first.
pub fn crc32(data: &[u8]) -> u32 {
    !crc32_update(!0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Largest payload that fits the default 1400-byte MSS.
    const MSS_PAYLOAD: usize = 1400 - HEADER_LEN;

    #[test]
    fn crc32_check_value() {
        // Standard check value for CRC-32/ISO-HDLC.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let seg = Segment::new(42, 7, flags::SYN, 4096, b"hello".to_vec());
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.header.seq, 42);
        assert_eq!(decoded.header.ack, 7);
        assert_eq!(decoded.header.control, flags::SYN);
        assert_eq!(decoded.header.window, 4096);
        assert_eq!(decoded.header.data_len, 5);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn roundtrip_across_payload_sizes() {
        for len in [0, 1, 31, 32, 33, 512, MSS_PAYLOAD - 1, MSS_PAYLOAD] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let seg = Segment::new(1, 2, flags::ACK, 8192, payload.clone());
            let decoded = Segment::decode(&seg.encode()).unwrap();
            assert_eq!(decoded.payload, payload, "len {len}");
            assert_eq!(decoded.header.data_len as usize, len);
        }
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let bytes = Segment::new(0, 0, 0, 0, b"exactly twelve!".to_vec()).encode();
        assert_eq!(bytes.len(), HEADER_LEN + 15);
    }

    #[test]
    fn header_len_constant_is_correct() {
        // seq(4) + ack(4) + control(2) + window(2) + data_len(4) + reserved(12) + checksum(4)
        assert_eq!(HEADER_LEN, 32);
        assert_eq!(OFF_CHECKSUM + 4, HEADER_LEN);
    }

    #[test]
    fn control_bits_on_wire() {
        let bytes = Segment::new(0, 0, flags::SYN | flags::ACK, 0, vec![]).encode();
        assert_eq!(read_u16(&bytes, OFF_CONTROL), 0x5000);
        assert_eq!(peek_control(&bytes), Some(flags::SYN | flags::ACK));
        assert_eq!(flags::describe(flags::SYN | flags::ACK), "SYN|ACK");
        assert_eq!(flags::describe(flags::FIN | flags::ACK), "FIN|ACK");
    }

    #[test]
    fn seq_ack_big_endian_on_wire() {
        let bytes = Segment::new(0x0102_0304, 0x0506_0708, 0, 0, vec![]).encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn checksum_covers_zeroed_header_and_payload() {
        let bytes = Segment::new(9, 9, flags::ACK, 100, b"abc".to_vec()).encode();
        let mut scratch = bytes.clone();
        scratch[OFF_CHECKSUM..OFF_CHECKSUM + 4].fill(0);
        assert_eq!(crc32(&scratch), read_u32(&bytes, OFF_CHECKSUM));
    }

    #[test]
    fn decode_empty_buffer_is_truncated() {
        assert!(matches!(
            Segment::decode(&[]),
            Err(PacketError::Truncated { actual: 0, .. })
        ));
    }

    #[test]
    fn decode_short_header_is_truncated() {
        assert!(matches!(
            Segment::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_never_reads_past_received_bytes() {
        let mut bytes = Segment::new(0, 0, flags::ACK, 0, b"data".to_vec()).encode();
        bytes.pop(); // data_len still claims 4 bytes
        assert_eq!(
            Segment::decode(&bytes),
            Err(PacketError::Truncated {
                expected: HEADER_LEN + 4,
                actual: HEADER_LEN + 3
            })
        );

        // A hostile data_len far beyond the buffer.
        let mut bytes = Segment::new(0, 0, 0, 0, vec![]).encode();
        bytes[OFF_DATA_LEN..OFF_DATA_LEN + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            Segment::decode(&bytes),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_trailing_bytes_is_corrupted() {
        let mut bytes = Segment::new(0, 0, flags::ACK, 0, b"data".to_vec()).encode();
        bytes.push(0xAA);
        assert_eq!(
            Segment::decode(&bytes),
            Err(PacketError::Corrupted {
                declared: 4,
                actual: 5
            })
        );
    }

    #[test]
    fn flipped_header_byte_fails_checksum() {
        let mut bytes = Segment::new(99, 0, flags::SYN, 1024, b"test".to_vec()).encode();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Segment::decode(&bytes),
            Err(PacketError::ChecksumInvalid { .. })
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut bytes = Segment::new(99, 0, flags::ACK, 1024, b"payload".to_vec()).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            Segment::decode(&bytes),
            Err(PacketError::ChecksumInvalid { .. })
        ));
    }

    #[test]
    fn every_single_byte_flip_is_detected() {
        let original = Segment::new(0xDEAD_BEEF, 17, flags::ACK, 512, b"microtcp".to_vec()).encode();
        for i in 0..original.len() {
            // The data_len field is caught by the length checks instead.
            if (OFF_DATA_LEN..OFF_DATA_LEN + 4).contains(&i) {
                continue;
            }
            let mut bytes = original.clone();
            bytes[i] ^= 0x5A;
            assert!(Segment::decode(&bytes).is_err(), "flip at byte {i} went unnoticed");
        }
    }

    #[test]
    fn empty_payload_roundtrip() {
        let seg = Segment::new(0, 1000, flags::ACK, u16::MAX, vec![]);
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.header.data_len, 0);
    }

    #[test]
    fn reserved_words_survive_roundtrip() {
        let mut seg = Segment::new(5, 6, flags::ACK, 10, vec![1]);
        seg.header.reserved = [1, 2, 3];
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.header.reserved, [1, 2, 3]);
    }
}
