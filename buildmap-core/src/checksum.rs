use flate2::Crc;

pub const TRAILER_LEN: usize = 4;

/// Standard CRC-32 (the zlib/PNG polynomial).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

/// Appends the CRC of everything in `out` as a little-endian trailer.
pub fn append_trailer(out: &mut Vec<u8>) {
    let crc = crc32(out);
    out.extend_from_slice(&crc.to_le_bytes());
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChecksumStatus {
    Valid(u32),
    Mismatch { stored: u32, computed: u32 },
    /// Too short to hold a trailer at all.
    Missing,
}

impl ChecksumStatus {
    pub fn is_valid(self) -> bool {
        matches!(self, ChecksumStatus::Valid(_))
    }
}

/// Checks the trailing CRC of a complete file buffer. The reader never calls
/// this; a mismatch is for the caller to report.
pub fn verify(bytes: &[u8]) -> ChecksumStatus {
    if bytes.len() < TRAILER_LEN {
        return ChecksumStatus::Missing;
    }
    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32(body);
    if stored == computed {
        ChecksumStatus::Valid(stored)
    } else {
        ChecksumStatus::Mismatch { stored, computed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn trailer_verifies() {
        let mut out = b"BLM\x1a\x00\x07".to_vec();
        append_trailer(&mut out);
        assert_eq!(out.len(), 10);
        assert!(verify(&out).is_valid());
    }

    #[test]
    fn flipped_byte_is_reported_not_fatal() {
        let mut out = vec![1, 2, 3, 4, 5];
        append_trailer(&mut out);
        out[2] ^= 0x40;
        match verify(&out) {
            ChecksumStatus::Mismatch { stored, computed } => assert_ne!(stored, computed),
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(verify(&[1, 2]), ChecksumStatus::Missing);
    }
}
