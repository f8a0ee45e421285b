/// Where one written frame lives in a picture asset, and what it hashed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub offset: u64,
    pub size: u64,
    /// Lowercase hex SHA-1 of the frame bytes.
    pub hash: String,
}

const HASH_LEN: usize = 40;

impl FrameInfo {
    /// Size of one record in a frame-info file.
    pub const RECORD_SIZE: usize = 8 + 8 + HASH_LEN;

    pub fn to_record(&self) -> [u8; Self::RECORD_SIZE] {
        let mut record = [0u8; Self::RECORD_SIZE];
        record[0..8].copy_from_slice(&self.offset.to_le_bytes());
        record[8..16].copy_from_slice(&self.size.to_le_bytes());
        let hash = self.hash.as_bytes();
        let n = hash.len().min(HASH_LEN);
        record[16..16 + n].copy_from_slice(&hash[..n]);
        record
    }

    /// Parses a record; `None` for a never-written (all-zero) or malformed record.
    pub fn from_record(record: &[u8]) -> Option<Self> {
        if record.len() < Self::RECORD_SIZE || record.iter().all(|&b| b == 0) {
            return None;
        }
        let offset = u64::from_le_bytes(record[0..8].try_into().ok()?);
        let size = u64::from_le_bytes(record[8..16].try_into().ok()?);
        let hash = std::str::from_utf8(&record[16..Self::RECORD_SIZE]).ok()?;
        Some(Self {
            offset,
            size,
            hash: hash.trim_end_matches('\0').to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let info = FrameInfo {
            offset: 1234,
            size: 99,
            hash: "a".repeat(40),
        };
        assert_eq!(FrameInfo::from_record(&info.to_record()), Some(info));
    }

    #[test]
    fn test_zero_record_is_absent() {
        assert_eq!(FrameInfo::from_record(&[0u8; FrameInfo::RECORD_SIZE]), None);
    }

    #[test]
    fn test_short_record_is_absent() {
        assert_eq!(FrameInfo::from_record(&[1u8; 10]), None);
    }
}
