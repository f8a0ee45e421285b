use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// An encoded picture frame, as produced by an encoder.
///
/// Cloning is cheap: the bytes are shared, so the two tickets of a
/// 2D-in-3D split refer to one buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedData {
    bytes: Arc<[u8]>,
}

impl EncodedData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::new(fs::read(path)?))
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write to `temp` and rename onto `dest`, so `dest` is never seen half-written.
    pub fn write_via_temp(&self, temp: &Path, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(temp)?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        drop(file);
        fs::rename(temp, dest)
    }
}

impl From<Vec<u8>> for EncodedData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_bytes() {
        let a = EncodedData::new(vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(a.data().as_ptr(), b.data().as_ptr());
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_write_via_temp_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("j2c").join("0_0_both.j2c.tmp");
        let dest = dir.path().join("j2c").join("0_0_both.j2c");
        let data = EncodedData::new((0..=255).collect());

        std::fs::create_dir_all(temp.parent().unwrap()).unwrap();
        data.write_via_temp(&temp, &dest).unwrap();

        assert!(!temp.exists());
        assert_eq!(EncodedData::from_file(&dest).unwrap(), data);
    }

    #[test]
    fn test_from_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EncodedData::from_file(&dir.path().join("missing")).is_err());
    }
}
