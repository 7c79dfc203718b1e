use crate::error::{FormatError, Result};
use crate::header::image::payload_size_of;
use crate::header::{ImageHeader, IMAGE_HDR_SIZE};
use std::io::Read;
use std::path::{Path, PathBuf};

/// A header followed by its payload, loaded fully into memory.
#[derive(Debug, Clone)]
pub struct Image {
    pub path: PathBuf,
    pub header: ImageHeader,
    pub payload: Vec<u8>,
}

impl Image {
    /// Loads and validates an image. Magic and version mismatches are errors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(&path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let header = ImageHeader::decode(&buf)?;
        let payload = buf.split_off(IMAGE_HDR_SIZE);
        log::debug!(
            "Loaded {}: header says {} bytes, {} follow",
            path.as_ref().display(),
            header.payload_size,
            payload.len()
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            header,
            payload,
        })
    }

    /// Size the header should carry for the payload actually present.
    pub fn actual_payload_size(&self) -> std::result::Result<u32, FormatError> {
        payload_size_of(&self.payload)
    }

    /// True when the size field matches the payload length.
    pub fn is_consistent(&self) -> bool {
        self.header.payload_size as usize == self.payload.len()
    }

    pub fn total_size(&self) -> usize {
        IMAGE_HDR_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::header::BuildId;

    #[test]
    fn open_splits_header_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.img");
        let header = ImageHeader::new(3, 0x1000, BuildId::new("r1").unwrap());
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(&[7, 8, 9]);
        std::fs::write(&path, &bytes).unwrap();

        let image = Image::open(&path).unwrap();
        assert_eq!(image.header, header);
        assert_eq!(image.payload, vec![7, 8, 9]);
        assert!(image.is_consistent());
        assert_eq!(image.total_size(), 99);
    }

    #[test]
    fn open_reports_stale_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.img");
        let mut bytes = ImageHeader::new(1, 0, BuildId::default()).encode().to_vec();
        bytes.extend_from_slice(&[0; 5]);
        std::fs::write(&path, &bytes).unwrap();

        let image = Image::open(&path).unwrap();
        assert!(!image.is_consistent());
        assert_eq!(image.actual_payload_size().unwrap(), 5);
    }

    #[test]
    fn open_rejects_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.img");
        std::fs::write(&path, [0xa3, 0x9c, 1, 0]).unwrap();
        assert!(matches!(
            Image::open(&path),
            Err(Error::Format(FormatError::TooShort { actual: 4, .. }))
        ));
    }
}
