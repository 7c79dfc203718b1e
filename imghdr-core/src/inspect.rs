use crate::error::{FormatError, Result};
use crate::header::{ImageHeader, IMAGE_HDR_MAGIC, IMAGE_HDR_SIZE, IMAGE_HDR_VERSION};
use byteorder::{ReadBytesExt, LE};
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Things worth pointing out about a header that still parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectWarning {
    VersionMismatch { expected: u16, found: u16 },
    SizeMismatch { header: u32, actual: u64 },
}

impl std::fmt::Display for InspectWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InspectWarning::VersionMismatch { expected, found } => {
                write!(f, "Unexpected header version {found}, expected {expected}")
            }
            InspectWarning::SizeMismatch { header, actual } => write!(
                f,
                "Header payload size {header} does not match the {actual} bytes that follow it"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InspectReport {
    pub path: PathBuf,
    pub header: ImageHeader,
    pub file_size: u64,
    pub warnings: Vec<InspectWarning>,
}

/// Display form of every header field.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub magic: String,
    pub version: u16,
    pub payload_size: u32,
    pub entrypoint: String,
    pub build_id: String,
    pub signature: String,
    pub signed: bool,
    pub file_size: u64,
    pub warnings: Vec<String>,
}

impl InspectReport {
    pub fn summary(&self) -> HeaderSummary {
        let h = &self.header;
        HeaderSummary {
            magic: format!("0x{:04x}", h.magic),
            version: h.version,
            payload_size: h.payload_size,
            entrypoint: format!("0x{:016x}", h.entrypoint),
            build_id: h.build_id.display(),
            signature: format!("{}... (64 bytes total)", h.signature.preview()),
            signed: !h.signature.is_zero(),
            file_size: self.file_size,
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Reads the header at `path` for display.
///
/// The magic is checked on its own first; nothing past it is read unless it
/// matches. A foreign version only produces a warning.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<InspectReport> {
    let mut file = File::open(&path)?;
    let file_size = file.metadata()?.len();

    let magic = read_magic(&mut file, file_size)?;
    if magic != IMAGE_HDR_MAGIC {
        return Err(FormatError::BadMagic {
            expected: IMAGE_HDR_MAGIC,
            found: magic,
        }
        .into());
    }

    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::with_capacity(IMAGE_HDR_SIZE);
    file.by_ref().take(IMAGE_HDR_SIZE as u64).read_to_end(&mut buf)?;
    let header = ImageHeader::parse(&buf)?;

    let mut warnings = Vec::new();
    if header.version != IMAGE_HDR_VERSION {
        log::warn!("{} has header version {}", path.as_ref().display(), header.version);
        warnings.push(InspectWarning::VersionMismatch {
            expected: IMAGE_HDR_VERSION,
            found: header.version,
        });
    }
    let actual = file_size.saturating_sub(IMAGE_HDR_SIZE as u64);
    if u64::from(header.payload_size) != actual {
        warnings.push(InspectWarning::SizeMismatch {
            header: header.payload_size,
            actual,
        });
    }

    Ok(InspectReport {
        path: path.as_ref().to_path_buf(),
        header,
        file_size,
        warnings,
    })
}

fn read_magic<R: Read>(r: &mut R, file_size: u64) -> Result<u16> {
    if file_size < 2 {
        return Err(FormatError::TooShort {
            needed: 2,
            actual: file_size as usize,
        }
        .into());
    }
    Ok(r.read_u16::<LE>()?)
}
