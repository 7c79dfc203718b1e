use crate::error::{Error, FormatError};
use crate::header::{
    Field, BUILD_ID_LEN, BUILD_ID_MAX_CHARS, IMAGE_HDR_MAGIC, IMAGE_HDR_SIZE, IMAGE_HDR_VERSION,
    SIGNATURE_LEN,
};
use byteorder::{ByteOrder, ReadBytesExt, LE};
use std::io;

fn is_printable(b: u8) -> bool {
    b.is_ascii_graphic() || b == b' '
}

/// Short ASCII tag embedded in the header, usually a VCS revision.
///
/// Stored exactly as it sits on disk: at most 7 characters followed by NUL
/// padding up to 8 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BuildId([u8; BUILD_ID_LEN]);

impl BuildId {
    /// Builds an id from `s`, keeping only the first 7 bytes.
    pub fn new(s: &str) -> Result<Self, Error> {
        if !s.bytes().all(is_printable) {
            return Err(Error::InvalidBuildId(s.to_string()));
        }
        let mut raw = [0u8; BUILD_ID_LEN];
        let n = s.len().min(BUILD_ID_MAX_CHARS);
        raw[..n].copy_from_slice(&s.as_bytes()[..n]);
        Ok(Self(raw))
    }

    pub fn from_raw(raw: [u8; BUILD_ID_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; BUILD_ID_LEN] {
        &self.0
    }

    /// Printable prefix up to the first NUL. Non-printable bytes show as `.`.
    pub fn display(&self) -> String {
        self.0
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| {
                if is_printable(b) {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }
}

impl std::str::FromStr for BuildId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildId::new(s)
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Fixed 64-byte signature slot. All zeros means unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSignature([u8; SIGNATURE_LEN]);

impl ImageSignature {
    pub const ZERO: ImageSignature = ImageSignature([0u8; SIGNATURE_LEN]);

    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Hex of the first 8 bytes, space separated.
    pub fn preview(&self) -> String {
        self.0[..8]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ImageSignature {
    fn default() -> Self {
        Self::ZERO
    }
}

/// The 96-byte header that prefixes every firmware image.
///
/// Layout is described on [`Field`]. The struct never carries the padding
/// bytes; [`ImageHeader::encode`] always zero-fills them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u16,
    pub version: u16,
    /// Number of payload bytes following the header.
    pub payload_size: u32,
    /// Load and execution address of the payload.
    pub entrypoint: u64,
    pub build_id: BuildId,
    pub signature: ImageSignature,
}

impl ImageHeader {
    /// Fresh header with the current magic and version and an empty signature.
    pub fn new(payload_size: u32, entrypoint: u64, build_id: BuildId) -> Self {
        Self {
            magic: IMAGE_HDR_MAGIC,
            version: IMAGE_HDR_VERSION,
            payload_size,
            entrypoint,
            build_id,
            signature: ImageSignature::ZERO,
        }
    }

    /// Reads the raw fields without judging magic or version.
    ///
    /// Consumes exactly [`IMAGE_HDR_SIZE`] bytes from `cur`.
    pub fn from_reader<R: io::Read>(cur: &mut R) -> io::Result<ImageHeader> {
        let magic = cur.read_u16::<LE>()?;
        let version = cur.read_u16::<LE>()?;
        let payload_size = cur.read_u32::<LE>()?;
        let entrypoint = cur.read_u64::<LE>()?;

        let mut build_id = [0u8; BUILD_ID_LEN];
        cur.read_exact(&mut build_id)?;

        let mut signature = [0u8; SIGNATURE_LEN];
        cur.read_exact(&mut signature)?;

        let mut padding = [0u8; IMAGE_HDR_SIZE - Field::Signature.offset() - SIGNATURE_LEN];
        cur.read_exact(&mut padding)?;

        Ok(ImageHeader {
            magic,
            version,
            payload_size,
            entrypoint,
            build_id: BuildId::from_raw(build_id),
            signature: ImageSignature::from_bytes(signature),
        })
    }

    /// Parses the first 96 bytes of `bytes` without validation.
    pub fn parse(bytes: &[u8]) -> Result<ImageHeader, FormatError> {
        if bytes.len() < IMAGE_HDR_SIZE {
            return Err(FormatError::TooShort {
                needed: IMAGE_HDR_SIZE,
                actual: bytes.len(),
            });
        }
        let mut cur = &bytes[..IMAGE_HDR_SIZE];
        // A slice of exactly IMAGE_HDR_SIZE bytes cannot run dry.
        Self::from_reader(&mut cur).map_err(|_| FormatError::TooShort {
            needed: IMAGE_HDR_SIZE,
            actual: bytes.len(),
        })
    }

    /// Parses and validates a header. Trailing bytes past 96 are ignored.
    pub fn decode(bytes: &[u8]) -> Result<ImageHeader, FormatError> {
        let header = Self::parse(bytes)?;
        header.validate()?;
        Ok(header)
    }

    /// Magic is checked before version.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.magic != IMAGE_HDR_MAGIC {
            return Err(FormatError::BadMagic {
                expected: IMAGE_HDR_MAGIC,
                found: self.magic,
            });
        }
        if self.version != IMAGE_HDR_VERSION {
            return Err(FormatError::UnsupportedVersion {
                expected: IMAGE_HDR_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }

    pub fn encode(&self) -> [u8; IMAGE_HDR_SIZE] {
        let mut buf = [0u8; IMAGE_HDR_SIZE];
        LE::write_u16(&mut buf[Field::Magic.range()], self.magic);
        LE::write_u16(&mut buf[Field::Version.range()], self.version);
        LE::write_u32(&mut buf[Field::PayloadSize.range()], self.payload_size);
        LE::write_u64(&mut buf[Field::Entrypoint.range()], self.entrypoint);
        buf[Field::BuildId.range()].copy_from_slice(self.build_id.as_bytes());
        buf[Field::Signature.range()].copy_from_slice(self.signature.as_bytes());
        buf
    }

    /// Encoded bytes of a single field, as they sit in the header.
    pub fn field_bytes(&self, field: Field) -> Vec<u8> {
        self.encode()[field.range()].to_vec()
    }
}

/// Converts a payload length into the 32-bit size field.
pub fn payload_size_of(payload: &[u8]) -> Result<u32, FormatError> {
    u32::try_from(payload.len()).map_err(|_| FormatError::PayloadTooLarge(payload.len()))
}
