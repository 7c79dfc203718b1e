pub mod image;

pub use image::{BuildId, ImageHeader, ImageSignature};

use std::ops::Range;

/// Total size of the header in bytes. Never varies.
pub const IMAGE_HDR_SIZE: usize = 96;
pub const IMAGE_HDR_MAGIC: u16 = 0x9ca3;
pub const IMAGE_HDR_VERSION: u16 = 1;

pub const BUILD_ID_LEN: usize = 8;
/// One byte of the build id slot is reserved for the NUL terminator.
pub const BUILD_ID_MAX_CHARS: usize = BUILD_ID_LEN - 1;
pub const SIGNATURE_LEN: usize = 64;

/// Fields of the on-disk header, in layout order.
///
/// ```text
/// offset  size  field
///      0     2  magic
///      2     2  version
///      4     4  payload_size
///      8     8  entrypoint
///     16     8  build_id
///     24    64  signature
///     88     8  (zero)
/// ```
///
/// All integers are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Magic,
    Version,
    PayloadSize,
    Entrypoint,
    BuildId,
    Signature,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Magic,
        Field::Version,
        Field::PayloadSize,
        Field::Entrypoint,
        Field::BuildId,
        Field::Signature,
    ];

    pub const fn offset(self) -> usize {
        match self {
            Field::Magic => 0,
            Field::Version => 2,
            Field::PayloadSize => 4,
            Field::Entrypoint => 8,
            Field::BuildId => 16,
            Field::Signature => 24,
        }
    }

    pub const fn len(self) -> usize {
        match self {
            Field::Magic | Field::Version => 2,
            Field::PayloadSize => 4,
            Field::Entrypoint => 8,
            Field::BuildId => BUILD_ID_LEN,
            Field::Signature => SIGNATURE_LEN,
        }
    }

    pub fn range(self) -> Range<usize> {
        self.offset()..self.offset() + self.len()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::Magic => "magic",
            Field::Version => "version",
            Field::PayloadSize => "payload_size",
            Field::Entrypoint => "entrypoint",
            Field::BuildId => "build_id",
            Field::Signature => "signature",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_contiguous_and_fit_the_header() {
        let mut next = 0;
        for field in Field::ALL {
            assert_eq!(field.offset(), next, "{field} is not contiguous");
            next = field.range().end;
        }
        assert_eq!(next, 88);
        assert!(next <= IMAGE_HDR_SIZE);
    }
}
