pub mod error;
pub mod header;
pub mod image;
pub mod inspect;
pub mod patch;
pub mod signer;
pub mod synth;

pub use error::*;
pub use header::{
    BuildId, Field, ImageHeader, ImageSignature, IMAGE_HDR_MAGIC, IMAGE_HDR_SIZE,
    IMAGE_HDR_VERSION,
};
pub use image::*;
pub use inspect::*;
pub use patch::*;
pub use signer::*;
pub use synth::*;
