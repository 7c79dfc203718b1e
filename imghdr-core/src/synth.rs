use crate::error::{Error, Result};
use crate::header::image::payload_size_of;
use crate::header::{BuildId, ImageHeader, ImageSignature, IMAGE_HDR_SIZE};
use crate::signer::{sign_optional, KeyHandle, SignOutcome, Signer};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metadata for a header built from scratch.
#[derive(Debug, Clone, Default)]
pub struct SynthRequest {
    /// Defaults to the input path with an `.img` extension.
    pub output: Option<PathBuf>,
    pub entrypoint: u64,
    pub build_id: BuildId,
    pub key: Option<KeyHandle>,
}

#[derive(Debug)]
pub struct SynthReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub header: ImageHeader,
    pub sign: SignOutcome,
    pub total_size: usize,
}

pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("img")
}

/// Compares resolved paths so `a/../fw.bin` or a symlink still matches `fw.bin`.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Builds the header for a raw payload. A failed signature leaves the slot zeroed.
pub fn build_header(
    payload: &[u8],
    req: &SynthRequest,
    signer: &dyn Signer,
) -> Result<(ImageHeader, SignOutcome)> {
    let mut header = ImageHeader::new(payload_size_of(payload)?, req.entrypoint, req.build_id);
    let sign = sign_optional(signer, payload, req.key.as_ref());
    header.signature = match sign.signature() {
        Some(sig) => *sig,
        None => {
            if sign.error().is_some() {
                log::warn!("Using zero signature");
            }
            ImageSignature::ZERO
        }
    };
    Ok((header, sign))
}

/// Wraps the headerless payload at `input` into a new image file.
///
/// The input file is only read.
pub fn synthesize<P: AsRef<Path>>(
    input: P,
    req: &SynthRequest,
    signer: &dyn Signer,
) -> Result<SynthReport> {
    let input = input.as_ref();
    let output = req
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(input));
    if is_same_file(&output, input) {
        return Err(Error::OutputIsInput(output));
    }

    let payload = std::fs::read(input)?;
    let (header, sign) = build_header(&payload, req, signer)?;

    let mut file = std::fs::File::create(&output)?;
    file.write_all(&header.encode())?;
    file.write_all(&payload)?;
    file.flush()?;

    log::info!(
        "Image header added: {} -> {}",
        input.display(),
        output.display()
    );

    let total_size = IMAGE_HDR_SIZE + payload.len();
    Ok(SynthReport {
        input: input.to_path_buf(),
        output,
        header,
        sign,
        total_size,
    })
}
