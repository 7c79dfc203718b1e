use crate::error::{Error, Result};
use crate::header::{Field, ImageHeader};
use crate::image::Image;
use crate::signer::{sign_optional, KeyHandle, SignOutcome, Signer};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Rewrite the size field, the entrypoint when overridden, and the
    /// signature when a key is supplied.
    Full,
    /// Rewrite only the signature. Requires a key.
    SignatureOnly,
}

#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub mode: PatchMode,
    pub key: Option<KeyHandle>,
    /// Ignored in [`PatchMode::SignatureOnly`].
    pub entrypoint: Option<u64>,
}

impl PatchRequest {
    pub fn full(key: Option<KeyHandle>, entrypoint: Option<u64>) -> Self {
        Self {
            mode: PatchMode::Full,
            key,
            entrypoint,
        }
    }

    pub fn signature_only(key: Option<KeyHandle>) -> Self {
        Self {
            mode: PatchMode::SignatureOnly,
            key,
            entrypoint: None,
        }
    }
}

/// One targeted write into the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub field: Field,
    pub bytes: Vec<u8>,
}

impl WriteCommand {
    fn for_field(header: &ImageHeader, field: Field) -> Self {
        Self {
            field,
            bytes: header.field_bytes(field),
        }
    }

    pub fn offset(&self) -> u64 {
        self.field.offset() as u64
    }
}

/// Writes a patch will perform, in the order they hit the file:
/// size, entrypoint, signature.
#[derive(Debug)]
pub struct PatchPlan {
    pub header: ImageHeader,
    pub commands: Vec<WriteCommand>,
    pub sign: SignOutcome,
    /// Header plus payload, in bytes.
    pub total_size: usize,
}

impl PatchPlan {
    pub fn writes(&self, field: Field) -> bool {
        self.commands.iter().any(|c| c.field == field)
    }
}

/// Works out which header fields change for `image`.
///
/// Nothing is written here, so any error leaves the file untouched.
pub fn plan_patch(image: &Image, req: &PatchRequest, signer: &dyn Signer) -> Result<PatchPlan> {
    if req.mode == PatchMode::SignatureOnly && req.key.is_none() {
        return Err(Error::MissingKey);
    }

    let payload_size = image.actual_payload_size()?;
    let sign = sign_optional(signer, &image.payload, req.key.as_ref());
    if req.mode == PatchMode::SignatureOnly {
        if let SignOutcome::Failed(e) = sign {
            return Err(e.into());
        }
    }

    let mut header = image.header;
    let mut commands = Vec::new();

    if req.mode == PatchMode::Full {
        if !image.is_consistent() {
            log::info!(
                "payload size changes from {} to {payload_size} bytes",
                image.header.payload_size
            );
        }
        header.payload_size = payload_size;
        commands.push(WriteCommand::for_field(&header, Field::PayloadSize));

        if let Some(entrypoint) = req.entrypoint {
            header.entrypoint = entrypoint;
            commands.push(WriteCommand::for_field(&header, Field::Entrypoint));
        }
    } else if req.entrypoint.is_some() {
        log::warn!("Entrypoint override ignored in signature-only mode");
    }

    match &sign {
        SignOutcome::Signed(sig) => {
            header.signature = *sig;
            commands.push(WriteCommand::for_field(&header, Field::Signature));
        }
        SignOutcome::Failed(_) => {
            log::warn!("Signature field will remain unchanged");
        }
        SignOutcome::NotRequested => {}
    }

    Ok(PatchPlan {
        header,
        commands,
        sign,
        total_size: image.total_size(),
    })
}

/// Performs each write as its own seek and write.
///
/// There is no transaction: if this fails part way, earlier fields are
/// already updated and later ones are stale.
pub fn apply_commands<W: Write + Seek>(out: &mut W, commands: &[WriteCommand]) -> Result<()> {
    for cmd in commands {
        out.seek(SeekFrom::Start(cmd.offset()))?;
        out.write_all(&cmd.bytes)?;
        log::debug!(
            "wrote {} ({} bytes at offset {})",
            cmd.field,
            cmd.bytes.len(),
            cmd.offset()
        );
    }
    out.flush()?;
    Ok(())
}

/// Patches the image at `path` in place.
///
/// Only the byte ranges of the updated fields are rewritten; the payload and
/// every other header byte stay as they are.
pub fn patch_image<P: AsRef<Path>>(
    path: P,
    req: &PatchRequest,
    signer: &dyn Signer,
) -> Result<PatchPlan> {
    if req.mode == PatchMode::SignatureOnly && req.key.is_none() {
        return Err(Error::MissingKey);
    }

    let image = Image::open(&path)?;
    let plan = plan_patch(&image, req, signer)?;

    let mut file = OpenOptions::new().write(true).open(&path)?;
    apply_commands(&mut file, &plan.commands)?;

    for cmd in &plan.commands {
        log::info!("{} field updated in {}", cmd.field, path.as_ref().display());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FormatError, SignError};
    use crate::header::{BuildId, ImageSignature, IMAGE_HDR_SIZE};
    use std::io::Cursor;

    struct FixedSigner(u8);

    impl Signer for FixedSigner {
        fn sign(&self, _: &[u8], _: &KeyHandle) -> std::result::Result<ImageSignature, SignError> {
            Ok(ImageSignature::from_bytes([self.0; 64]))
        }
    }

    struct BrokenSigner;

    impl Signer for BrokenSigner {
        fn sign(&self, _: &[u8], _: &KeyHandle) -> std::result::Result<ImageSignature, SignError> {
            Err(SignError::Primitive("boom".into()))
        }
    }

    fn image(payload_size: u32, payload: &[u8]) -> Image {
        Image {
            path: "fw.img".into(),
            header: ImageHeader::new(payload_size, 0x8000_0000, BuildId::new("abc").unwrap()),
            payload: payload.to_vec(),
        }
    }

    fn key() -> Option<KeyHandle> {
        Some(KeyHandle::new("key.pem"))
    }

    #[test]
    fn full_patch_without_key_only_touches_size() {
        let plan = plan_patch(&image(1, &[0; 10]), &PatchRequest::full(None, None), &FixedSigner(1))
            .unwrap();
        assert_eq!(
            plan.commands,
            vec![WriteCommand {
                field: Field::PayloadSize,
                bytes: 10u32.to_le_bytes().to_vec()
            }]
        );
        assert_eq!(plan.header.payload_size, 10);
        assert_eq!(plan.total_size, IMAGE_HDR_SIZE + 10);
    }

    #[test]
    fn full_patch_orders_size_entrypoint_signature() {
        let plan = plan_patch(
            &image(1, &[0; 4]),
            &PatchRequest::full(key(), Some(0x4002_0000)),
            &FixedSigner(0xab),
        )
        .unwrap();
        let fields: Vec<_> = plan.commands.iter().map(|c| c.field).collect();
        assert_eq!(fields, [Field::PayloadSize, Field::Entrypoint, Field::Signature]);
        assert_eq!(plan.commands[1].bytes, 0x4002_0000u64.to_le_bytes());
        assert_eq!(plan.commands[2].bytes, vec![0xab; 64]);
    }

    #[test]
    fn signature_only_ignores_size_and_entrypoint() {
        let req = PatchRequest {
            entrypoint: Some(0x1234),
            ..PatchRequest::signature_only(key())
        };
        let plan = plan_patch(&image(1, &[0; 4]), &req, &FixedSigner(2)).unwrap();
        assert_eq!(plan.commands.len(), 1);
        assert!(plan.writes(Field::Signature));
        assert_eq!(plan.header.payload_size, 1);
        assert_eq!(plan.header.entrypoint, 0x8000_0000);
    }

    #[test]
    fn signature_only_requires_a_key() {
        assert!(matches!(
            plan_patch(&image(4, &[0; 4]), &PatchRequest::signature_only(None), &FixedSigner(1)),
            Err(Error::MissingKey)
        ));
    }

    #[test]
    fn failed_signature_is_skipped_in_full_mode() {
        let plan = plan_patch(&image(1, &[0; 4]), &PatchRequest::full(key(), None), &BrokenSigner)
            .unwrap();
        assert!(!plan.writes(Field::Signature));
        assert!(plan.writes(Field::PayloadSize));
        assert!(plan.sign.error().is_some());
    }

    #[test]
    fn failed_signature_aborts_signature_only_mode() {
        assert!(matches!(
            plan_patch(&image(4, &[0; 4]), &PatchRequest::signature_only(key()), &BrokenSigner),
            Err(Error::Sign(SignError::Primitive(_)))
        ));
    }

    #[test]
    fn apply_leaves_untargeted_bytes_alone() {
        let img = image(0, &[0x55; 32]);
        let mut file = img.header.encode().to_vec();
        file.extend_from_slice(&img.payload);
        let before = file.clone();

        let plan = plan_patch(&img, &PatchRequest::full(None, None), &FixedSigner(0)).unwrap();
        let mut cur = Cursor::new(file);
        apply_commands(&mut cur, &plan.commands).unwrap();
        let after = cur.into_inner();

        assert_eq!(after.len(), before.len());
        assert_eq!(&after[4..8], &32u32.to_le_bytes());
        assert_eq!(&after[..4], &before[..4]);
        assert_eq!(&after[8..], &before[8..]);
        assert_eq!(ImageHeader::decode(&after[..IMAGE_HDR_SIZE]).unwrap().payload_size, 32);
    }

    #[test]
    fn patch_image_refuses_bad_magic_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.img");
        let mut bytes = vec![0u8; IMAGE_HDR_SIZE + 8];
        bytes[0] = 0x12;
        bytes[1] = 0x34;
        std::fs::write(&path, &bytes).unwrap();

        let err = patch_image(&path, &PatchRequest::full(None, Some(1)), &FixedSigner(1));
        assert!(matches!(
            err,
            Err(Error::Format(FormatError::BadMagic { found: 0x3412, .. }))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn patch_image_refuses_other_versions_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.img");
        let mut bytes = ImageHeader::new(0, 0x8000_0000, BuildId::default())
            .encode()
            .to_vec();
        bytes.extend_from_slice(&[0x11; 16]);
        bytes[2] = 2;
        std::fs::write(&path, &bytes).unwrap();

        let err = patch_image(&path, &PatchRequest::full(None, Some(1)), &FixedSigner(1));
        assert!(matches!(
            err,
            Err(Error::Format(FormatError::UnsupportedVersion { found: 2, .. }))
        ));

        let err = patch_image(
            &path,
            &PatchRequest::signature_only(Some(KeyHandle::new("key.pem"))),
            &FixedSigner(1),
        );
        assert!(matches!(
            err,
            Err(Error::Format(FormatError::UnsupportedVersion { found: 2, .. }))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }
}
