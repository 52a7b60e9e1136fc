use crate::error::ImportError;
use crate::models::ArchivePayload;
use std::path::Path;

/// Local file header signature of a zip archive
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// End-of-central-directory signature; the whole header of an empty archive
pub const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// Validates a submission down to the single archive it must contain.
///
/// The upload boundary hands over whatever the client sent; exactly one
/// zip-named, non-empty, size-bounded payload with a zip signature passes.
pub fn require_single_archive(
    mut payloads: Vec<ArchivePayload>,
    max_size: usize,
) -> Result<ArchivePayload, ImportError> {
    if payloads.len() != 1 {
        return Err(ImportError::Input(format!(
            "expected exactly one archive, got {}",
            payloads.len()
        )));
    }
    let payload = payloads.remove(0);

    let is_zip_name = Path::new(&payload.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip_name {
        return Err(ImportError::Input(format!(
            "only a zip archive is allowed, got '{}'",
            payload.file_name
        )));
    }

    if payload.bytes.is_empty() {
        return Err(ImportError::Input("archive is empty".to_string()));
    }

    if payload.bytes.len() > max_size {
        return Err(ImportError::Input(format!(
            "archive of {} bytes exceeds maximum allowed {} bytes",
            payload.bytes.len(),
            max_size
        )));
    }

    if !payload.bytes.starts_with(&ZIP_MAGIC) && !payload.bytes.starts_with(&ZIP_EMPTY_MAGIC) {
        return Err(ImportError::Input(format!(
            "'{}' does not look like a zip archive",
            payload.file_name
        )));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn payload(name: &str, bytes: &[u8]) -> ArchivePayload {
        ArchivePayload {
            file_name: name.to_string(),
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    #[test]
    fn test_accepts_single_zip() {
        let p = payload("parcels.zip", &[0x50, 0x4B, 0x03, 0x04, 0x00]);
        let accepted = require_single_archive(vec![p], 1024).unwrap();
        assert_eq!(accepted.file_name, "parcels.zip");
    }

    #[test]
    fn test_accepts_uppercase_extension_and_empty_archive_signature() {
        let p = payload("PARCELS.ZIP", &[0x50, 0x4B, 0x05, 0x06, 0x00]);
        assert!(require_single_archive(vec![p], 1024).is_ok());
    }

    #[test]
    fn test_rejects_multi_file_submission() {
        let a = payload("a.zip", &ZIP_MAGIC);
        let b = payload("b.zip", &ZIP_MAGIC);
        let err = require_single_archive(vec![a, b], 1024).unwrap_err();
        assert!(matches!(err, ImportError::Input(_)));
    }

    #[test]
    fn test_rejects_empty_submission() {
        let err = require_single_archive(vec![], 1024).unwrap_err();
        assert!(matches!(err, ImportError::Input(_)));
    }

    #[test]
    fn test_rejects_non_zip_name() {
        let p = payload("parcels.tar.gz", &ZIP_MAGIC);
        assert!(require_single_archive(vec![p], 1024).is_err());
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let p = payload("parcels.zip", b"not a zip at all");
        assert!(require_single_archive(vec![p], 1024).is_err());
    }

    #[test]
    fn test_rejects_oversized_archive() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        let p = payload("parcels.zip", &bytes);
        assert!(require_single_archive(vec![p], 16).is_err());
    }

    #[test]
    fn test_rejects_zero_byte_payload() {
        let p = payload("parcels.zip", &[]);
        assert!(require_single_archive(vec![p], 1024).is_err());
    }
}
