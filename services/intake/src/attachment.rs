use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};
use locallink_core::turn_log::InlineImage;
use std::path::Path;

/// The image MIME type for a file extension, if it is one we send.
pub fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Reads a photo from disk as an inline image.
pub fn load_image(path: &Path) -> Result<InlineImage> {
    let Some(mime_type) = guess_mime_type(path) else {
        bail!("Unsupported image type: {}", path.display());
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    if bytes.is_empty() {
        bail!("Image is empty: {}", path.display());
    }
    Ok(InlineImage::new(
        mime_type,
        &general_purpose::STANDARD.encode(&bytes),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(guess_mime_type(Path::new("bat.JPG")), Some("image/jpeg"));
        assert_eq!(guess_mime_type(Path::new("kurta.png")), Some("image/png"));
        assert_eq!(guess_mime_type(Path::new("notes.txt")), None);
        assert_eq!(guess_mime_type(Path::new("noext")), None);
    }

    #[test]
    fn test_load_image_encodes_bytes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("photo.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G'])?;

        let image = load_image(&path)?;
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "iVBORw==");

        std::fs::write(dir.path().join("empty.jpg"), b"")?;
        assert!(load_image(&dir.path().join("empty.jpg")).is_err());
        assert!(load_image(&dir.path().join("missing.jpg")).is_err());
        assert!(load_image(&dir.path().join("photo.bmp")).is_err());
        Ok(())
    }
}
