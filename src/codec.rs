//! Decoding and encoding at the filesystem boundary.
//!
//! Everything inside the pipeline works on [`PlanarImage`]; this module is
//! the only place the interleaved formats of the `image` crate appear.

use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{trace, warn};
use walkdir::WalkDir;

use crate::core::error::CodecError;
use crate::core::PlanarImage;

/// File extensions the batch lister picks up.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "bmp"];

/// Decode an image file into planar RGB.
///
/// Any source color type is converted to 8-bit RGB; alpha is dropped.
pub fn decode(path: &Path) -> Result<PlanarImage, CodecError> {
    let decoded = image::open(path).map_err(|source| CodecError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = decoded.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    trace!("decoded {}: {width}x{height}", path.display());

    PlanarImage::from_interleaved(rgb.as_raw(), width, height)
        .ok_or(CodecError::PlaneLayout { width, height })
}

/// Encode a planar image to `path`; the format follows the file extension.
pub fn encode(image: &PlanarImage, path: &Path) -> Result<(), CodecError> {
    let (width, height) = (image.width(), image.height());
    let rgb = RgbImage::from_raw(width as u32, height as u32, image.to_interleaved())
        .ok_or(CodecError::PlaneLayout { width, height })?;
    rgb.save(path).map_err(|source| CodecError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    trace!("encoded {}: {width}x{height}", path.display());
    Ok(())
}

/// True if the path has a recognized image extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// List up to `limit` image files under `dir`, sorted by path.
///
/// Unreadable entries are logged and skipped rather than failing the whole
/// listing. `limit = 0` means no cap.
pub fn list_images(dir: &Path, limit: usize) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image_path(path))
        .collect();
    paths.sort();
    if limit > 0 {
        paths.truncate(limit);
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("photo.jpg")));
        assert!(is_image_path(Path::new("photo.JPEG")));
        assert!(is_image_path(Path::new("dir/photo.png")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("no_extension")));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");

        let data: Vec<u8> = (0..4 * 3 * 3).map(|i| i as u8).collect();
        let original = PlanarImage::from_interleaved(&data, 4, 3).unwrap();

        encode(&original, &path).unwrap();
        let decoded = decode(&path).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode(Path::new("/nonexistent/missing.png")).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"").unwrap();
        fs::write(dir.path().join("a.jpg"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.png"), b"").unwrap();

        let paths = list_images(dir.path(), 0);
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.jpg", "b.png", "sub/c.png"]);

        let capped = list_images(dir.path(), 2);
        assert_eq!(capped.len(), 2);
    }
}
