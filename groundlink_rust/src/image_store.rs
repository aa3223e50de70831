use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use groundlink_core::image::DecodedImage;
use tracing::info;

/// Writes decoded images into a directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create image directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves `image` and returns where it was written.
    ///
    /// The sequence number prefixes the name, so repeated filenames never overwrite.
    pub fn save(&self, image: &DecodedImage) -> Result<PathBuf> {
        let path = self.dir.join(file_name_for(image));
        fs::write(&path, &image.bytes)
            .with_context(|| format!("failed to write image {}", path.display()))?;
        info!(path = %path.display(), bytes = image.len(), "image saved");
        Ok(path)
    }
}

/// `0007_frame.jpg`, or `image_0007.bin` when no usable name was announced.
pub fn file_name_for(image: &DecodedImage) -> String {
    match image.filename.as_deref().map(sanitize).filter(|name| !name.is_empty()) {
        Some(name) => format!("{:04}_{name}", image.sequence),
        None => format!("image_{:04}.bin", image.sequence),
    }
}

/// Keeps only the final path component, limited to a conservative character set.
fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(sequence: u32, filename: Option<&str>) -> DecodedImage {
        DecodedImage {
            sequence,
            filename: filename.map(str::to_string),
            declared_size: None,
            bytes: b"ABC".to_vec(),
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name_for(&image(7, Some("frame.jpg"))), "0007_frame.jpg");
        assert_eq!(file_name_for(&image(12, None)), "image_0012.bin");
        assert_eq!(
            file_name_for(&image(1, Some("../../etc/passwd"))),
            "0001_passwd"
        );
        assert_eq!(file_name_for(&image(2, Some("a b?.png"))), "0002_a_b_.png");
        assert_eq!(file_name_for(&image(3, Some(".."))), "image_0003.bin");
    }

    #[test]
    fn test_save_writes_bytes() {
        let dir = std::env::temp_dir().join(format!("groundlink-images-{}", std::process::id()));
        let store = ImageStore::new(&dir).unwrap();

        let path = store.save(&image(1, Some("cam.jpg"))).unwrap();
        assert_eq!(path, dir.join("0001_cam.jpg"));
        assert_eq!(fs::read(&path).unwrap(), b"ABC");

        fs::remove_dir_all(&dir).unwrap();
    }
}
