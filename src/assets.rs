use std::{fs, io, path::PathBuf};

use sha2::{Digest, Sha256};

use crate::models::FlierRef;
use crate::utils;

/// Writes captured flier images under one directory, keyed by event id.
pub struct FlierStore {
    dir: PathBuf,
}

impl FlierStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn store(&self, event_id: &str, bytes: &[u8]) -> io::Result<FlierRef> {
        fs::create_dir_all(&self.dir)?;
        let mut stem = utils::sanitize_file_stem(event_id);
        if stem.is_empty() {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            stem = format!("{:x}", hasher.finalize());
        }
        let path = self
            .dir
            .join(format!("{stem}_flier.{}", image_extension(bytes)));
        fs::write(&path, bytes)?;
        Ok(FlierRef { path })
    }
}

fn image_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if bytes.starts_with(b"GIF8") {
        "gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        "bin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    #[test]
    fn stores_by_event_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FlierStore::new(dir.path().join("fliers"));

        let first = store.store("18234", PNG).expect("store first");
        let second = store.store("18235", PNG).expect("store second");

        assert_ne!(first.path, second.path);
        assert!(first.path.ends_with("18234_flier.png"));
        assert_eq!(fs::read(&first.path).expect("read back"), PNG);
    }

    #[test]
    fn falls_back_to_content_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FlierStore::new(dir.path());
        let flier = store.store("///", b"\xFF\xD8\xFFjpeg").expect("store");
        let name = flier
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.ends_with("_flier.jpg"));
        assert_eq!(name.len(), 64 + "_flier.jpg".len());
    }
}
