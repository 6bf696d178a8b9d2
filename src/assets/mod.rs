//! Persistent storage for captured preview images.
//!
//! A store takes an image and a suggested name and returns a handle that
//! stays valid after the capture session that produced the image is gone.
//! Names never collide: a taken name gets a `_1`, `_2`, ... suffix.

use image::RgbaImage;
use sha2::Digest;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob name is empty")]
    EmptyName,
    #[error("failed creating blob directory '{path}': {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing blob '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Reference to a stored image.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlobHandle {
    pub name: String,
    /// Lowercase hex SHA-256 of the raw RGBA bytes.
    pub digest: String,
}

pub trait BlobStore {
    fn store(&mut self, image: &RgbaImage, suggested_name: &str)
        -> Result<BlobHandle, BlobStoreError>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Keep only characters that are safe in a file name.
fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// First of `base`, `base_1`, `base_2`, ... for which `taken` is false.
fn free_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut suffix = 1usize;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<String, RgbaImage>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&RgbaImage> {
        self.blobs.get(name)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn store(
        &mut self,
        image: &RgbaImage,
        suggested_name: &str,
    ) -> Result<BlobHandle, BlobStoreError> {
        let base = sanitize_name(suggested_name);
        if base.is_empty() {
            return Err(BlobStoreError::EmptyName);
        }
        let name = free_name(&base, |candidate| self.blobs.contains_key(candidate));
        let digest = sha256_hex(image.as_raw());
        self.blobs.insert(name.clone(), image.clone());
        Ok(BlobHandle { name, digest })
    }
}

/// Writes each blob as `<dir>/<name>.png`.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    dir: PathBuf,
}

impl DirectoryBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, handle: &BlobHandle) -> PathBuf {
        self.file_path(&handle.name)
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.png"))
    }
}

impl BlobStore for DirectoryBlobStore {
    fn store(
        &mut self,
        image: &RgbaImage,
        suggested_name: &str,
    ) -> Result<BlobHandle, BlobStoreError> {
        let base = sanitize_name(suggested_name);
        if base.is_empty() {
            return Err(BlobStoreError::EmptyName);
        }
        std::fs::create_dir_all(&self.dir).map_err(|source| BlobStoreError::CreateDir {
            path: self.dir.display().to_string(),
            source,
        })?;

        let name = free_name(&base, |candidate| self.file_path(candidate).exists());
        let path = self.file_path(&name);
        image::save_buffer_with_format(
            &path,
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .map_err(|source| BlobStoreError::Write {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Stored preview '{}'", path.display());

        Ok(BlobHandle {
            name,
            digest: sha256_hex(image.as_raw()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn swatch(rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba(rgba))
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let mut store = MemoryBlobStore::new();
        let first = store.store(&swatch([255, 0, 0, 255]), "Preview_Red").unwrap();
        let second = store.store(&swatch([0, 0, 255, 255]), "Preview_Red").unwrap();
        let third = store.store(&swatch([0, 0, 255, 255]), "Preview_Red").unwrap();
        assert_eq!(first.name, "Preview_Red");
        assert_eq!(second.name, "Preview_Red_1");
        assert_eq!(third.name, "Preview_Red_2");
        assert_ne!(first.digest, second.digest);
        assert_eq!(second.digest, third.digest);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("Preview_Red").unwrap().get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        let mut store = MemoryBlobStore::new();
        let handle = store.store(&swatch([0; 4]), "Preview_Dark/Blue ").unwrap();
        assert_eq!(handle.name, "Preview_Dark_Blue");
        assert!(matches!(
            store.store(&swatch([0; 4]), "   "),
            Err(BlobStoreError::EmptyName)
        ));
    }

    #[test]
    fn directory_store_writes_png() {
        let mut dir = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("variant_previz_blobs_{}_{}", std::process::id(), nonce));

        let mut store = DirectoryBlobStore::new(&dir);
        let image = swatch([10, 20, 30, 255]);
        let first = store.store(&image, "Preview_Teal").unwrap();
        let second = store.store(&image, "Preview_Teal").unwrap();
        assert_eq!(second.name, "Preview_Teal_1");

        let loaded = image::open(store.path_for(&first)).unwrap().to_rgba8();
        assert_eq!(loaded, image);
        assert_eq!(sha256_hex(loaded.as_raw()), first.digest);

        let _ = std::fs::remove_dir_all(dir);
    }
}
