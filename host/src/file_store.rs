use anyhow::{anyhow, Context, Result};
use evobot_core::store::{check_bounds, ERASED_BYTE};
use evobot_core::{NvStore, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// [`NvStore`] over a fixed-size image file. Writes are buffered and reach disk on `commit`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    bytes: Vec<u8>,
    dirty: bool,
}

impl FileStore {
    /// Opens the image at `path`, creating an erased one of `capacity` bytes if missing.
    /// A short image is padded with erased bytes; an oversized one is rejected.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = if path.exists() {
            let mut bytes = fs::read(&path)
                .with_context(|| format!("failed reading store image {}", path.display()))?;
            if bytes.len() > capacity {
                return Err(anyhow!(
                    "store image {} is {} bytes, larger than capacity {capacity}",
                    path.display(),
                    bytes.len()
                ));
            }
            bytes.resize(capacity, ERASED_BYTE);
            bytes
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed creating {}", parent.display()))?;
            }
            let bytes = vec![ERASED_BYTE; capacity];
            write_image(&path, &bytes)?;
            debug!(path = %path.display(), capacity, "created erased store image");
            bytes
        };
        Ok(Self {
            path,
            bytes,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Write-then-rename so a crash never leaves a half-written image.
fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("failed writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed replacing store image {}", path.display()))?;
    Ok(())
}

impl NvStore for FileStore {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn get(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        check_bounds(offset, bytes.len(), self.bytes.len())?;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        write_image(&self.path, &self.bytes).map_err(|err| {
            warn!(path = %self.path.display(), error = %err, "store image write failed");
            StoreError::Backend {
                reason: "image write failed",
            }
        })?;
        self.dirty = false;
        Ok(())
    }
}
