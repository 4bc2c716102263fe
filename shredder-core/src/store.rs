//! Image loading and saving.

use std::path::Path;

use image::{DynamicImage, ImageError};

use crate::{Result, ShredderError};

/// Where split and merge read their inputs and write their outputs
pub trait ImageStore {
    /// Load and decode the image at `path`.
    fn load(&self, path: &Path) -> Result<DynamicImage>;

    /// Encode `image` to `path`; the format follows the path's extension.
    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()>;
}

/// Reads and writes image files on the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStore;

impl ImageStore for FileStore {
    fn load(&self, path: &Path) -> Result<DynamicImage> {
        image::open(path).map_err(|e| match e {
            ImageError::IoError(source) => ShredderError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => ShredderError::Decode {
                path: path.to_path_buf(),
                source,
            },
        })
    }

    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ShredderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        image.save(path).map_err(|e| match e {
            ImageError::IoError(source) => ShredderError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => ShredderError::Encode {
                path: path.to_path_buf(),
                source,
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use image::DynamicImage;
    use parking_lot::{Mutex, MutexGuard};

    use super::ImageStore;
    use crate::{Result, ShredderError};

    /// Keeps saved images in a map instead of on disk
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        images: Mutex<HashMap<PathBuf, DynamicImage>>,
    }

    impl MemoryStore {
        pub fn images(&self) -> MutexGuard<'_, HashMap<PathBuf, DynamicImage>> {
            self.images.lock()
        }
    }

    impl ImageStore for MemoryStore {
        fn load(&self, path: &Path) -> Result<DynamicImage> {
            self.images.lock().get(path).cloned().ok_or_else(|| ShredderError::Io {
                path: path.to_path_buf(),
                source: std::io::ErrorKind::NotFound.into(),
            })
        }

        fn save(&self, image: &DynamicImage, path: &Path) -> Result<()> {
            self.images.lock().insert(path.to_path_buf(), image.clone());
            Ok(())
        }
    }
}
