use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs as async_fs;

use crate::core::protocol::is_valid_token;
use crate::utils::{IndexError, Result};

/// The directory whose top-level regular files a peer shares.
#[derive(Debug, Clone)]
pub struct SharedDir {
    root: PathBuf,
}

impl SharedDir {
    pub async fn new(root: PathBuf) -> Result<Self> {
        async_fs::create_dir_all(&root)
            .await
            .map_err(|e| IndexError::IoError(format!("Failed to create directory: {}", e)))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of the shareable files currently in the directory.
    ///
    /// Names that cannot travel as a single protocol token are skipped.
    pub async fn list_files(&self) -> Result<BTreeSet<String>> {
        let mut entries = async_fs::read_dir(&self.root)
            .await
            .map_err(|e| IndexError::IoError(format!("Failed to read directory: {}", e)))?;

        let mut files = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IndexError::IoError(format!("Failed to read directory entry: {}", e)))?
        {
            let is_file = match entry.file_type().await {
                Ok(file_type) => file_type.is_file(),
                Err(e) => {
                    warn!("Failed to stat {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            if !is_file {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) if is_valid_token(&name) => {
                    files.insert(name);
                }
                Ok(name) => warn!("Not sharing {:?}: name contains whitespace", name),
                Err(name) => warn!("Not sharing {:?}: name is not UTF-8", name),
            }
        }

        debug!("Found {} shareable files in {:?}", files.len(), self.root);
        Ok(files)
    }

    /// Map a requested name to a path directly inside the root.
    ///
    /// Anything other than a single plain path component is refused, so a
    /// request can never escape the shared directory.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Some(self.root.join(part)),
            _ => None,
        }
    }

    /// Open `name` for reading if it is a regular file in the root.
    pub async fn open(&self, name: &str) -> Result<Option<(async_fs::File, u64)>> {
        let Some(path) = self.resolve(name) else {
            warn!("Refusing file request for {:?}", name);
            return Ok(None);
        };

        let metadata = match async_fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file = async_fs::File::open(&path)
            .await
            .map_err(|e| IndexError::IoError(format!("Failed to open file: {}", e)))?;

        info!("Opened {:?} ({} bytes)", path, metadata.len());
        Ok(Some((file, metadata.len())))
    }
}
