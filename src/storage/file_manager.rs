use log::{debug, info, warn};
use std::path::{Component, Path, PathBuf};
use tokio::fs as async_fs;

use crate::utils::{P2PError, Result};

/// The node's single shared directory. Every listed, offered and received
/// file lives directly inside it; subdirectories are never traversed.
#[derive(Debug, Clone)]
pub struct FileManager {
    shared_dir: PathBuf,
}

impl FileManager {
    /// Opens the shared directory, creating it when absent.
    pub async fn new(shared_dir: PathBuf) -> Result<Self> {
        async_fs::create_dir_all(&shared_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to create directory: {}", e)))?;

        let shared_dir = async_fs::canonicalize(&shared_dir).await.unwrap_or(shared_dir);
        info!("Using shared directory: {}", shared_dir.display());

        Ok(Self { shared_dir })
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    /// Names of the regular files in the shared directory, sorted.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = async_fs::read_dir(&self.shared_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory: {}", e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory entry: {}", e)))?
        {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if validate_file_name(&name).is_ok() => names.push(name),
                Ok(name) => warn!("Skipping unshareable file name {:?}", name),
                Err(raw) => warn!("Skipping non UTF-8 file name {:?}", raw),
            }
        }

        names.sort();
        debug!("Listed {} files in {:?}", names.len(), self.shared_dir);
        Ok(names)
    }

    /// Path of `name` inside the shared directory, after validating the name.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.shared_dir.join(name))
    }

    /// Whether `name` is an existing regular file in the shared directory.
    /// Symlinks are not followed, matching what `list_files` reports.
    pub async fn contains(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => async_fs::symlink_metadata(path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn open(&self, name: &str) -> Result<async_fs::File> {
        let path = self.resolve(name)?;
        if !self.contains(name).await {
            return Err(P2PError::FileNotFound(format!(
                "{} not found in {}",
                name,
                self.shared_dir.display()
            )));
        }
        async_fs::File::open(&path)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to open {}: {}", path.display(), e)))
    }

    /// Create (or truncate) `name` for an incoming transfer.
    pub async fn create(&self, name: &str) -> Result<(async_fs::File, PathBuf)> {
        let path = self.resolve(name)?;
        if let Ok(meta) = async_fs::symlink_metadata(&path).await {
            if meta.file_type().is_symlink() {
                return Err(P2PError::IoError(format!(
                    "Refusing to write through symlink {}",
                    path.display()
                )));
            }
        }
        let file = async_fs::File::create(&path).await.map_err(|e| {
            P2PError::IoError(format!("Failed to create {}: {}", path.display(), e))
        })?;
        Ok((file, path))
    }
}

/// A transferable name is a single plain path component that fits on one
/// protocol line.
pub fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.contains(['/', '\\', '\0', '\n', '\r'])
        || !matches!(
            Path::new(name).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );

    if invalid {
        return Err(P2PError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("notes.txt").is_ok());
        assert!(validate_file_name("my report.pdf").is_ok());
        assert!(validate_file_name(".hidden").is_ok());

        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "/abs", "two\nlines"] {
            assert!(
                matches!(validate_file_name(bad), Err(P2PError::InvalidFileName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_new_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("shared");

        let manager = FileManager::new(dir.clone()).await.unwrap();
        assert!(dir.is_dir());
        assert!(manager.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_files_only_regular_files_sorted() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.txt"), b"b").unwrap();
        std::fs::write(temp.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();

        let manager = FileManager::new(temp.path().to_path_buf()).await.unwrap();
        assert_eq!(manager.list_files().await.unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_contains_and_open() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(temp.path().join("dir")).unwrap();

        let manager = FileManager::new(temp.path().to_path_buf()).await.unwrap();
        assert!(manager.contains("notes.txt").await);
        assert!(!manager.contains("dir").await);
        assert!(!manager.contains("missing.txt").await);
        assert!(!manager.contains("../notes.txt").await);

        assert!(manager.open("notes.txt").await.is_ok());
        assert!(matches!(
            manager.open("missing.txt").await,
            Err(P2PError::FileNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_never_followed() {
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("target.txt");
        std::fs::write(&target, b"outside").unwrap();

        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(&target, temp.path().join("link.txt")).unwrap();

        let manager = FileManager::new(temp.path().to_path_buf()).await.unwrap();
        assert!(manager.list_files().await.unwrap().is_empty());
        assert!(!manager.contains("link.txt").await);
        assert!(matches!(
            manager.open("link.txt").await,
            Err(P2PError::FileNotFound(_))
        ));
        assert!(manager.create("link.txt").await.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"outside");
    }
}
