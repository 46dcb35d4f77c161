use std::path::{Path, PathBuf};

/// Scratch directory for one operation. Call [`WorkDir::remove`] when the job
/// is done with it; a guard dropped on an error path removes it synchronously.
pub struct WorkDir {
    path: PathBuf,
    removed: bool,
}

impl WorkDir {
    pub async fn create(root: &Path, operation_id: uuid::Uuid) -> std::io::Result<Self> {
        let path = root.join(operation_id.to_string());
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path, removed: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub async fn remove(mut self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove work dir {}: {}", self.path.display(), e);
            }
        }
        self.removed = true;
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove work dir {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removed_on_drop() {
        let root = std::env::temp_dir().join("cms-workdir-test");
        let path = {
            let dir = WorkDir::create(&root, uuid::Uuid::new_v4()).await.unwrap();
            tokio::fs::write(dir.join("dump.sql"), b"-- empty").await.unwrap();
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn explicit_remove() {
        let root = std::env::temp_dir().join("cms-workdir-test");
        let dir = WorkDir::create(&root, uuid::Uuid::new_v4()).await.unwrap();
        tokio::fs::write(dir.join("dump.sql"), b"-- empty").await.unwrap();
        let path = dir.path().to_path_buf();

        dir.remove().await;
        assert!(!tokio::fs::try_exists(&path).await.unwrap());
    }
}
