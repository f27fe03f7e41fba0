use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use crate::error::{ChatError, ChatResult};
use crate::network::ObjectStore;

/// Attachments written under a local directory, addressed by `file://` URLs.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> ChatResult<Self> {
        let root = std::path::absolute(root.as_ref())
            .map_err(|err| ChatError::Config(format!("invalid uploads dir: {err}")))?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> ChatResult<PathBuf> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|part| matches!(part, std::path::Component::ParentDir))
        {
            return Err(ChatError::UploadFailed(format!("refusing object path `{path}`")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ChatResult<()> {
        let target = self.resolve(path)?;
        if target.exists() {
            return Err(ChatError::UploadFailed(format!("object `{path}` already exists")));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ChatError::UploadFailed(err.to_string()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| ChatError::UploadFailed(err.to_string()))?;
        log::debug!("Wrote {content_type} object to {}", target.display());
        Ok(())
    }

    fn public_url(&self, path: &str) -> ChatResult<String> {
        let target = self.resolve(path)?;
        Url::from_file_path(&target)
            .map(String::from)
            .map_err(|_| ChatError::UploadFailed(format!("no URL for {}", target.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_bytes_and_resolves_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();

        store
            .put("Leo/my cat.png_1700000000000", b"png".to_vec(), "image/png")
            .await
            .unwrap();

        let stored = dir.path().join("Leo").join("my cat.png_1700000000000");
        assert_eq!(std::fs::read(&stored).unwrap(), b"png");

        let url = store.public_url("Leo/my cat.png_1700000000000").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/Leo/my%20cat.png_1700000000000"));
    }

    #[tokio::test]
    async fn rejects_traversal_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();

        assert!(store.put("../escape", Vec::new(), "text/plain").await.is_err());

        store.put("Janice/a.txt_1", b"1".to_vec(), "text/plain").await.unwrap();
        assert!(matches!(
            store.put("Janice/a.txt_1", b"2".to_vec(), "text/plain").await,
            Err(ChatError::UploadFailed(_))
        ));
    }
}
