use anyhow::{Context, Result, bail};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{info, warn};

/// Bucket that listing images live in. Also the last path segment of the
/// public URL prefix.
pub const IMAGE_BUCKET: &str = "listing-images";

/// Blob storage for uploaded images.
///
/// Each object is a flat file at `{dir}/{name}`. Writes never overwrite: an
/// existing object with the same name is an error.
pub struct BlobStore {
    dir: PathBuf,
    public_base: String,
}

impl BlobStore {
    /// `public_base` is the URL under which `dir` is served, without a
    /// trailing slash.
    pub async fn new(dir: PathBuf, public_base: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        let public_base = public_base.into().trim_end_matches('/').to_string();
        info!("Blob storage directory: {} (served at {})", dir.display(), public_base);
        Ok(Self { dir, public_base })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn object_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Stores everything read from `data` under `name`, failing if the object
    /// already exists. A write that fails part way removes the partial object.
    pub async fn put_new<R>(&self, name: &str, mut data: R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("invalid object name '{}'", name);
        }

        let path = self.object_path(name);
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => bail!("object '{}' already exists", name),
            Err(e) => return Err(e).with_context(|| format!("creating object '{}'", name)),
        };

        let written = async {
            let size = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(size)
        }
        .await;

        match written {
            Ok(size) => Ok(size),
            Err(e) => {
                drop(file);
                if let Err(rm) = fs::remove_file(&path).await {
                    warn!(object = %name, "Failed to remove partial object: {}", rm);
                }
                Err(e).with_context(|| format!("writing object '{}'", name))
            }
        }
    }

    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.public_base, name)
    }

    /// Removes an object. Already-missing objects are not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.object_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Object {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a batch of objects written by a failed request.
    pub async fn discard(&self, names: &[String]) {
        for name in names {
            if let Err(e) = self.delete(name).await {
                warn!(object = %name, "Failed to discard object: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    async fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path().join(IMAGE_BUCKET), "http://cdn.test/storage/listing-images/")
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_read_back() {
        let (_dir, store) = store().await;
        store.put_new("a.png", &b"png-bytes"[..]).await.unwrap();
        let read = tokio::fs::read(store.object_path("a.png")).await.unwrap();
        assert_eq!(read, b"png-bytes");
    }

    #[tokio::test]
    async fn refuses_to_overwrite() {
        let (_dir, store) = store().await;
        store.put_new("a.png", &b"first"[..]).await.unwrap();
        let err = store.put_new("a.png", &b"second"[..]).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        let read = tokio::fs::read(store.object_path("a.png")).await.unwrap();
        assert_eq!(read, b"first");
    }

    #[tokio::test]
    async fn refuses_path_like_names() {
        let (_dir, store) = store().await;
        assert!(store.put_new("../escape.png", &b"x"[..]).await.is_err());
        assert!(store.put_new(".hidden", &b"x"[..]).await.is_err());
        assert!(store.put_new("", &b"x"[..]).await.is_err());
    }

    /// Yields one chunk, then fails like a dropped client connection.
    struct DroppedConnection {
        sent: bool,
    }

    impl AsyncRead for DroppedConnection {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::new(ErrorKind::ConnectionReset, "connection reset")));
            }
            self.sent = true;
            buf.put_slice(b"first half of a png");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_object() {
        let (_dir, store) = store().await;
        let err = store
            .put_new("a.png", DroppedConnection { sent: false })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("writing object 'a.png'"));
        assert!(!store.object_path("a.png").exists());
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);

        // The name is free again after the failure.
        store.put_new("a.png", &b"whole"[..]).await.unwrap();
    }

    #[tokio::test]
    async fn public_url_joins_without_double_slash() {
        let (_dir, store) = store().await;
        assert_eq!(store.public_url("a.png"), "http://cdn.test/storage/listing-images/a.png");
    }

    #[tokio::test]
    async fn discard_removes_and_tolerates_missing() {
        let (_dir, store) = store().await;
        store.put_new("a.png", &b"x"[..]).await.unwrap();
        store.discard(&["a.png".to_string(), "never-written.png".to_string()]).await;
        assert!(!store.object_path("a.png").exists());
    }
}
