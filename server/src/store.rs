use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, FutureExt};

use crate::errors::StoreError;

#[cfg(test)]
pub(crate) mod mock;

/// Where uploaded recipe images live. Keys are opaque file names; the
/// relative URL they are served under is the caller's concern (see
/// [`crate::urls::Urls::media_file`]).
pub trait Store: Send + Sync {
    /// The type of successful result.
    type Output;

    /// The type of raw data.
    type Raw;

    /// Deletes the object stored under the given key. Deleting a key
    /// that does not exist is not an error.
    fn delete(&self, key: &str) -> BoxFuture<Result<(), StoreError>>;

    /// Saves the given data under the given key.
    fn save(&self, key: &str, raw: Self::Raw) -> BoxFuture<Result<Self::Output, StoreError>>;
}

/// A store that saves media to a local directory, served statically by
/// the HTTP layer.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a new instance rooted at the given directory, creating
    /// the directory if necessary.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        Ok(Self { root })
    }
}

impl Store for FsStore {
    type Output = ();
    type Raw = Vec<u8>;

    fn delete(&self, key: &str) -> BoxFuture<Result<(), StoreError>> {
        let path = self.root.join(key);

        async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(StoreError::Io { source }),
            }
        }
        .boxed()
    }

    fn save(&self, key: &str, raw: Vec<u8>) -> BoxFuture<Result<(), StoreError>> {
        let path = self.root.join(key);

        async move {
            tokio::fs::write(&path, &raw)
                .await
                .map_err(|source| StoreError::Io { source })
        }
        .boxed()
    }
}
