// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Trait to store the device data in a persistent way.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fdo_protocol::error::ErrorKind;
use fdo_protocol::Error;
use tokio::fs::{DirBuilder, File};
use tokio::io::AsyncWriteExt;
use tracing::{error, instrument};
use zeroize::Zeroizing;

/// Stores the information used for the protocol
pub trait Storage: Send + Sync {
    /// Writes the file and marks it as immutable.
    fn write_immutable(
        &self,
        file: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Creates and writes a file, errors if already exists.
    fn write(&self, file: &str, content: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Creates and writes a file, truncates any existing one.
    fn overwrite(
        &self,
        file: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reads a files if it exists.
    fn read(&self, file: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Reads a files that is a secret.
    fn read_secret(
        &self,
        file: &str,
    ) -> impl std::future::Future<Output = Result<Option<Zeroizing<Vec<u8>>>, Error>> + Send {
        async { self.read(file).await.map(|value| value.map(Zeroizing::new)) }
    }

    /// Checks if a file exists.
    fn exists(&self, file: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// File storage to use for the protocol
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens the directory to use as file storage
    pub async fn open(dir: PathBuf) -> io::Result<Self> {
        let mut builder = DirBuilder::new();
        builder.recursive(true).mode(0o700);

        builder.create(&dir).await?;

        Ok(Self { dir })
    }
}

impl Storage for FileStorage {
    #[instrument(skip(self, content))]
    async fn write_immutable(&self, file: &str, content: &[u8]) -> Result<(), Error> {
        self.write(file, content).await?;

        let path = self.dir.join(file);

        let mut permissions = tokio::fs::metadata(&path)
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't stat file");

                Error::new(ErrorKind::Io, "couldn't stat file")
            })?
            .permissions();
        permissions.set_readonly(true);

        tokio::fs::set_permissions(&path, permissions)
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't set file permissions");

                Error::new(ErrorKind::Io, "couldn't set file permissions")
            })
    }

    #[instrument(skip(self, content))]
    async fn write(&self, file: &str, content: &[u8]) -> Result<(), Error> {
        let mut file = File::options()
            .create_new(true)
            .write(true)
            .mode(0o700)
            .open(self.dir.join(file))
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't create file");

                Error::new(ErrorKind::Io, "couldn't create file")
            })?;

        file.write_all(content).await.map_err(|err| {
            error!(error = %err, "couldn't write to file");

            Error::new(ErrorKind::Io, "couldn't write to file")
        })?;

        Ok(())
    }

    #[instrument(skip(self, content))]
    async fn overwrite(&self, file: &str, content: &[u8]) -> Result<(), Error> {
        let mut file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o700)
            .open(self.dir.join(file))
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't create file");

                Error::new(ErrorKind::Io, "couldn't create file")
            })?;

        file.write_all(content).await.map_err(|err| {
            error!(error = %err, "couldn't write to file");

            Error::new(ErrorKind::Io, "couldn't write to file")
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn read(&self, file: &str) -> Result<Option<Vec<u8>>, Error> {
        match tokio::fs::read(self.dir.join(file)).await {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                error!(error = %err, "couldn't read to file");

                Err(Error::new(ErrorKind::Io, "couldn't read to file"))
            }
        }
    }

    #[instrument(skip(self))]
    async fn exists(&self, file: &str) -> Result<bool, Error> {
        tokio::fs::try_exists(self.dir.join(file))
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't stat file");

                Error::new(ErrorKind::Io, "couldn't stat to file")
            })
    }
}

/// Volatile storage, shared between its clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_files<F, O>(&self, f: F) -> Result<O, Error>
    where
        F: FnOnce(&mut HashMap<String, Vec<u8>>) -> Result<O, Error>,
    {
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::new(ErrorKind::Io, "memory storage lock poisoned"))?;

        f(&mut files)
    }
}

impl Storage for MemoryStorage {
    async fn write_immutable(&self, file: &str, content: &[u8]) -> Result<(), Error> {
        self.write(file, content).await
    }

    async fn write(&self, file: &str, content: &[u8]) -> Result<(), Error> {
        self.with_files(|files| {
            if files.contains_key(file) {
                return Err(Error::new(ErrorKind::Io, "file already exists"));
            }

            files.insert(file.to_string(), content.to_vec());

            Ok(())
        })
    }

    async fn overwrite(&self, file: &str, content: &[u8]) -> Result<(), Error> {
        self.with_files(|files| {
            files.insert(file.to_string(), content.to_vec());

            Ok(())
        })
    }

    async fn read(&self, file: &str) -> Result<Option<Vec<u8>>, Error> {
        self.with_files(|files| Ok(files.get(file).cloned()))
    }

    async fn exists(&self, file: &str) -> Result<bool, Error> {
        self.with_files(|files| Ok(files.contains_key(file)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    async fn write_read_cycle<S: Storage>(storage: S) {
        assert!(!storage.exists("creds").await.unwrap());
        assert_eq!(storage.read("creds").await.unwrap(), None);

        storage.write("creds", b"first").await.unwrap();
        assert!(storage.exists("creds").await.unwrap());

        let err = storage.write("creds", b"second").await.unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Io);

        storage.overwrite("creds", b"third").await.unwrap();
        assert_eq!(
            storage.read("creds").await.unwrap().as_deref(),
            Some(b"third".as_slice())
        );

        let secret = storage.read_secret("creds").await.unwrap().unwrap();
        assert_eq!(secret.as_slice(), b"third");
    }

    #[tokio::test]
    async fn memory_storage() {
        write_read_cycle(MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn memory_storage_is_shared() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();

        storage.write("key", b"value").await.unwrap();

        assert!(clone.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn file_storage() {
        let dir = std::env::temp_dir().join(format!(
            "fdo-storage-{}",
            fdo_protocol::utils::Hex::new(&crate::crypto::random::<8>().unwrap())
        ));

        let storage = FileStorage::open(dir.clone()).await.unwrap();

        write_read_cycle(storage.clone()).await;

        storage.write_immutable("key", b"secret").await.unwrap();
        let meta = tokio::fs::metadata(dir.join("key")).await.unwrap();
        assert!(meta.permissions().readonly());

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }
}
