// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte sources and sinks addressed by path.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Storage backend that WARC files are read from and written to.
///
/// `create` with `overwrite == false` must be atomic and fail with
/// [`Error::AlreadyExists`] if the path exists.
pub trait Storage {
    type Reader: Read;
    type Writer: Write;

    fn open(&self, path: &Path) -> io::Result<Self::Reader>;

    fn size(&self, path: &Path) -> io::Result<u64>;

    fn create(&self, path: &Path, overwrite: bool) -> Result<Self::Writer>;
}

/// The local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Storage for LocalFs {
    type Reader = File;
    type Writer = File;

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn create(&self, path: &Path, overwrite: bool) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options.open(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => Error::AlreadyExists { path: path.to_path_buf() },
            _ => Error::Io(e),
        })
    }
}

type Blob = Arc<RwLock<Vec<u8>>>;

/// In-memory storage. Clones share the same files.
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: Arc<RwLock<HashMap<PathBuf, Blob>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file, replacing any existing one.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files
            .write()
            .insert(path.into(), Arc::new(RwLock::new(data.into())));
    }

    /// Copy of a file's current contents.
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().get(path).map(|blob| blob.read().clone())
    }

    /// All stored paths in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )
    }
}

/// Append handle to a [`MemoryFs`] file.
#[derive(Debug)]
pub struct MemoryWriter {
    blob: Blob,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.blob.write().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Storage for MemoryFs {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemoryWriter;

    fn open(&self, path: &Path) -> io::Result<Self::Reader> {
        self.get(path)
            .map(Cursor::new)
            .ok_or_else(|| Self::not_found(path))
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        let files = self.files.read();
        let blob = files.get(path).ok_or_else(|| Self::not_found(path))?;
        let len = blob.read().len() as u64;
        Ok(len)
    }

    fn create(&self, path: &Path, overwrite: bool) -> Result<Self::Writer> {
        let mut files = self.files.write();
        if !overwrite && files.contains_key(path) {
            return Err(Error::AlreadyExists { path: path.to_path_buf() });
        }
        let blob = Blob::default();
        files.insert(path.to_path_buf(), blob.clone());
        Ok(MemoryWriter { blob })
    }
}
