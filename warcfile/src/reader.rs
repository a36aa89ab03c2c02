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

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::compression::{Compression, Decoder};
use crate::counting::CountingReader;
use crate::error::{Error, Result};
use crate::header::HeaderEncoding;
use crate::record::WarcRecord;
use crate::storage::{LocalFs, Storage};

/// WARC file reader configuration.
#[derive(Debug, Clone, Default)]
pub struct ReaderConfig {
    /// Input compression, guessed from the file name if unset
    pub compression: Option<Compression>,
    /// Source encoding of header lines
    pub header_encoding: HeaderEncoding,
}

impl ReaderConfig {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_header_encoding(mut self, encoding: HeaderEncoding) -> Self {
        self.header_encoding = encoding;
        self
    }
}

/// Reads [`WarcRecord`]s from a single WARC file.
///
/// Files whose name ends in `.gz` are decompressed on the fly. Byte counts refer to the
/// file as stored, i.e. to the compressed size for compressed files.
///
/// Iterating over the reader yields each record together with its 1-based index.
pub struct WarcFileReader<R: Read = File> {
    path: PathBuf,
    file_size: u64,
    encoding: HeaderEncoding,
    stream: Option<Decoder<CountingReader<BufReader<R>>>>,
    records_read: u64,
    bytes_at_close: u64,
}

impl WarcFileReader<File> {
    /// Open a file on the local file system.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(&LocalFs, path, ReaderConfig::default())
    }
}

impl<R: Read> WarcFileReader<R> {
    /// Open a file on the given storage backend.
    pub fn open_with<S>(storage: &S, path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self>
    where
        S: Storage<Reader = R>,
    {
        let path = path.as_ref();
        let open_err = |source| Error::Open { path: path.to_path_buf(), source };
        let file_size = storage.size(path).map_err(open_err)?;
        let source = storage.open(path).map_err(open_err)?;

        let compression = config
            .compression
            .unwrap_or_else(|| Compression::guess_for_filename(path));
        tracing::info!(path = %path.display(), ?compression, file_size, "reading WARC file");

        let counted = CountingReader::new(BufReader::new(source));
        Ok(WarcFileReader {
            path: path.to_path_buf(),
            file_size,
            encoding: config.header_encoding,
            stream: Some(Decoder::new(counted, compression)),
            records_read: 0,
            bytes_at_close: 0,
        })
    }

    /// Read the next record.
    ///
    /// Fails with [`Error::EndOfInput`] once the file is exhausted. Any other error leaves
    /// the stream at an unknown position and closes the reader.
    pub fn read(&mut self) -> Result<WarcRecord> {
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        match WarcRecord::read_from_with(stream, self.encoding) {
            Ok(record) => {
                self.records_read += 1;
                Ok(record)
            }
            Err(Error::EndOfInput) => Err(Error::EndOfInput),
            Err(e) => {
                let offset = self.bytes_read();
                let record = self.records_read + 1;
                tracing::error!(
                    path = %self.path.display(),
                    record,
                    offset,
                    error = %e,
                    "cannot read WARC record"
                );
                self.close();
                Err(Error::Record {
                    path: self.path.clone(),
                    record,
                    offset,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Read the next record, or `None` at the end of the file.
    pub fn next_record(&mut self) -> Result<Option<WarcRecord>> {
        match self.read() {
            Ok(record) => Ok(Some(record)),
            Err(Error::EndOfInput) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Close the file. No more reading is possible afterwards.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.bytes_at_close = stream.get_ref().bytes_read();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records read since the file was opened.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Number of bytes consumed from the file since it was opened.
    ///
    /// Stays at its last value after [`close()`](Self::close).
    pub fn bytes_read(&self) -> u64 {
        match &self.stream {
            Some(stream) => stream.get_ref().bytes_read(),
            None => self.bytes_at_close,
        }
    }

    /// Proportion of the file read so far, between 0.0 and 1.0.
    pub fn progress(&self) -> f32 {
        if self.file_size == 0 {
            return 1.0;
        }
        (self.bytes_read() as f32 / self.file_size as f32).min(1.0)
    }
}

impl<R: Read> Iterator for WarcFileReader<R> {
    type Item = Result<(u64, WarcRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.next_record()
            .map(|record| record.map(|r| (self.records_read, r)))
            .transpose()
    }
}
