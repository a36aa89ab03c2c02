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

use std::ffi::OsString;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::compression::{Compression, Encoder};
use crate::counting::CountingWriter;
use crate::error::{Error, Result};
use crate::record::WarcRecord;
use crate::storage::{LocalFs, Storage};

/// Default maximum segment size (1 GB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1_000_000_000;

/// WARC file writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Segment size in bytes after which a new segment file is started
    pub max_segment_size: u64,
    /// Output compression
    pub compression: Compression,
    /// Overwrite existing segment files instead of choosing a new name
    pub overwrite: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            compression: Compression::None,
            overwrite: false,
        }
    }
}

impl WriterConfig {
    /// Job property holding the maximum segment size.
    pub const SEGMENT_SIZE_KEY: &'static str = "warc.output.segment.size";

    pub fn with_max_segment_size(mut self, max_segment_size: u64) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Apply a job configuration property. Unknown keys are ignored.
    ///
    /// # Arguments
    ///
    /// * `key` - Property name
    /// * `value` - Property value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if key == Self::SEGMENT_SIZE_KEY {
            self.max_segment_size = value.trim().parse().map_err(|_| Error::InvalidConfig {
                key: key.to_string(),
                value: value.to_string(),
            })?;
        }
        Ok(())
    }
}

type SegmentStream<W> = Encoder<CountingWriter<BufWriter<W>>>;

/// Writes [`WarcRecord`]s to a series of segment files.
///
/// Segment files are named `<base>.seg-NNNNN.attempt-NNNNN.warc[.gz]`. A new segment is
/// started before a write once the current one has grown beyond the configured maximum
/// size, so segments may exceed it by up to one record. If a segment file already exists,
/// the attempt number is increased until a free name is found.
pub struct WarcFileWriter<S: Storage = LocalFs> {
    storage: S,
    base_path: PathBuf,
    config: WriterConfig,
    segments_created: u64,
    segment_attempts: u64,
    records_written: u64,
    finished_bytes: u64,
    current_path: PathBuf,
    stream: Option<SegmentStream<S::Writer>>,
}

impl WarcFileWriter<LocalFs> {
    /// Create a writer on the local file system and open its first segment.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Path prefix of the segment files
    /// * `config` - Writer configuration
    pub fn create(base_path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        Self::create_with(LocalFs, base_path, config)
    }
}

impl<S: Storage> WarcFileWriter<S> {
    /// Create a writer on the given storage backend and open its first segment.
    pub fn create_with(storage: S, base_path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let mut writer = WarcFileWriter {
            storage,
            base_path: base_path.as_ref().to_path_buf(),
            config,
            segments_created: 0,
            segment_attempts: 0,
            records_written: 0,
            finished_bytes: 0,
            current_path: PathBuf::new(),
            stream: None,
        };
        writer.create_segment()?;
        Ok(writer)
    }

    /// Path of the segment file with the given segment and attempt number.
    pub fn segment_path(&self, segment: u64, attempt: u64) -> PathBuf {
        let mut name = OsString::from(self.base_path.as_os_str());
        name.push(format!(
            ".seg-{:05}.attempt-{:05}.warc{}",
            segment,
            attempt,
            self.config.compression.extension()
        ));
        PathBuf::from(name)
    }

    fn create_segment(&mut self) -> Result<()> {
        self.segment_attempts = 0;
        loop {
            let segment = self.segments_created;
            let attempt = self.segment_attempts;
            let path = self.segment_path(segment, attempt);

            match self.storage.create(&path, self.config.overwrite) {
                Ok(file) => {
                    let counted = CountingWriter::new(BufWriter::new(file));
                    self.stream = Some(Encoder::new(counted, self.config.compression));
                    self.segments_created += 1;
                    tracing::info!(path = %path.display(), segment, attempt, "writing to output file");
                    self.current_path = path;
                    return Ok(());
                }
                Err(Error::AlreadyExists { .. }) => {
                    tracing::warn!(
                        path = %path.display(),
                        segment,
                        attempt,
                        "output file already exists, retrying"
                    );
                    self.segment_attempts += 1;
                }
                Err(Error::Io(source)) => {
                    return Err(Error::CreateSegment { path, segment, attempt, source });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn finish_segment(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let finished = stream.finish().and_then(|counted| {
            self.finished_bytes += counted.bytes_written();
            counted.into_inner().flush()
        });
        finished.map_err(|e| self.segment_error(e))
    }

    /// Attach the current segment to a write failure.
    fn segment_error(&self, source: io::Error) -> Error {
        let segment = self.segments_created.saturating_sub(1);
        let attempt = self.segment_attempts;
        tracing::error!(
            path = %self.current_path.display(),
            segment,
            attempt,
            error = %source,
            "cannot write to output file, closing"
        );
        Error::WriteSegment {
            path: self.current_path.clone(),
            segment,
            attempt,
            source,
        }
    }

    /// Write a record, starting a new segment first if the current one is full.
    pub fn write(&mut self, record: &WarcRecord) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Closed);
        }
        if self.segment_bytes() > self.config.max_segment_size {
            tracing::debug!(
                path = %self.current_path.display(),
                bytes = self.segment_bytes(),
                max = self.config.max_segment_size,
                "segment full, rotating"
            );
            self.finish_segment()?;
            self.create_segment()?;
        }

        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        if let Err(e) = record.write_to(stream) {
            self.stream = None;
            return Err(self.segment_error(e));
        }
        self.records_written += 1;
        Ok(())
    }

    /// Write a record if there is one.
    pub fn write_opt(&mut self, record: Option<&WarcRecord>) -> Result<()> {
        match record {
            Some(record) => self.write(record),
            None => Ok(()),
        }
    }

    /// Flush and close the current segment. No more writing is possible afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.finish_segment()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Bytes written to the current segment file so far.
    ///
    /// For compressed output this is the compressed size.
    pub fn segment_bytes(&self) -> u64 {
        self.stream
            .as_ref()
            .map_or(0, |s| s.get_ref().bytes_written())
    }

    /// Bytes written across all segment files.
    pub fn bytes_written(&self) -> u64 {
        self.finished_bytes + self.segment_bytes()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn segments_created(&self) -> u64 {
        self.segments_created
    }

    /// Path of the most recently opened segment file.
    pub fn current_segment(&self) -> &Path {
        &self.current_path
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }
}
