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

//! Reading and writing of WARC files.
//!
//! A WARC file is a sequence of records, each consisting of a `WARC/1.0` version line,
//! `Name: value` header fields, a blank line, exactly `Content-Length` payload bytes and
//! a final `CRLF CRLF`. Whole files may be gzip-compressed.
//!
//! [`WarcFileReader`] reads records from a single (possibly compressed) file and tracks
//! progress. [`WarcFileWriter`] writes records into size-limited segment files and avoids
//! clobbering files created by concurrent writers.

pub mod compression;
pub mod counting;
pub mod error;
pub mod header;
pub mod reader;
pub mod record;
pub mod storage;
pub mod writer;

pub use compression::Compression;
pub use error::{Error, FormatError, Result};
pub use header::{HeaderEncoding, WarcHeader, WarcRecordType, WARC_VERSION};
pub use reader::{ReaderConfig, WarcFileReader};
pub use record::{WarcRecord, MAX_LINE_LENGTH};
pub use storage::{LocalFs, MemoryFs, Storage};
pub use writer::{WarcFileWriter, WriterConfig, DEFAULT_MAX_SEGMENT_SIZE};
