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

use std::io;
use std::path::PathBuf;

use crate::record::MAX_LINE_LENGTH;

pub type Result<T> = std::result::Result<T, Error>;

/// Violations of the WARC record grammar.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected WARC version line, got {0:?}")]
    BadVersionLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    #[error("continuation line before any header field: {0:?}")]
    OrphanContinuation(String),

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("malformed Content-Length header: {0:?}")]
    MalformedContentLength(String),

    #[error("bad record separator, expected CR LF CR LF, got {0:?}")]
    BadSeparator([u8; 4]),

    #[error("line too long (more than {} bytes)", MAX_LINE_LENGTH)]
    LineTooLong,

    #[error("Content-Length is {declared}, but payload has {actual} bytes")]
    ContentLengthMismatch { declared: u64, actual: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Stream ended inside a record. `expected` is the required length where it is known
    /// (the declared payload length, or the 4 separator bytes).
    #[error("truncated record: stream ended inside {what} after {actual} bytes{}",
        .expected.map(|n| format!(" of {n}")).unwrap_or_default())]
    Truncated { what: &'static str, expected: Option<u64>, actual: u64 },

    /// Clean end of stream at a record boundary.
    #[error("end of input")]
    EndOfInput,

    #[error("file `{}` already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("cannot open `{}`", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create segment {segment} (attempt {attempt}) at `{}`", .path.display())]
    CreateSegment {
        path: PathBuf,
        segment: u64,
        attempt: u64,
        #[source]
        source: io::Error,
    },

    #[error("cannot write to segment {segment} (attempt {attempt}) at `{}`", .path.display())]
    WriteSegment {
        path: PathBuf,
        segment: u64,
        attempt: u64,
        #[source]
        source: io::Error,
    },

    #[error("bad record #{record} in `{}` near byte offset {offset}", .path.display())]
    Record {
        path: PathBuf,
        record: u64,
        offset: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("stream has already been closed")]
    Closed,

    #[error("invalid value {value:?} for `{key}`")]
    InvalidConfig { key: String, value: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Innermost error with any reader context removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::Record { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is (or wraps) a grammar violation.
    pub fn is_format_error(&self) -> bool {
        matches!(self.root(), Error::Format(_))
    }

    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Error::EndOfInput)
    }
}
