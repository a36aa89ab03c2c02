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

//! Whole-file stream compression.

use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

/// Supported stream compression codecs.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum Compression {
    /// Uncompressed data
    #[default]
    None,
    /// `gzip` compression
    Gzip,
}

impl Compression {
    /// Guess the codec from a file name. Only the name is inspected.
    pub fn guess_for_filename<P: AsRef<Path>>(path: P) -> Compression {
        match path.as_ref().extension() {
            Some(ext) if ext == "gz" => Compression::Gzip,
            _ => Compression::None,
        }
    }

    /// File name suffix for this codec, including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
        }
    }
}

/// Reads from an input stream with the given [`Compression`].
///
/// Gzip input may consist of several concatenated members.
pub enum Decoder<R: Read> {
    Plain(R),
    Gzip(MultiGzDecoder<R>),
}

impl<R: Read> Decoder<R> {
    pub fn new(source: R, mode: Compression) -> Self {
        match mode {
            Compression::None => Self::Plain(source),
            Compression::Gzip => Self::Gzip(MultiGzDecoder::new(source)),
        }
    }

    /// The underlying (compressed) stream.
    pub fn get_ref(&self) -> &R {
        match self {
            Self::Plain(r) => r,
            Self::Gzip(gz) => gz.get_ref(),
        }
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Plain(r) => r.read(buf),
            Decoder::Gzip(r) => r.read(buf),
        }
    }
}

/// Writes to an output stream with the given [`Compression`].
pub enum Encoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    pub fn new(dest: W, mode: Compression) -> Self {
        match mode {
            Compression::None => Self::Plain(dest),
            Compression::Gzip => Self::Gzip(GzEncoder::new(dest, flate2::Compression::default())),
        }
    }

    /// The underlying (compressed) stream.
    pub fn get_ref(&self) -> &W {
        match self {
            Self::Plain(w) => w,
            Self::Gzip(gz) => gz.get_ref(),
        }
    }

    /// Terminate the compressed stream and return the output stream.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::Gzip(gz) => gz.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Gzip(w) => w.flush(),
        }
    }
}
