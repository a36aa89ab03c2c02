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

use std::io::{self, Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use data_encoding::BASE32;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::{Error, FormatError, Result};
use crate::header::{HeaderEncoding, WarcHeader, WarcRecordType};

/// Maximum length of a single header line in bytes.
pub const MAX_LINE_LENGTH: usize = 10_000;

const CR: u8 = 13;
const LF: u8 = 10;
const SEPARATOR: [u8; 4] = [CR, LF, CR, LF];

// Payload buffers grow as data arrives beyond this size.
const MAX_PREALLOC: u64 = 1 << 20;

/// A WARC record: one header block plus its payload.
///
/// The payload length always equals the header's `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    header: WarcHeader,
    content: Vec<u8>,
}

impl WarcRecord {
    /// Create a record from a header and a payload.
    ///
    /// Fails if `Content-Length` is missing, malformed or does not match the payload size.
    pub fn new(header: WarcHeader, content: Vec<u8>) -> Result<Self> {
        let declared = header.content_length()?;
        if declared != content.len() as u64 {
            return Err(FormatError::ContentLengthMismatch {
                declared,
                actual: content.len() as u64,
            }
            .into());
        }
        Ok(WarcRecord { header, content })
    }

    /// Create a record with the mandatory header fields filled in.
    ///
    /// Sets `WARC-Type`, `WARC-Date` (now), a random `WARC-Record-ID` URN and `Content-Length`.
    ///
    /// # Arguments
    ///
    /// * `record_type` - WARC-Type
    /// * `content` - Record payload
    pub fn build(record_type: WarcRecordType, content: Vec<u8>) -> Self {
        let mut header = WarcHeader::new();
        header.set("WARC-Type", record_type.as_str());
        header.set(
            "WARC-Date",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        header.set("WARC-Record-ID", format!("<urn:uuid:{}>", Uuid::new_v4()));
        header.set("Content-Length", content.len().to_string());
        WarcRecord { header, content }
    }

    /// Copy of this record with additional header fields.
    ///
    /// `Content-Length` cannot be overridden this way.
    pub fn with_fields<K, V>(&self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut header = self.header.clone();
        for (k, v) in fields {
            let k = k.into();
            if k != "Content-Length" {
                header.set(k, v);
            }
        }
        WarcRecord { header, content: self.content.clone() }
    }

    /// Copy of this record with a freshly computed `WARC-Block-Digest`.
    pub fn with_block_digest(&self) -> Self {
        self.with_fields([("WARC-Block-Digest", self.block_digest())])
    }

    /// WARC record header block.
    pub fn header(&self) -> &WarcHeader {
        &self.header
    }

    /// Get the record content as a byte slice.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_parts(self) -> (WarcHeader, Vec<u8>) {
        (self.header, self.content)
    }

    /// Read one record from a stream.
    ///
    /// Returns [`Error::EndOfInput`] if the stream ends cleanly before a version line.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Self::read_from_with(reader, HeaderEncoding::Unicode)
    }

    /// Read one record from a stream, decoding header lines with `encoding`.
    pub fn read_from_with<R: Read>(reader: &mut R, encoding: HeaderEncoding) -> Result<Self> {
        let header = read_header(reader, encoding)?;
        let length = header.content_length()?;

        let mut content = Vec::with_capacity(length.min(MAX_PREALLOC) as usize);
        let read = reader.by_ref().take(length).read_to_end(&mut content)?;
        if (read as u64) < length {
            return Err(Error::Truncated {
                what: "payload",
                expected: Some(length),
                actual: read as u64,
            });
        }

        read_separator(reader)?;
        Ok(WarcRecord { header, content })
    }

    /// Write WARC record onto a stream.
    ///
    /// # Returns
    ///
    /// Number of bytes written
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = self.header.write(writer)?;
        writer.write_all(b"\r\n")?;
        writer.write_all(&self.content)?;
        writer.write_all(&SEPARATOR)?;
        bytes_written += 2 + self.content.len() + SEPARATOR.len();
        Ok(bytes_written)
    }

    /// Serialized record bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        buf
    }

    /// SHA-1 digest of the payload in `sha1:<BASE32>` notation.
    pub fn block_digest(&self) -> String {
        format!("sha1:{}", BASE32.encode(&Sha1::digest(&self.content)))
    }

    /// Verify the `WARC-Block-Digest` field against the payload.
    ///
    /// Accepts base32, base16 and base64 encoded SHA-1 digests. Returns `None` if the record
    /// has no block digest or uses another algorithm.
    pub fn verify_block_digest(&self) -> Option<bool> {
        let (algorithm, expected) = self.header.field("WARC-Block-Digest")?.split_once(':')?;
        if !algorithm.trim().eq_ignore_ascii_case("sha1") {
            return None;
        }
        let expected = expected.trim();
        let decoded = match expected.len() {
            32 => BASE32.decode(expected.to_ascii_uppercase().as_bytes()).ok(),
            40 => hex::decode(expected).ok(),
            _ => BASE64.decode(expected).ok(),
        };
        let computed = Sha1::digest(&self.content);
        Some(decoded.is_some_and(|d| d.as_slice() == computed.as_slice()))
    }
}

fn read_header<R: Read>(reader: &mut R, encoding: HeaderEncoding) -> Result<WarcHeader> {
    let version_line = match read_line(reader)? {
        Some(line) => encoding.decode(&line),
        None => return Err(Error::EndOfInput),
    };
    if !is_version_line(&version_line) {
        return Err(FormatError::BadVersionLine(version_line).into());
    }

    let mut header = WarcHeader::new();
    let mut last_field = None;
    loop {
        let line = match read_line(reader)? {
            Some(line) => encoding.decode(&line),
            None => return Err(Error::Truncated { what: "header", expected: None, actual: 0 }),
        };
        if line.is_empty() {
            return Ok(header);
        }

        if line.starts_with(&[' ', '\t'][..]) {
            match last_field {
                Some(idx) => header.append_to(idx, &line),
                None => return Err(FormatError::OrphanContinuation(line).into()),
            }
            continue;
        }

        match line.split_once(':') {
            Some((key, value)) => last_field = Some(header.set(key.trim(), value.trim())),
            None => return Err(FormatError::MalformedHeaderLine(line).into()),
        }
    }
}

fn is_version_line(line: &str) -> bool {
    line.strip_prefix("WARC/").is_some_and(|v| {
        !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit() || b == b'.')
    })
}

/// Read a CRLF-terminated line, without the terminator.
///
/// A CR that is not immediately followed by LF is kept as an ordinary byte.
/// Returns `None` if the stream ends before the first byte.
fn read_line<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    loop {
        let Some(b) = read_byte(reader)? else {
            if line.is_empty() {
                return Ok(None);
            }
            return Err(Error::Truncated {
                what: "header line",
                expected: None,
                actual: line.len() as u64,
            });
        };
        if b == LF && line.last() == Some(&CR) {
            line.pop();
            return Ok(Some(line));
        }
        line.push(b);
        // One extra byte is allowed for a pending CR.
        if line.len() > MAX_LINE_LENGTH + usize::from(b == CR) {
            return Err(FormatError::LineTooLong.into());
        }
    }
}

fn read_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn read_separator<R: Read>(reader: &mut R) -> Result<()> {
    let mut sep = [0u8; 4];
    let mut filled = 0;
    while filled < sep.len() {
        match reader.read(&mut sep[filled..]) {
            Ok(0) => {
                return Err(Error::Truncated {
                    what: "record separator",
                    expected: Some(SEPARATOR.len() as u64),
                    actual: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if sep != SEPARATOR {
        return Err(FormatError::BadSeparator(sep).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const WARCINFO: &str = "WARC/1.0\r\n\
        WARC-Type: warcinfo\r\n\
        WARC-Date: 2014-03-18T17:47:38Z\r\n\
        WARC-Record-ID: <urn:uuid:d9bbb325-c09f-473c-8600-1c9dbd4ec443>\r\n\
        Content-Length: 371\r\n\
        Content-Type: application/warc-fields\r\n\
        WARC-Filename: CC-MAIN-20140313024455-00000-ip-10-183-142-35.ec2.internal.warc.gz\r\n\
        \r\n\
        robots: classic\r\n\
        hostname: ip-10-183-142-35.ec2.internal\r\n\
        software: Nutch 1.6 (CC)/CC WarcExport 1.0\r\n\
        isPartOf: CC-MAIN-2014-10\r\n\
        operator: CommonCrawl Admin\r\n\
        description: Wide crawl of the web with URLs provided by Blekko for March 2014\r\n\
        publisher: CommonCrawl\r\n\
        format: WARC File Format 1.0\r\n\
        conformsTo: http://bibnum.bnf.fr/WARC/WARC_ISO_28500_version1_latestdraft.pdf\r\n\
        \r\n\
        \r\n\
        \r\n";

    fn parse(bytes: &[u8]) -> Result<WarcRecord> {
        WarcRecord::read_from(&mut Cursor::new(bytes))
    }

    fn sample() -> WarcRecord {
        let header = WarcHeader::from_iter([
            ("WARC-Type", "resource"),
            ("WARC-Target-URI", "http://example.com/"),
            ("Content-Length", "13"),
        ]);
        WarcRecord::new(header, b"Hello\r\nWorld!".to_vec()).unwrap()
    }

    #[test]
    fn parse_warcinfo() {
        let record = parse(WARCINFO.as_bytes()).unwrap();
        let header = record.header();
        assert_eq!(header.content_length().unwrap(), 371);
        assert_eq!(header.record_type(), Some("warcinfo"));
        assert_eq!(header.date_string(), Some("2014-03-18T17:47:38Z"));
        assert_eq!(
            header.record_id(),
            Some("<urn:uuid:d9bbb325-c09f-473c-8600-1c9dbd4ec443>")
        );
        assert_eq!(header.content_type(), Some("application/warc-fields"));
        assert_eq!(header.target_uri(), None);
        assert_eq!(record.content().len(), 371);
        assert!(record.content().starts_with(b"robots: classic\r\n"));
    }

    #[test]
    fn round_trip() {
        let record = sample();
        let bytes = record.serialize();
        assert_eq!(bytes.len(), record.write_to(&mut io::sink()).unwrap());
        assert_eq!(parse(&bytes).unwrap(), record);

        let empty = WarcRecord::build(WarcRecordType::Metadata, Vec::new());
        assert_eq!(parse(&empty.serialize()).unwrap(), empty);
    }

    #[test]
    fn consecutive_records() {
        let a = sample();
        let b = WarcRecord::build(WarcRecordType::Request, b"GET / HTTP/1.1\r\n\r\n".to_vec());
        let mut bytes = a.serialize();
        bytes.extend(b.serialize());

        let mut cursor = Cursor::new(bytes);
        assert_eq!(WarcRecord::read_from(&mut cursor).unwrap(), a);
        assert_eq!(WarcRecord::read_from(&mut cursor).unwrap(), b);
        assert!(WarcRecord::read_from(&mut cursor).unwrap_err().is_end_of_input());
    }

    #[test]
    fn bad_version_line() {
        let err = parse(b"NOT-WARC/1.0\r\nContent-Length: 0\r\n\r\n\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadVersionLine(ref l)) if l == "NOT-WARC/1.0"));

        for bad in ["WARC/", "WARC/1.0a", "warc/1.0", "WARC/1.0 "] {
            let input = format!("{bad}\r\nContent-Length: 0\r\n\r\n\r\n\r\n");
            assert!(parse(input.as_bytes()).unwrap_err().is_format_error(), "accepted {bad:?}");
        }
        assert!(parse(b"WARC/0.18\r\nContent-Length: 0\r\n\r\n\r\n\r\n").is_ok());
    }

    #[test]
    fn bad_separator() {
        let mut bytes = sample().serialize();
        let len = bytes.len();
        bytes[len - 2] = b'X';
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::BadSeparator([13, 10, b'X', 10]))
        ));
    }

    #[test]
    fn malformed_header_line() {
        let err = parse(b"WARC/1.0\r\nno colon here\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::MalformedHeaderLine(_))));
    }

    #[test]
    fn continuation_lines() {
        let input = b"WARC/1.0\r\n\
            WARC-Type: metadata\r\n\
            X-Long: first\r\n\
            \tsecond\r\n  third\r\n\
            Content-Length: 0\r\n\r\n\r\n\r\n";
        let record = parse(input).unwrap();
        assert_eq!(record.header().field("X-Long"), Some("first\tsecond  third"));

        let err = parse(b"WARC/1.0\r\n orphan\r\nContent-Length: 0\r\n\r\n\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::OrphanContinuation(_))));
    }

    #[test]
    fn repeated_field_last_wins() {
        let input = b"WARC/1.0\r\nA: 1\r\nContent-Length: 0\r\nA: 2\r\n\r\n\r\n\r\n";
        let record = parse(input).unwrap();
        let fields: Vec<_> = record.header().iter().collect();
        assert_eq!(fields, [("A", "2"), ("Content-Length", "0")]);
    }

    #[test]
    fn lone_cr_is_kept_as_content_byte() {
        // Only CR LF ends a line; a lone CR is not dropped.
        let input = b"WARC/1.0\r\nX-Odd: a\rb\r\nContent-Length: 0\r\n\r\n\r\n\r\n";
        let record = parse(input).unwrap();
        assert_eq!(record.header().field("X-Odd"), Some("a\rb"));
    }

    #[test]
    fn line_length_limit() {
        let ok = format!("WARC/1.0\r\nX: {}\r\nContent-Length: 0\r\n\r\n\r\n\r\n", "a".repeat(MAX_LINE_LENGTH - 3));
        assert!(parse(ok.as_bytes()).is_ok());

        let long = format!("WARC/1.0\r\nX: {}\r\n", "a".repeat(MAX_LINE_LENGTH));
        let err = parse(long.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::LineTooLong)));
    }

    #[test]
    fn truncation() {
        let bytes = sample().serialize();
        let length = sample().content().len() as u64;
        let err = parse(&bytes[..bytes.len() - 10]).unwrap_err();
        match err {
            Error::Truncated { what: "payload", expected, actual } => {
                assert_eq!(expected, Some(length));
                assert_eq!(actual, length - 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = parse(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated { what: "record separator", expected: Some(4), actual: 2 }
        ));

        let err = parse(b"WARC/1.0\r\nWARC-Type: resource\r\n").unwrap_err();
        assert!(matches!(err, Error::Truncated { what: "header", .. }));

        let err = parse(b"WARC/1.").unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated { what: "header line", expected: None, actual: 7 }
        ));
    }

    #[test]
    fn empty_stream_is_end_of_input() {
        assert!(parse(b"").unwrap_err().is_end_of_input());
    }

    #[test]
    fn missing_content_length() {
        let err = parse(b"WARC/1.0\r\nWARC-Type: resource\r\n\r\n\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::MissingContentLength)));
    }

    #[test]
    fn length_mismatch_rejected() {
        let header = WarcHeader::from_iter([("Content-Length", "3")]);
        let err = WarcRecord::new(header, b"four".to_vec()).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::ContentLengthMismatch { declared: 3, actual: 4 })
        ));
    }

    #[test]
    fn build_sets_mandatory_fields() {
        let record = WarcRecord::build(WarcRecordType::Resource, b"abc".to_vec());
        let header = record.header();
        assert_eq!(header.record_type(), Some("resource"));
        assert_eq!(header.content_length().unwrap(), 3);
        assert!(header.date().is_some());
        let id = header.record_id().unwrap();
        assert!(id.starts_with("<urn:uuid:") && id.ends_with('>'));

        let ignored = record.with_fields([("Content-Length", "99")]);
        assert_eq!(ignored.header().content_length().unwrap(), 3);
    }

    #[test]
    fn block_digests() {
        // SHA-1 of the empty string
        let record = WarcRecord::build(WarcRecordType::Resource, Vec::new());
        assert_eq!(record.block_digest(), "sha1:3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ");
        assert_eq!(record.verify_block_digest(), None);
        assert_eq!(record.with_block_digest().verify_block_digest(), Some(true));

        let base16 = record.with_fields([(
            "WARC-Block-Digest",
            "sha1:da39a3ee5e6b4b0d3255bfef95601890afd80709",
        )]);
        assert_eq!(base16.verify_block_digest(), Some(true));

        let upper = record.with_fields([(
            "WARC-Block-Digest",
            "SHA1:DA39A3EE5E6B4B0D3255BFEF95601890AFD80709",
        )]);
        assert_eq!(upper.verify_block_digest(), Some(true));

        let lower = record.with_fields([("WARC-Block-Digest", "sha1:3i42h3s6nnfq2msvx7xzkyayscx5qbyj")]);
        assert_eq!(lower.verify_block_digest(), Some(true));

        let b64 = record.with_fields([("WARC-Block-Digest", "sha1:2jmj7l5rSw0yVb/vlWAYkK/YBwk=")]);
        assert_eq!(b64.verify_block_digest(), Some(true));

        let wrong = sample().with_fields([("WARC-Block-Digest", record.block_digest())]);
        assert_eq!(wrong.verify_block_digest(), Some(false));

        let md5 = record.with_fields([("WARC-Block-Digest", "md5:1B2M2Y8AsgTpgAmY7PhCfg==")]);
        assert_eq!(md5.verify_block_digest(), None);
    }
}
