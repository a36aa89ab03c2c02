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

use chrono::{DateTime, Utc};
use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};

use crate::error::{FormatError, Result};

pub const WARC_VERSION: &str = "WARC/1.0";

/// WARC record type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarcRecordType {
    WarcInfo,
    Response,
    Resource,
    Request,
    Metadata,
    Revisit,
    Conversion,
    Continuation,
    Unknown,
}

impl WarcRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarcRecordType::WarcInfo => "warcinfo",
            WarcRecordType::Response => "response",
            WarcRecordType::Resource => "resource",
            WarcRecordType::Request => "request",
            WarcRecordType::Metadata => "metadata",
            WarcRecordType::Revisit => "revisit",
            WarcRecordType::Conversion => "conversion",
            WarcRecordType::Continuation => "continuation",
            WarcRecordType::Unknown => "unknown",
        }
    }
}

impl TryFrom<&str> for WarcRecordType {
    type Error = &'static str;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "warcinfo" => Ok(WarcRecordType::WarcInfo),
            "response" => Ok(WarcRecordType::Response),
            "resource" => Ok(WarcRecordType::Resource),
            "request" => Ok(WarcRecordType::Request),
            "metadata" => Ok(WarcRecordType::Metadata),
            "revisit" => Ok(WarcRecordType::Revisit),
            "conversion" => Ok(WarcRecordType::Conversion),
            "continuation" => Ok(WarcRecordType::Continuation),
            "unknown" => Ok(WarcRecordType::Unknown),
            _ => Err("Invalid record type."),
        }
    }
}

impl From<WarcRecordType> for &'static str {
    fn from(value: WarcRecordType) -> Self {
        value.as_str()
    }
}

/// Source encoding of header lines.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
pub enum HeaderEncoding {
    /// UTF-8, invalid sequences are replaced.
    #[default]
    Unicode,
    /// Windows-1252, for legacy producers.
    Latin1,
}

impl HeaderEncoding {
    pub(crate) fn decode(&self, byte_str: &[u8]) -> String {
        match self {
            HeaderEncoding::Unicode => String::from_utf8_lossy(byte_str).into_owned(),
            HeaderEncoding::Latin1 => WINDOWS_1252
                .decode(byte_str, DecoderTrap::Replace)
                .unwrap_or_else(|_| String::from_utf8_lossy(byte_str).into_owned()),
        }
    }
}

/// Ordered WARC header block.
///
/// Field names are case-sensitive. Setting an existing field replaces its value
/// in place, so the original position of the field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarcHeader {
    fields: Vec<(String, String)>,
}

impl WarcHeader {
    /// Create an empty header block.
    pub fn new() -> Self {
        WarcHeader { fields: Vec::new() }
    }

    /// Set a field, replacing the value of an existing field with the same name.
    ///
    /// Returns the position of the field in the header block.
    ///
    /// # Arguments
    ///
    /// * `key` - Field name
    /// * `value` - Field value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> usize {
        let key = key.into();
        let value = value.into();
        match self.fields.iter().position(|(k, _)| *k == key) {
            Some(idx) => {
                self.fields[idx].1 = value;
                idx
            }
            None => {
                self.fields.push((key, value));
                self.fields.len() - 1
            }
        }
    }

    /// Append raw text to the value of the field at `idx`.
    pub(crate) fn append_to(&mut self, idx: usize, text: &str) {
        if let Some((_, value)) = self.fields.get_mut(idx) {
            value.push_str(text);
        }
    }

    /// Get the value of a field.
    ///
    /// # Arguments
    ///
    /// * `name` - Field name (case-sensitive)
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `WARC-Type`.
    pub fn record_type(&self) -> Option<&str> {
        self.field("WARC-Type")
    }

    /// Typed value of `WARC-Type`. Unrecognised types map to [`WarcRecordType::Unknown`].
    pub fn warc_type(&self) -> Option<WarcRecordType> {
        self.record_type()
            .map(|t| WarcRecordType::try_from(t).unwrap_or(WarcRecordType::Unknown))
    }

    /// Value of `WARC-Date`.
    pub fn date_string(&self) -> Option<&str> {
        self.field("WARC-Date")
    }

    /// `WARC-Date` parsed as an RFC 3339 timestamp.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.date_string()?)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    /// Value of `WARC-Record-ID`.
    pub fn record_id(&self) -> Option<&str> {
        self.field("WARC-Record-ID")
    }

    /// Value of `Content-Type`.
    pub fn content_type(&self) -> Option<&str> {
        self.field("Content-Type")
    }

    /// Value of `WARC-Target-URI`.
    pub fn target_uri(&self) -> Option<&str> {
        self.field("WARC-Target-URI")
    }

    /// Value of `Content-Length` as a byte count.
    pub fn content_length(&self) -> Result<u64> {
        let raw = self
            .field("Content-Length")
            .ok_or(FormatError::MissingContentLength)?;
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FormatError::MalformedContentLength(raw.to_string()).into());
        }
        raw.parse::<u64>()
            .map_err(|_| FormatError::MalformedContentLength(raw.to_string()).into())
    }

    /// Iterator of field names and values in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + use<'_> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the header block has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Version line and fields, each terminated by CRLF.
    ///
    /// The blank line that ends a header block is not included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_len());
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut buf);
        buf
    }

    /// Write header block into stream.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(WARC_VERSION.as_bytes())?;
        writer.write_all(b"\r\n")?;
        for (key, value) in &self.fields {
            writer.write_all(key.as_bytes())?;
            writer.write_all(b": ")?;
            writer.write_all(value.as_bytes())?;
            writer.write_all(b"\r\n")?;
        }
        Ok(self.serialized_len())
    }

    fn serialized_len(&self) -> usize {
        self.fields
            .iter()
            .map(|(k, v)| k.len() + v.len() + 4)
            .sum::<usize>()
            + WARC_VERSION.len()
            + 2
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WarcHeader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = WarcHeader::new();
        for (k, v) in iter {
            header.set(k, v);
        }
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn info_header() -> WarcHeader {
        WarcHeader::from_iter([
            ("WARC-Type", "warcinfo"),
            ("WARC-Date", "2014-03-18T17:47:38Z"),
            ("Content-Length", "371"),
        ])
    }

    #[test]
    fn typed_accessors() {
        let header = info_header();
        assert_eq!(header.record_type(), Some("warcinfo"));
        assert_eq!(header.warc_type(), Some(WarcRecordType::WarcInfo));
        assert_eq!(header.content_length().unwrap(), 371);
        assert_eq!(
            header.date().unwrap().to_rfc3339(),
            "2014-03-18T17:47:38+00:00"
        );
        assert_eq!(header.target_uri(), None);
        assert_eq!(header.field("warc-type"), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut header = info_header();
        assert_eq!(header.set("WARC-Type", "response"), 0);
        assert_eq!(header.set("WARC-Target-URI", "http://example.com/"), 3);
        let keys: Vec<_> = header.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["WARC-Type", "WARC-Date", "Content-Length", "WARC-Target-URI"]
        );
        assert_eq!(header.warc_type(), Some(WarcRecordType::Response));
    }

    #[test]
    fn content_length_errors() {
        let header = WarcHeader::from_iter([("WARC-Type", "resource")]);
        assert!(matches!(
            header.content_length(),
            Err(Error::Format(FormatError::MissingContentLength))
        ));

        for bad in ["", "-1", "+5", "12a", " 7", "99999999999999999999999"] {
            let header = WarcHeader::from_iter([("Content-Length", bad)]);
            assert!(
                matches!(
                    header.content_length(),
                    Err(Error::Format(FormatError::MalformedContentLength(_)))
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn serialize_has_no_blank_line() {
        let header = WarcHeader::from_iter([("WARC-Type", "metadata"), ("Content-Length", "0")]);
        assert_eq!(
            header.serialize(),
            b"WARC/1.0\r\nWARC-Type: metadata\r\nContent-Length: 0\r\n"
        );
        assert_eq!(header.write(&mut io::sink()).unwrap(), header.serialize().len());
    }

    #[test]
    fn unknown_record_type() {
        let header = WarcHeader::from_iter([("WARC-Type", "x-custom")]);
        assert_eq!(header.warc_type(), Some(WarcRecordType::Unknown));
        assert_eq!(WarcRecordType::try_from("RESPONSE"), Ok(WarcRecordType::Response));
    }

    #[test]
    fn latin1_decoding() {
        assert_eq!(HeaderEncoding::Latin1.decode(b"caf\xe9"), "café");
        assert_eq!(HeaderEncoding::Unicode.decode(b"caf\xe9"), "caf\u{FFFD}");
    }
}
