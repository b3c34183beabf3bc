//! Text encodings for reading and writing file contents.
//!
//! Connectors only ever see bytes; text is converted here, before a write is
//! dispatched and after a read returns.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RemoteFsError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileEncoding {
    #[default]
    #[serde(rename = "UTF-8", alias = "UTF_8", alias = "Utf8")]
    Utf8,
    #[serde(rename = "UTF-32", alias = "UTF_32", alias = "Utf32")]
    Utf32,
    #[serde(rename = "ISO-8859-1", alias = "ISO_8859_1", alias = "Iso8859_1")]
    Iso8859_1,
    #[serde(rename = "ASCII", alias = "Ascii")]
    Ascii,
    #[serde(rename = "Latin-1", alias = "LATIN_1", alias = "Latin1")]
    Latin1,
    /// No text conversion; the payload is handled as bytes only.
    #[serde(rename = "Raw", alias = "RAW")]
    Raw,
}

impl FileEncoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf32 => "UTF-32",
            Self::Iso8859_1 => "ISO-8859-1",
            Self::Ascii => "ASCII",
            Self::Latin1 => "Latin-1",
            Self::Raw => "Raw",
        }
    }

    pub const fn is_text(self) -> bool {
        !matches!(self, Self::Raw)
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Utf32 => Ok(text
                .chars()
                .flat_map(|c| u32::from(c).to_le_bytes())
                .collect()),
            Self::Iso8859_1 | Self::Latin1 => self.encode_single_byte(text, 0xFF),
            Self::Ascii => self.encode_single_byte(text, 0x7F),
            Self::Raw => Err(RemoteFsError::Encoding {
                encoding: self.to_string(),
                reason: "raw payloads carry bytes, not text".to_string(),
            }),
        }
    }

    /// Decodes bytes into text. Malformed input is replaced, never rejected.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 | Self::Raw => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf32 => decode_utf32_le(bytes),
            Self::Iso8859_1 | Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
        }
    }

    fn encode_single_byte(self, text: &str, max: u32) -> Result<Vec<u8>> {
        text.chars()
            .map(|c| {
                let code = u32::from(c);
                u8::try_from(code)
                    .ok()
                    .filter(|_| code <= max)
                    .ok_or_else(|| RemoteFsError::Encoding {
                        encoding: self.to_string(),
                        reason: format!("character {c:?} (U+{code:04X}) is not representable"),
                    })
            })
            .collect()
    }
}

impl fmt::Display for FileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn decode_utf32_le(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks(4) {
        let Ok(unit) = <[u8; 4]>::try_from(chunk) else {
            text.push(char::REPLACEMENT_CHARACTER);
            break;
        };
        let code = u32::from_le_bytes(unit);
        text.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    text
}
