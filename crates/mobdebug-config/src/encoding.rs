use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Text encodings accepted for `sourceEncoding` / `consoleEncoding`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    Ascii,
    #[default]
    Utf8,
    Utf16le,
    Ucs2,
    Base64,
    Base64url,
    Latin1,
}

impl TextEncoding {
    /// Parse an encoding name case-insensitively.
    ///
    /// Returns `None` for names outside the allow-list so callers can apply
    /// their own fallback.
    pub fn parse(name: &str) -> Option<Self> {
        let encoding = match name.trim().to_ascii_lowercase().as_str() {
            "ascii" => Self::Ascii,
            "utf8" | "utf-8" => Self::Utf8,
            "utf16le" => Self::Utf16le,
            "ucs2" | "ucs-2" => Self::Ucs2,
            "base64" => Self::Base64,
            "base64url" => Self::Base64url,
            "latin1" => Self::Latin1,
            _ => return None,
        };
        Some(encoding)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Utf8 => "utf8",
            Self::Utf16le => "utf16le",
            Self::Ucs2 => "ucs2",
            Self::Base64 => "base64",
            Self::Base64url => "base64url",
            Self::Latin1 => "latin1",
        }
    }

    /// Turn raw process output into text.
    ///
    /// Invalid sequences are replaced rather than rejected: console output is
    /// best-effort.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => bytes.iter().map(|b| char::from(b & 0x7f)).collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16le | Self::Ucs2 => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            Self::Base64 => STANDARD.encode(bytes),
            Self::Base64url => URL_SAFE_NO_PAD.encode(bytes),
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
