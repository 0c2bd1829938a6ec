// 🔤 Text Decoder / Normalizer
//
// Raw bytes -> UTF-8 text, whatever the declared source encoding.
// Bytes that cannot be represented are replaced (never fatal); callers get a
// single flag telling them it happened, not a per-character report.

use std::fmt;
use std::str::FromStr;

use encoding_rs::Encoding;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ImportError;

// ============================================================================
// SOURCE ENCODING
// ============================================================================

/// Declared encoding of an input file ("UTF-8", "ISO-8859-1", "WINDOWS-1252", ...)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SourceEncoding(&'static Encoding);

impl SourceEncoding {
    pub fn utf8() -> Self {
        SourceEncoding(encoding_rs::UTF_8)
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    pub fn is_utf8(&self) -> bool {
        self.0 == encoding_rs::UTF_8
    }
}

impl Default for SourceEncoding {
    fn default() -> Self {
        SourceEncoding::utf8()
    }
}

impl fmt::Debug for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceEncoding({})", self.name())
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceEncoding {
    type Err = ImportError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Encoding::for_label(label.trim().as_bytes())
            .map(SourceEncoding)
            .ok_or_else(|| ImportError::UnsupportedEncoding(label.to_string()))
    }
}

impl Serialize for SourceEncoding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SourceEncoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// DECODING
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    /// true if at least one byte sequence was replaced with U+FFFD
    pub lossy: bool,
}

/// Decode raw bytes using the declared encoding, dropping a leading BOM
pub fn decode(bytes: &[u8], encoding: SourceEncoding) -> DecodedText {
    let (text, lossy) = encoding.0.decode_with_bom_removal(bytes);
    DecodedText {
        text: text.into_owned(),
        lossy,
    }
}

// ============================================================================
// FIELD NORMALIZATION
// ============================================================================

/// Canonicalize a competency name/description before it is stored.
///
/// The value goes through an HTML-entity encode/decode pass, then every
/// double quote becomes a single quote so the text survives being written
/// back out as delimited data.
pub fn normalize_field(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let encoded = html_escape::encode_quoted_attribute(text);
    let decoded = html_escape::decode_html_entities(&encoded);

    decoded.replace('"', "'")
}
