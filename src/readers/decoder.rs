use crate::error::{IngestError, Result};
use encoding_rs::{Encoding, GBK, UTF_8};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes raw file bytes by trying a list of encodings in order
#[derive(Debug, Clone)]
pub struct TextDecoder {
    encodings: Vec<(String, &'static Encoding)>,
}

impl TextDecoder {
    pub fn new(labels: &[String]) -> Result<Self> {
        let encodings = labels
            .iter()
            .map(|label| {
                resolve_encoding(label)
                    .map(|encoding| (label.clone(), encoding))
                    .ok_or_else(|| IngestError::Config(format!("Unknown text encoding: '{}'", label)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { encodings })
    }

    /// Decode with the first encoding that accepts the bytes without any
    /// malformed sequence. Returns the text and the label that worked.
    pub fn decode(&self, bytes: &[u8]) -> Option<(String, &str)> {
        for (label, encoding) in &self.encodings {
            let input = if *encoding == UTF_8 {
                bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
            } else {
                bytes
            };

            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(input) {
                return Some((text.into_owned(), label.as_str()));
            }
        }

        None
    }

    pub fn labels(&self) -> String {
        self.encodings
            .iter()
            .map(|(label, _)| label.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Resolve an encoding label, accepting Windows code-page names that the
/// WHATWG label table does not list.
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).or_else(|| {
        match label.trim().to_ascii_lowercase().as_str() {
            "cp936" | "ms936" | "windows-936" => Some(GBK),
            _ => None,
        }
    })
}
