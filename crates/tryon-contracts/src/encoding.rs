use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::source::CanonicalBlob;

/// Bytes fed to the encoder per iteration. Must stay a multiple of 3 so the
/// per-chunk outputs concatenate without interior padding.
pub const ENCODE_CHUNK_BYTES: usize = 3 * 10_922;

/// Image payload in the shape the generation service expects (`inlineData`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlinePart {
    pub mime_type: String,
    pub data: String,
}

impl InlinePart {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

pub fn to_inline_part(blob: &CanonicalBlob) -> InlinePart {
    InlinePart {
        mime_type: blob.mime_type.clone(),
        data: encode_chunked(&blob.bytes),
    }
}

/// Standard-alphabet base64 of `bytes`, produced in bounded chunks.
pub fn encode_chunked(bytes: &[u8]) -> String {
    let capacity = base64::encoded_len(bytes.len(), true).unwrap_or_default();
    let mut out = String::with_capacity(capacity);
    for chunk in bytes.chunks(ENCODE_CHUNK_BYTES) {
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

/// Decodes base64 trying the standard alphabet first, then URL-safe and
/// unpadded variants. ASCII whitespace inside the payload is ignored.
pub fn decode_base64_lenient(raw: &str) -> Option<Vec<u8>> {
    let compact: String = raw.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(compact.as_bytes()).ok())
}
