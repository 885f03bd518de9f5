use crate::encoding::decode_base64_lenient;
use crate::error::TryOnError;

/// Mime type assumed when a source does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Source-agnostic image bytes plus their media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl CanonicalBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let trimmed = mime_type.trim();
        Self {
            bytes,
            mime_type: if trimmed.is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where an input image comes from.
///
/// Strings are classified once by [`ImageSource::parse`]; downstream code only
/// matches on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    RemoteUrl(String),
    DataUrl(String),
    Blob(CanonicalBlob),
}

impl ImageSource {
    pub fn parse(raw: &str) -> Result<Self, TryOnError> {
        let trimmed = raw.trim();
        if has_prefix_ignore_case(trimmed, "http://") || has_prefix_ignore_case(trimmed, "https://")
        {
            return Ok(ImageSource::RemoteUrl(trimmed.to_string()));
        }
        if has_prefix_ignore_case(trimmed, "data:") {
            return Ok(ImageSource::DataUrl(trimmed.to_string()));
        }
        Err(TryOnError::UnsupportedSource(preview(trimmed, 48)))
    }

    pub fn blob(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        ImageSource::Blob(CanonicalBlob::new(bytes, mime_type))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::RemoteUrl(_) => "remote_url",
            ImageSource::DataUrl(_) => "data_url",
            ImageSource::Blob(_) => "blob",
        }
    }
}

/// Decodes `data:<mime>;base64,<payload>`.
pub fn decode_data_url(raw: &str) -> Result<CanonicalBlob, TryOnError> {
    let trimmed = raw.trim();
    let rest = strip_prefix_ignore_case(trimmed, "data:")
        .ok_or_else(|| TryOnError::Format("missing data: scheme".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| TryOnError::Format("missing ',' before payload".to_string()))?;
    let (mime, encoding) = meta
        .split_once(';')
        .ok_or_else(|| TryOnError::Format("expected ;base64 marker".to_string()))?;
    if !encoding.trim().eq_ignore_ascii_case("base64") {
        return Err(TryOnError::Format(format!(
            "unsupported encoding '{}'",
            encoding.trim()
        )));
    }
    let mime = mime.trim();
    if !has_prefix_ignore_case(mime, "image/") || mime.len() == "image/".len() {
        return Err(TryOnError::Format(format!(
            "'{}' is not an image media type",
            preview(mime, 32)
        )));
    }
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(TryOnError::Format("empty payload".to_string()));
    }
    let bytes = decode_base64_lenient(payload)
        .ok_or_else(|| TryOnError::Format("payload is not valid base64".to_string()))?;
    Ok(CanonicalBlob::new(bytes, mime.to_ascii_lowercase()))
}

fn has_prefix_ignore_case(value: &str, prefix: &str) -> bool {
    strip_prefix_ignore_case(value, prefix).is_some()
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

fn preview(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHgwKk6ZQJ4wAAAABJRU5ErkJggg==";

    #[test]
    fn parse_classifies_urls_and_data_urls() -> anyhow::Result<()> {
        assert_eq!(
            ImageSource::parse("  HTTPS://cdn.example.com/a.png ")?,
            ImageSource::RemoteUrl("HTTPS://cdn.example.com/a.png".to_string())
        );
        assert_eq!(
            ImageSource::parse("http://example.com/b.jpg")?.kind(),
            "remote_url"
        );
        assert_eq!(
            ImageSource::parse("data:image/png;base64,AAAA")?.kind(),
            "data_url"
        );
        Ok(())
    }

    #[test]
    fn parse_rejects_unrecognized_strings() {
        for raw in ["not an image", "ftp://example.com/x.png", "", "image/png;base64,AAAA"] {
            let err = ImageSource::parse(raw).err();
            assert!(
                matches!(err, Some(TryOnError::UnsupportedSource(_))),
                "{raw:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn data_url_decodes_to_png_blob() -> anyhow::Result<()> {
        let blob = decode_data_url(&format!("data:image/png;base64,{ONE_PIXEL_PNG}"))?;
        assert_eq!(blob.mime_type, "image/png");
        assert!(blob.len() > 0);
        assert_eq!(&blob.bytes[1..4], b"PNG");
        Ok(())
    }

    #[test]
    fn data_url_format_errors() {
        let cases = [
            "data:image/png,AAAA",
            "data:image/png;base64",
            "data:image/png;base64,",
            "data:;base64,AAAA",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/png;utf8,AAAA",
            "data:image/png;base64,***",
        ];
        for raw in cases {
            let err = decode_data_url(raw).err();
            assert!(matches!(err, Some(TryOnError::Format(_))), "{raw} -> {err:?}");
        }
    }

    #[test]
    fn blank_mime_defaults_to_jpeg() {
        assert_eq!(CanonicalBlob::new(vec![1], "  ").mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(CanonicalBlob::new(vec![1], "image/webp").mime_type, "image/webp");
    }
}
