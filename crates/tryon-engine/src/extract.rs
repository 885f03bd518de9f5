use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use tryon_contracts::encoding::decode_base64_lenient;
use tryon_contracts::CanonicalBlob;

use crate::results::{RenderableResult, ResultStore};
use crate::service::InferenceResult;

/// Mime type assumed for returned images that do not declare one.
pub const RESULT_MIME_FALLBACK: &str = "image/png";

/// An inline payload found in the response, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
struct FoundPayload {
    location: String,
    mime_type: String,
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodedPayload {
    Bytes(Vec<u8>),
    /// Base64 text that did not decode to any bytes; kept as-is.
    RawBase64(String),
}

/// Walks the edit response and returns every renderable image, in the order
/// encountered.
///
/// Probes, first success wins:
/// 1. `candidates[0].content.parts[*]`: each part's own inline data, then the
///    entries of its nested `media` list.
/// 2. top-level `media[*]`.
///
/// A part that fails to decode is logged and skipped; a probe whose payloads
/// all fail counts as no success.
pub fn extract_images(result: &InferenceResult, store: &ResultStore) -> Vec<RenderableResult> {
    let source_text = result.text();
    let from_parts = publish_all(probe_candidate_parts(result), &source_text, store);
    if !from_parts.is_empty() {
        return from_parts;
    }
    publish_all(probe_top_level_media(result.raw()), &source_text, store)
}

fn publish_all(
    found: Vec<FoundPayload>,
    source_text: &Option<String>,
    store: &ResultStore,
) -> Vec<RenderableResult> {
    debug!(payloads = found.len(), "inline payloads discovered");
    found
        .into_iter()
        .filter_map(|payload| match decode_payload(&payload.data) {
            Ok(decoded) => Some(publish(decoded, payload.mime_type, source_text, store)),
            Err(reason) => {
                warn!(location = %payload.location, "skipping image part: {reason}");
                None
            }
        })
        .collect()
}

fn probe_candidate_parts(result: &InferenceResult) -> Vec<FoundPayload> {
    let mut found = Vec::new();
    for (idx, part) in result.first_candidate_parts().iter().enumerate() {
        if let Some(payload) = inline_payload(part, format!("parts[{idx}]")) {
            found.push(payload);
        }
        for (media_idx, entry) in media_entries(part).iter().enumerate() {
            let location = format!("parts[{idx}].media[{media_idx}]");
            if let Some(payload) = media_payload(entry, location) {
                found.push(payload);
            }
        }
    }
    found
}

fn probe_top_level_media(raw: &Value) -> Vec<FoundPayload> {
    media_entries(raw)
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| media_payload(entry, format!("media[{idx}]")))
        .collect()
}

fn media_entries(value: &Value) -> &[Value] {
    value
        .get("media")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Media entries may wrap their payload in `inlineData` or carry it directly.
fn media_payload(entry: &Value, location: String) -> Option<FoundPayload> {
    inline_payload(entry, location.clone()).or_else(|| {
        entry
            .as_object()
            .and_then(|object| payload_from_inline(object, location))
    })
}

fn inline_payload(part: &Value, location: String) -> Option<FoundPayload> {
    let inline = part
        .get("inlineData")
        .or_else(|| part.get("inline_data"))
        .and_then(Value::as_object)?;
    payload_from_inline(inline, location)
}

fn payload_from_inline(inline: &Map<String, Value>, location: String) -> Option<FoundPayload> {
    let data = inline.get("data")?;
    let absent = match data {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    };
    if absent {
        return None;
    }
    let mime_type = inline
        .get("mimeType")
        .or_else(|| inline.get("mime_type"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(RESULT_MIME_FALLBACK)
        .to_string();
    Some(FoundPayload {
        location,
        mime_type,
        data: data.clone(),
    })
}

fn decode_payload(data: &Value) -> Result<DecodedPayload, String> {
    match data {
        Value::String(text) => Ok(match decode_base64_lenient(text) {
            Some(bytes) if !bytes.is_empty() => DecodedPayload::Bytes(bytes),
            _ => DecodedPayload::RawBase64(text.trim().to_string()),
        }),
        Value::Array(items) => non_empty(bytes_from_array(items)?),
        Value::Object(object) => non_empty(bytes_from_object(object)?),
        other => Err(format!("unsupported payload type: {}", value_kind(other))),
    }
}

fn non_empty(bytes: Vec<u8>) -> Result<DecodedPayload, String> {
    if bytes.is_empty() {
        return Err("payload holds zero bytes".to_string());
    }
    Ok(DecodedPayload::Bytes(bytes))
}

fn bytes_from_array(items: &[Value]) -> Result<Vec<u8>, String> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_u64()
                .and_then(|value| u8::try_from(value).ok())
                .ok_or_else(|| format!("element {idx} is not a byte value"))
        })
        .collect()
}

/// Buffer wrappers (`{"type": "Buffer", "data": [...]}`, `{"buffer": ...}`)
/// and index-keyed byte maps (`{"0": 137, "1": 80, ...}`).
fn bytes_from_object(object: &Map<String, Value>) -> Result<Vec<u8>, String> {
    if object.get("type").and_then(Value::as_str) == Some("Buffer") {
        if let Some(Value::Array(items)) = object.get("data") {
            return bytes_from_array(items);
        }
    }
    if let Some(buffer) = object.get("buffer") {
        return match buffer {
            Value::Array(items) => bytes_from_array(items),
            Value::Object(inner) => bytes_from_object(inner),
            other => Err(format!("unsupported buffer type: {}", value_kind(other))),
        };
    }
    if object.is_empty() {
        return Err("empty payload object".to_string());
    }
    let mut indexed = BTreeMap::new();
    for (key, value) in object {
        let idx = key
            .parse::<usize>()
            .map_err(|_| format!("unrecognized payload object key '{key}'"))?;
        let byte = value
            .as_u64()
            .and_then(|value| u8::try_from(value).ok())
            .ok_or_else(|| format!("element {idx} is not a byte value"))?;
        indexed.insert(idx, byte);
    }
    if indexed.keys().enumerate().any(|(expected, idx)| expected != *idx) {
        return Err("index-keyed payload has gaps".to_string());
    }
    Ok(indexed.into_values().collect())
}

fn publish(
    decoded: DecodedPayload,
    mime_type: String,
    source_text: &Option<String>,
    store: &ResultStore,
) -> RenderableResult {
    let display_url = match decoded {
        DecodedPayload::Bytes(bytes) => {
            store.create_object_url(CanonicalBlob::new(bytes, mime_type.clone()))
        }
        DecodedPayload::RawBase64(text) => format!("data:{mime_type};base64,{text}"),
    };
    RenderableResult {
        display_url,
        mime_type,
        source_text: source_text.clone(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ONE_PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHgwKk6ZQJ4wAAAABJRU5ErkJggg==";

    fn response_with_parts(parts: Value) -> InferenceResult {
        InferenceResult::new(json!({
            "candidates": [{"content": {"role": "model", "parts": parts}}]
        }))
    }

    #[test]
    fn base64_part_becomes_object_url() {
        let store = ResultStore::new();
        let result = response_with_parts(json!([
            {"text": "Here is the edit."},
            {"inlineData": {"mimeType": "image/png", "data": ONE_PIXEL_PNG}}
        ]));
        let images = extract_images(&result, &store);
        assert_eq!(images.len(), 1);
        assert!(images[0].is_object_url());
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].source_text.as_deref(), Some("Here is the edit."));
        let blob = store.resolve(&images[0].display_url);
        assert_eq!(blob.map(|blob| blob.bytes[1..4].to_vec()), Some(b"PNG".to_vec()));
    }

    #[test]
    fn malformed_part_is_skipped_and_rest_survive() {
        let store = ResultStore::new();
        let result = response_with_parts(json!([
            {"inlineData": {"mimeType": "image/png", "data": ONE_PIXEL_PNG}},
            {"inlineData": {"mimeType": "image/png", "data": {"unexpected": true}}}
        ]));
        let images = extract_images(&result, &store);
        assert_eq!(images.len(), 1);
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn byte_arrays_buffers_and_indexed_maps_are_accepted() {
        let store = ResultStore::new();
        let result = response_with_parts(json!([
            {"inline_data": {"mime_type": "image/jpeg", "data": [255, 216, 255]}},
            {"inlineData": {"data": {"type": "Buffer", "data": [1, 2]}}},
            {"inlineData": {"data": {"buffer": {"0": 7, "1": 8}}}},
            {"inlineData": {"data": {"1": 4, "0": 3}}},
            {"inlineData": {"data": [1, 256]}},
            {"inlineData": {"data": {"0": 1, "2": 2}}},
            {"inlineData": {"data": []}},
            {"inlineData": {"data": 42}}
        ]));
        let images = extract_images(&result, &store);
        let bytes: Vec<Vec<u8>> = images
            .iter()
            .filter_map(|image| store.resolve(&image.display_url))
            .map(|blob| blob.bytes)
            .collect();
        assert_eq!(bytes, vec![vec![255, 216, 255], vec![1, 2], vec![7, 8], vec![3, 4]]);
        assert_eq!(images[0].mime_type, "image/jpeg");
        assert_eq!(images[1].mime_type, RESULT_MIME_FALLBACK);
    }

    #[test]
    fn undecodable_base64_falls_back_to_data_url() {
        let store = ResultStore::new();
        let result = response_with_parts(json!([
            {"inlineData": {"mimeType": "image/png", "data": "!!not-base64!!"}}
        ]));
        let images = extract_images(&result, &store);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].display_url, "data:image/png;base64,!!not-base64!!");
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn nested_part_media_follows_its_part() {
        let store = ResultStore::new();
        let result = response_with_parts(json!([
            {
                "inlineData": {"data": [1]},
                "media": [{"inlineData": {"data": [2]}}, {"mimeType": "image/gif", "data": [3]}]
            },
            {"inlineData": {"data": [4]}}
        ]));
        let images = extract_images(&result, &store);
        let firsts: Vec<u8> = images
            .iter()
            .filter_map(|image| store.resolve(&image.display_url))
            .map(|blob| blob.bytes[0])
            .collect();
        assert_eq!(firsts, vec![1, 2, 3, 4]);
        assert_eq!(images[2].mime_type, "image/gif");
    }

    #[test]
    fn top_level_media_only_when_parts_yield_nothing() {
        let store = ResultStore::new();
        let with_parts = InferenceResult::new(json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"data": [1]}}]}}],
            "media": [{"inlineData": {"data": [9]}}]
        }));
        assert_eq!(extract_images(&with_parts, &store).len(), 1);

        let media_only = InferenceResult::new(json!({
            "candidates": [{"content": {"parts": [{"text": "no image, sorry"}]}}],
            "media": [{"inlineData": {"mimeType": "image/png", "data": ONE_PIXEL_PNG}}]
        }));
        let images = extract_images(&media_only, &store);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source_text.as_deref(), Some("no image, sorry"));
    }

    #[test]
    fn top_level_media_used_when_every_part_fails_to_decode() {
        let store = ResultStore::new();
        let response = InferenceResult::new(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"data": {"unexpected": true}}}
            ]}}],
            "media": [{"inlineData": {"mimeType": "image/png", "data": ONE_PIXEL_PNG}}]
        }));

        let images = extract_images(&response, &store);

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn shapeless_responses_yield_nothing() {
        let store = ResultStore::new();
        for raw in [
            json!({}),
            json!({"candidates": []}),
            json!({"candidates": [{"content": null}]}),
            json!({"candidates": [{"content": {"parts": "oops"}}], "media": {"not": "a list"}}),
            json!({"candidates": [{"content": {"parts": [{"inlineData": {"data": ""}}]}}]}),
        ] {
            assert!(extract_images(&InferenceResult::new(raw), &store).is_empty());
        }
    }
}
