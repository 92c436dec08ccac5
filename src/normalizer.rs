// ============================================================================
// File: src/normalizer.rs
// Turns loosely-typed model results into one renderable output
// ============================================================================

use serde_json::Value;
use tracing::debug;

use crate::blob_store::{BlobStore, BLOB_SCHEME};
use crate::models::{NormalizedOutput, OutputKind, RawModelResult};

const NO_OUTPUT: &str = "no output";
const NO_MEDIA: &str = "no media";

/// Normalizes one raw result. Binary payloads are registered in `blobs`;
/// nothing else is touched.
pub fn normalize(raw: &RawModelResult, kind: OutputKind, blobs: &BlobStore) -> NormalizedOutput {
    match raw {
        RawModelResult::Error(message) => NormalizedOutput::Failure(message.clone()),
        RawModelResult::Binary { bytes, mime } => {
            if bytes.is_empty() {
                return NormalizedOutput::Failure(failure_for(kind).to_string());
            }
            let mime = mime.clone().unwrap_or_else(|| kind.default_mime().to_string());
            match kind {
                // A text task answered with bytes; accept it if it decodes.
                OutputKind::Text => match String::from_utf8(bytes.clone()) {
                    Ok(text) if !text.trim().is_empty() => NormalizedOutput::Text(text),
                    _ => NormalizedOutput::Failure(NO_OUTPUT.to_string()),
                },
                OutputKind::Image | OutputKind::Audio => NormalizedOutput::Media {
                    uri: blobs.insert(bytes.clone(), &mime),
                    mime,
                },
            }
        }
        RawModelResult::Json(value) => match kind {
            OutputKind::Text => normalize_text(value),
            OutputKind::Image | OutputKind::Audio => normalize_media(value, kind),
        },
    }
}

fn failure_for(kind: OutputKind) -> &'static str {
    match kind {
        OutputKind::Text => NO_OUTPUT,
        OutputKind::Image | OutputKind::Audio => NO_MEDIA,
    }
}

fn normalize_text(value: &Value) -> NormalizedOutput {
    if let Some(text) = extract_text(value) {
        return NormalizedOutput::Text(text);
    }
    match value {
        Value::Object(map) if !map.is_empty() => {
            debug!("no known text field in response object, serializing it whole");
            NormalizedOutput::Text(value.to_string())
        }
        Value::Number(_) | Value::Bool(_) => NormalizedOutput::Text(value.to_string()),
        _ => NormalizedOutput::Failure(NO_OUTPUT.to_string()),
    }
}

/// Ordered text probes; the first one yielding a non-empty string wins.
fn extract_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s.clone()),
        Value::Array(chunks) => {
            let joined: String = chunks.iter().filter_map(extract_text).collect();
            non_empty(joined)
        }
        Value::Object(_) => TEXT_PROBES
            .iter()
            .find_map(|probe| probe(value).and_then(extract_text)),
        _ => None,
    }
}

type Probe = fn(&Value) -> Option<&Value>;

const TEXT_PROBES: [Probe; 5] = [chat_completion, direct_content, message_content, text_field, response_field];

fn chat_completion(v: &Value) -> Option<&Value> {
    v.get("choices")?.get(0)?.get("message")?.get("content")
}

fn direct_content(v: &Value) -> Option<&Value> {
    v.get("content")
}

fn message_content(v: &Value) -> Option<&Value> {
    v.get("message")?.get("content")
}

fn text_field(v: &Value) -> Option<&Value> {
    v.get("text")
}

fn response_field(v: &Value) -> Option<&Value> {
    v.get("response")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn normalize_media(value: &Value, kind: OutputKind) -> NormalizedOutput {
    let mime = kind.default_mime();
    match extract_media(value, kind) {
        Some(found) if !found.is_empty() => {
            let uri = if has_known_scheme(&found) {
                found
            } else {
                wrap_base64(&found, mime)
            };
            NormalizedOutput::Media {
                mime: mime_of(&uri).unwrap_or(mime).to_string(),
                uri,
            }
        }
        _ => NormalizedOutput::Failure(NO_MEDIA.to_string()),
    }
}

fn extract_media(value: &Value, kind: OutputKind) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s.trim().to_string()),
        Value::Array(items) => items.first().and_then(|first| extract_media(first, kind)),
        Value::Object(_) => {
            let (named, plural) = match kind {
                OutputKind::Audio => ("audio", "audios"),
                _ => ("image", "images"),
            };
            let fields = [named, "url", "file"];
            let strings = || {
                fields
                    .iter()
                    .filter_map(|field| value.get(*field)?.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };

            strings()
                .find(|s| has_known_scheme(s))
                .or_else(|| strings().next())
                .map(str::to_string)
                .or_else(|| value.get(plural).and_then(|items| extract_media(items, kind)))
                .or_else(|| {
                    value
                        .get("base64")
                        .and_then(Value::as_str)
                        .and_then(|b64| non_empty(b64.trim().to_string()))
                        .map(|b64| wrap_base64(&b64, kind.default_mime()))
                })
        }
        _ => None,
    }
}

pub fn has_known_scheme(uri: &str) -> bool {
    uri.starts_with("http") || uri.starts_with("data:") || uri.starts_with(BLOB_SCHEME)
}

fn wrap_base64(payload: &str, mime: &str) -> String {
    format!("data:{};base64,{}", mime, payload)
}

fn mime_of(uri: &str) -> Option<&str> {
    let header = uri.strip_prefix("data:")?.split(',').next()?;
    header.split(';').next().filter(|m| !m.is_empty())
}
