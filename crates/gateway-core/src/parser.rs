//! Tool-call parser (C3): a forgiving extractor that recognizes XML-wrapped,
//! function-calling JSON, bare JSON, and multiple embedded values inside a
//! single model response.
//!
//! Grounded on the `<tool_call>` substring-scan / malformed-JSON-is-a-warn
//! pattern used by the reference agent loop this system is modeled after,
//! generalized to also recognize `<invoke>` tags and bare ambient JSON.

use serde_json::Value;

use crate::types::ParsedToolCall;

const TAGS: [(&str, &str); 2] = [("<invoke>", "</invoke>"), ("<tool_call>", "</tool_call>")];

/// Parse `input` into leftover prose plus any recognized tool calls.
///
/// Tag-wrapped calls take precedence: if any `<invoke>`/`<tool_call>` body
/// yields a call, the function-calling-envelope and bare-JSON passes are
/// never attempted.
pub fn parse(input: &str) -> (String, Vec<ParsedToolCall>) {
    let (tag_segments, tag_calls) = scan_tag_calls(input);
    if !tag_calls.is_empty() {
        return (join_segments(tag_segments), tag_calls);
    }

    let trimmed = input.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.get("tool_calls").is_some() {
            let (leftover, calls) = envelope_calls(&value);
            if !calls.is_empty() {
                return (leftover, calls);
            }
        } else if let Some(call) = value_to_call(&value) {
            return (String::new(), vec![call]);
        }
    }

    let (segments, calls) = scan_ambient_calls(input);
    (join_segments(segments), calls)
}

fn join_segments(segments: Vec<String>) -> String {
    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scan `input` for `<invoke>`/`<tool_call>` pairs in source order. A
/// missing closing tag aborts that tag's scan without losing the remaining
/// text (the rest of the string becomes a trailing segment). A body that
/// yields no call is preserved whole (tags included) as a text segment.
fn scan_tag_calls(input: &str) -> (Vec<String>, Vec<ParsedToolCall>) {
    let mut calls = Vec::new();
    let mut segments = Vec::new();
    let mut cursor = 0usize;

    loop {
        let next = TAGS
            .iter()
            .filter_map(|(open, close)| input[cursor..].find(open).map(|rel| (cursor + rel, *open, *close)))
            .min_by_key(|(pos, _, _)| *pos);

        let Some((open_pos, open, close)) = next else {
            segments.push(input[cursor..].to_string());
            break;
        };

        segments.push(input[cursor..open_pos].to_string());
        let body_start = open_pos + open.len();

        match input[body_start..].find(close) {
            Some(rel_close) => {
                let body_end = body_start + rel_close;
                let tag_end = body_end + close.len();
                let body = input[body_start..body_end].trim();

                let mut body_calls = scan_json_values_as_calls(body);
                if body_calls.is_empty() {
                    let stripped = strip_code_fences(body);
                    body_calls = scan_json_values_as_calls(&stripped);
                }

                if body_calls.is_empty() {
                    segments.push(input[open_pos..tag_end].to_string());
                } else {
                    calls.extend(body_calls);
                }
                cursor = tag_end;
            }
            None => {
                // Unbalanced tag: keep everything from the opening marker
                // onward as plain text and stop scanning.
                segments.push(input[open_pos..].to_string());
                cursor = input.len();
                break;
            }
        }
    }

    (segments, calls)
}

/// Walk `s`; at each `{` or `[` try to decode one JSON value with a
/// streaming reader, advancing the cursor past the consumed bytes on
/// success or by one character on failure — this lets two JSON values
/// share a body without double-reading the first.
fn scan_json_values(s: &str) -> Vec<Value> {
    let mut out = Vec::new();
    let mut idx = 0usize;
    let bytes = s.as_bytes();

    while idx < s.len() {
        if bytes[idx] == b'{' || bytes[idx] == b'[' {
            let mut de = serde_json::Deserializer::from_str(&s[idx..]).into_iter::<Value>();
            if let Some(Ok(value)) = de.next() {
                let consumed = de.byte_offset().max(1);
                out.push(value);
                idx += consumed;
                continue;
            }
        }
        let ch_len = s[idx..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        idx += ch_len;
    }

    out
}

fn scan_json_values_as_calls(body: &str) -> Vec<ParsedToolCall> {
    scan_json_values(body).iter().filter_map(value_to_call).collect()
}

/// Ambient scan over a whole response: same cursor-walk as `scan_json_values`
/// but non-call JSON values are left in the leftover text rather than
/// discarded (recognition must be non-destructive for text).
fn scan_ambient_calls(input: &str) -> (Vec<String>, Vec<ParsedToolCall>) {
    let mut calls = Vec::new();
    let mut segments = Vec::new();
    let mut segment_start = 0usize;
    let mut idx = 0usize;
    let bytes = input.as_bytes();

    while idx < input.len() {
        if bytes[idx] == b'{' || bytes[idx] == b'[' {
            let mut de = serde_json::Deserializer::from_str(&input[idx..]).into_iter::<Value>();
            if let Some(Ok(value)) = de.next() {
                let consumed = de.byte_offset().max(1);
                if let Some(call) = value_to_call(&value) {
                    segments.push(input[segment_start..idx].to_string());
                    calls.push(call);
                    idx += consumed;
                    segment_start = idx;
                    continue;
                }
                idx += consumed;
                continue;
            }
        }
        let ch_len = input[idx..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        idx += ch_len;
    }
    segments.push(input[segment_start..].to_string());

    (segments, calls)
}

fn strip_code_fences(s: &str) -> String {
    let s = s.trim();
    let rest = s.strip_prefix("```json").or_else(|| s.strip_prefix("```"));
    let Some(rest) = rest else {
        return s.to_string();
    };
    let rest = rest.trim_start_matches(['\n', '\r']);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim().to_string(),
        None => rest.trim().to_string(),
    }
}

fn envelope_calls(value: &Value) -> (String, Vec<ParsedToolCall>) {
    let mut calls = Vec::new();
    if let Some(entries) = value.get("tool_calls").and_then(Value::as_array) {
        for entry in entries {
            let Some(func) = entry.get("function") else { continue };
            let Some(name) = func.get("name").and_then(Value::as_str) else { continue };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let arguments = match func.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "{}".to_string(),
            };
            calls.push(ParsedToolCall { name: name.to_string(), arguments });
        }
    }
    let leftover = value
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("")
        .to_string();
    (leftover, calls)
}

/// `{"name": "...", "arguments": ...}` shape, used for both tag-body scans
/// and the top-level bare-object case. `arguments` may be a string (copied
/// verbatim) or any value (re-encoded); absent `arguments` yields `"{}"`.
fn value_to_call(value: &Value) -> Option<ParsedToolCall> {
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match obj.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "{}".to_string(),
    };
    Some(ParsedToolCall { name: name.to_string(), arguments })
}
