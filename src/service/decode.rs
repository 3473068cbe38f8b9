//! Row decoders for sample streaming.
//!
//! A decoder turns a sample's raw bytes into a lazy sequence of JSON rows.
//! Decoders are looked up by the sample's type tag.

use crate::core::{Error, Result};
use crate::store::Sample;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Lazy row sequence.
pub type RowIter = Box<dyn Iterator<Item = Result<Value>> + Send>;

/// Decodes a sample into rows.
pub trait RowDecoder: Send + Sync {
    /// Start decoding. Whole-document formats fail here; line formats may
    /// also fail per row.
    fn rows(&self, sample: Arc<Sample>) -> Result<RowIter>;
}

/// Decoders keyed by type tag.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn RowDecoder>>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `log`, `json`, `els_query` and `bro` decoders.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("log", LogDecoder);
        registry.register("json", JsonDecoder);
        registry.register("els_query", ElsQueryDecoder);
        registry.register("bro", BroDecoder);
        registry
    }

    /// Add or replace the decoder for a type tag.
    pub fn register<D: RowDecoder + 'static>(&mut self, type_tag: &str, decoder: D) {
        self.decoders.insert(type_tag.to_string(), Arc::new(decoder));
    }

    /// Decoder for a type tag.
    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn RowDecoder>> {
        self.decoders.get(type_tag).cloned()
    }

    /// Known type tags, sorted.
    pub fn type_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.decoders.keys().cloned().collect();
        tags.sort();
        tags
    }
}

/// Lines of a sample, without terminators. A trailing newline does not
/// produce an empty final line.
struct Lines {
    sample: Arc<Sample>,
    pos: usize,
}

impl Lines {
    fn new(sample: Arc<Sample>, pos: usize) -> Self {
        Self { sample, pos }
    }
}

impl Iterator for Lines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let data = &self.sample.raw_bytes;
        if self.pos >= data.len() {
            return None;
        }
        let rest = &data[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        self.pos += end + 1;
        let line = &rest[..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(String::from_utf8_lossy(line).into_owned())
    }
}

fn decode_error(type_tag: &str, message: impl Into<String>) -> Error {
    Error::Decode {
        type_tag: type_tag.to_string(),
        message: message.into(),
    }
}

fn parse_document(sample: &Sample) -> Result<Value> {
    serde_json::from_slice(&sample.raw_bytes)
        .map_err(|e| decode_error(&sample.type_tag, e.to_string()))
}

/// One `{"row": line}` per line.
pub struct LogDecoder;

impl RowDecoder for LogDecoder {
    fn rows(&self, sample: Arc<Sample>) -> Result<RowIter> {
        Ok(Box::new(Lines::new(sample, 0).map(|line| Ok(json!({ "row": line })))))
    }
}

/// Elements of a JSON array, or a single JSON object.
pub struct JsonDecoder;

impl RowDecoder for JsonDecoder {
    fn rows(&self, sample: Arc<Sample>) -> Result<RowIter> {
        match parse_document(&sample)? {
            Value::Array(items) => Ok(Box::new(items.into_iter().map(Ok))),
            object @ Value::Object(_) => Ok(Box::new(std::iter::once(Ok(object)))),
            _ => Err(decode_error(
                &sample.type_tag,
                "expected a JSON array or object",
            )),
        }
    }
}

/// Hits of an Elasticsearch query result.
///
/// Yields each hit's `fields` when the first hit carries them, otherwise each
/// hit's `_source`.
pub struct ElsQueryDecoder;

impl RowDecoder for ElsQueryDecoder {
    fn rows(&self, sample: Arc<Sample>) -> Result<RowIter> {
        let document = parse_document(&sample)?;
        let hits = match document.pointer("/hits/hits") {
            Some(Value::Array(hits)) => hits.clone(),
            _ => return Err(decode_error(&sample.type_tag, "missing hits.hits array")),
        };

        let key = match hits.first() {
            Some(first) if first.get("fields").is_some() => "fields",
            _ => "_source",
        };
        Ok(Box::new(hits.into_iter().map(move |mut hit| {
            Ok(hit
                .get_mut(key)
                .map(Value::take)
                .unwrap_or(Value::Null))
        })))
    }
}

/// Bro/Zeek TSV logs.
///
/// Header lines (`#separator`, `#empty_field`, `#unset_field`, `#fields`,
/// ...) precede the data. Unset fields become `null`, empty fields `""`.
/// Comment lines after the header, such as `#close`, are skipped.
pub struct BroDecoder;

struct BroHeader {
    separator: String,
    empty_field: String,
    unset_field: String,
    fields: Vec<String>,
    data_start: usize,
}

impl BroDecoder {
    fn parse_header(sample: &Arc<Sample>) -> Result<BroHeader> {
        let mut header = BroHeader {
            separator: "\t".to_string(),
            empty_field: "(empty)".to_string(),
            unset_field: "-".to_string(),
            fields: Vec::new(),
            data_start: 0,
        };

        let mut lines = Lines::new(sample.clone(), 0);
        loop {
            let start = lines.pos;
            let Some(line) = lines.next() else {
                header.data_start = start;
                break;
            };
            let Some(directive) = line.strip_prefix('#') else {
                header.data_start = start;
                break;
            };

            if let Some(value) = directive.strip_prefix("separator ") {
                header.separator = unescape(value);
                continue;
            }
            let mut parts = directive.splitn(2, header.separator.as_str());
            let name = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            match name {
                "empty_field" => header.empty_field = value.to_string(),
                "unset_field" => header.unset_field = value.to_string(),
                "fields" => {
                    header.fields = value
                        .split(header.separator.as_str())
                        .map(str::to_string)
                        .collect()
                }
                _ => {}
            }
        }

        if header.fields.is_empty() {
            return Err(decode_error(&sample.type_tag, "missing #fields header"));
        }
        Ok(header)
    }
}

impl RowDecoder for BroDecoder {
    fn rows(&self, sample: Arc<Sample>) -> Result<RowIter> {
        let header = Self::parse_header(&sample)?;
        let type_tag = sample.type_tag.clone();
        let lines = Lines::new(sample, header.data_start);

        Ok(Box::new(
            lines
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(move |line| {
                    let values: Vec<&str> = line.split(header.separator.as_str()).collect();
                    if values.len() != header.fields.len() {
                        return Err(decode_error(
                            &type_tag,
                            format!(
                                "expected {} fields, found {}",
                                header.fields.len(),
                                values.len()
                            ),
                        ));
                    }
                    let mut row = Map::new();
                    for (field, value) in header.fields.iter().zip(values) {
                        let value = if value == header.unset_field {
                            Value::Null
                        } else if value == header.empty_field {
                            Value::String(String::new())
                        } else {
                            Value::String(value.to_string())
                        };
                        row.insert(field.clone(), value);
                    }
                    Ok(Value::Object(row))
                }),
        ))
    }
}

/// Decode `\xHH` escapes as used in Bro header values.
fn unescape(value: &str) -> String {
    let mut out = String::new();
    let mut rest = value;
    while let Some(idx) = rest.find("\\x") {
        out.push_str(&rest[..idx]);
        let hex = rest.get(idx + 2..idx + 4);
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(byte) => {
                out.push(byte as char);
                rest = &rest[idx + 4..];
            }
            None => {
                out.push_str("\\x");
                rest = &rest[idx + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}
