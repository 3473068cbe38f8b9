//! Metadata workers.

use crate::plugin::interface::{PluginError, PluginResult, WorkInputs, WorkOutput};
use serde_json::{json, Value};
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

/// Basic sample metadata. Depends on `sample`.
pub fn meta(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let sample = inputs.sample()?;

    let mut output = WorkOutput::new();
    output.insert("id".to_string(), json!(sample.id));
    output.insert("filename".to_string(), json!(sample.filename));
    output.insert("type_tag".to_string(), json!(sample.type_tag));
    output.insert("customer".to_string(), json!(sample.customer));
    output.insert("import_time".to_string(), json!(sample.import_time));
    output.insert("length".to_string(), json!(sample.length()));
    Ok(output)
}

/// Digests and entropy, merged over `meta`. Depends on `sample` and `meta`.
pub fn meta_deep(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let sample = inputs.sample()?;
    let bytes = &sample.raw_bytes;

    let mut output = WorkOutput::new();
    output.insert(
        "sha256".to_string(),
        json!(hex::encode(Sha256::digest(bytes))),
    );
    output.insert(
        "sha3_256".to_string(),
        json!(hex::encode(Sha3_256::digest(bytes))),
    );
    output.insert("entropy".to_string(), json!(entropy(bytes)));
    merge_meta(inputs, &mut output)?;
    Ok(output)
}

/// Shape of a JSON sample, merged over `meta`. Depends on `sample` and `meta`.
pub fn json_meta(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let sample = inputs.sample()?;
    let data: Value = serde_json::from_slice(&sample.raw_bytes)
        .map_err(|e| PluginError::new(&format!("sample is not JSON: {}", e)))?;

    let mut output = WorkOutput::new();
    match &data {
        Value::Array(items) => {
            output.insert("json_container".to_string(), json!("list"));
            output.insert("json_list_length".to_string(), json!(items.len()));
        }
        Value::Object(map) => {
            output.insert("json_container".to_string(), json!("dict"));
            output.insert("json_num_keys".to_string(), json!(map.len()));
        }
        _ => {
            output.insert("json_container".to_string(), json!("scalar"));
        }
    }
    merge_meta(inputs, &mut output)?;
    Ok(output)
}

/// Shannon entropy of a byte string, in bits per byte.
pub fn entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    let len = bytes.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Copy every `meta` key into the output. Keys already present win.
fn merge_meta(inputs: &WorkInputs, output: &mut WorkOutput) -> PluginResult<()> {
    let meta = inputs
        .require("meta")?
        .as_object()
        .ok_or_else(|| PluginError::new("meta input is not an object"))?;
    for (key, value) in meta {
        output.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Ok(())
}
