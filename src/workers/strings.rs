//! Printable string extraction.

use crate::plugin::interface::{PluginResult, WorkInputs, WorkOutput};
use serde_json::json;

/// Shortest run of printable bytes reported as a string.
pub const MIN_STRING_LENGTH: usize = 4;

/// Extract runs of printable ASCII of at least `min_len` bytes.
pub fn extract_strings(bytes: &[u8], min_len: usize) -> Vec<String> {
    let mut found = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            current.push(b as char);
        } else {
            if current.len() >= min_len {
                found.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= min_len {
        found.push(current);
    }
    found
}

/// Printable strings found in the sample. Depends on `sample`.
pub fn strings(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let sample = inputs.sample()?;
    let found = extract_strings(&sample.raw_bytes, MIN_STRING_LENGTH);

    let mut output = WorkOutput::new();
    output.insert("count".to_string(), json!(found.len()));
    output.insert("string_list".to_string(), json!(found));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Sample;

    #[test]
    fn test_extract_runs() {
        let data = b"\x00\x01MZhello\x00ab\x00world wide\xff";
        assert_eq!(
            extract_strings(data, 4),
            vec!["MZhello".to_string(), "world wide".to_string()]
        );
    }

    #[test]
    fn test_trailing_run() {
        assert_eq!(extract_strings(b"\x00tail", 4), vec!["tail".to_string()]);
        assert!(extract_strings(b"abc", 4).is_empty());
    }

    #[test]
    fn test_strings_worker() {
        let inputs = WorkInputs::new().with_sample(Sample::new(
            "bin",
            b"\x00\x00kernel32.dll\x00\x00".to_vec(),
            "pe",
            "c",
        ));
        let output = strings(&inputs).unwrap();
        assert_eq!(output["count"], 1);
        assert_eq!(output["string_list"][0], "kernel32.dll");
    }
}
