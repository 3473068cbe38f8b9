//! Dotted-path extraction from result values.

use crate::core::{Error, Result};
use serde_json::{Map, Value};

/// Look up one dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Extract several dotted paths into an object keyed by the full path.
///
/// Fails with `MissingSubkey` on the first path that does not resolve.
pub fn extract(value: &Value, paths: &[String]) -> Result<Value> {
    let mut picked = Map::new();
    for path in paths {
        let found = lookup(value, path).ok_or_else(|| Error::MissingSubkey(path.clone()))?;
        picked.insert(path.clone(), found.clone());
    }
    Ok(Value::Object(picked))
}
