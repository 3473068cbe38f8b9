//! View workers: reshape other workers' output.

use crate::plugin::interface::{PluginError, PluginResult, WorkInputs, WorkOutput};

const CUSTOMER_FIELDS: [&str; 6] = ["filename", "id", "length", "customer", "import_time", "type_tag"];

/// Customer usage view over `meta`. Depends on `meta`.
pub fn view_customer(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let meta = inputs.require("meta")?;

    let mut view = WorkOutput::new();
    for field in CUSTOMER_FIELDS {
        let value = meta
            .get(field)
            .ok_or_else(|| PluginError::new(&format!("meta output has no {}", field)))?;
        view.insert(field.to_string(), value.clone());
    }
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_selects_fields() {
        let inputs = WorkInputs::new().with_output(
            "meta",
            json!({
                "filename": "a.exe", "id": "abc", "length": 3, "customer": "MegaCorp",
                "import_time": "2024-01-01T00:00:00Z", "type_tag": "pe", "extra": true
            }),
        );
        let view = view_customer(&inputs).unwrap();

        assert_eq!(view.len(), 6);
        assert_eq!(view["customer"], "MegaCorp");
        assert!(view.get("extra").is_none());
    }

    #[test]
    fn test_view_missing_meta() {
        assert!(view_customer(&WorkInputs::new()).is_err());

        let partial = WorkInputs::new().with_output("meta", json!({"filename": "a"}));
        assert!(view_customer(&partial).unwrap_err().message.contains("no id"));
    }
}
