use std::collections::BTreeMap;

use serde_json::Value;
use taskpulse_core::api::CliError;

/// Parses repeated `KEY=VALUE` flags. Values that parse as JSON keep their
/// type (`days=30` is a number); anything else is a string.
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, Value>, CliError> {
    let mut out = BTreeMap::new();
    for item in raw {
        let (k, v) = item.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("invalid --param {item:?} (expected KEY=VALUE)"))
        })?;
        let key = k.trim();
        if key.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "invalid --param {item:?} (empty key)"
            )));
        }
        let value = serde_json::from_str::<Value>(v.trim())
            .unwrap_or_else(|_| Value::String(v.trim().to_string()));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}
