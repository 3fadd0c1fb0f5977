use std::collections::HashMap;

use crate::error::WheelError;

/// Parses a `Key: value` file such as `WHEEL`.
pub fn parse_key_value(text: &str, debug_filename: &str) -> Result<HashMap<String, Vec<String>>, WheelError> {
    let mut data: HashMap<String, Vec<String>> = HashMap::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| {
            WheelError::InvalidWheel(format!("line {line_no} of {debug_filename} is invalid"))
        })?;
        data.entry(key.trim().to_string()).or_default().push(value.trim().to_string());
    }
    Ok(data)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RootIsPurelib {
    Purelib,
    Platlib,
}

/// The subset of `WHEEL` the installer needs: its declared format version
/// and whether unpacked files default to `purelib` or `platlib`.
#[derive(Debug, Clone)]
pub struct WheelMetadata {
    pub root_is_purelib: RootIsPurelib,
}

impl WheelMetadata {
    pub fn parse(text: &str) -> Result<Self, WheelError> {
        let data = parse_key_value(text, "WHEEL")?;

        let version = data
            .get("Wheel-Version")
            .and_then(|values| values.as_slice().first())
            .and_then(|v| v.split_once('.'))
            .ok_or_else(|| WheelError::InvalidWheel("missing Wheel-Version in WHEEL file".to_string()))?;

        // pip carries a handful of test wheels pinned to this ancient version.
        if version != ("0", "1") {
            let major: u32 = version.0.parse().map_err(|_| {
                WheelError::InvalidWheel(format!("invalid Wheel-Version major component: {}", version.0))
            })?;
            if major > 1 {
                return Err(WheelError::InvalidWheel(format!(
                    "unsupported wheel major version (expected 1, got {major})"
                )));
            }
            let minor: u32 = version.1.parse().map_err(|_| {
                WheelError::InvalidWheel(format!("invalid Wheel-Version minor component: {}", version.1))
            })?;
            if minor > 0 {
                tracing::warn!(minor, "wheel declares a newer Wheel-Version minor than supported");
            }
        }

        let root_is_purelib = match data.get("Root-Is-Purelib").and_then(|v| v.first()).map(String::as_str) {
            Some("true") => RootIsPurelib::Purelib,
            _ => RootIsPurelib::Platlib,
        };

        Ok(Self { root_is_purelib })
    }
}
