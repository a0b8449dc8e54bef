//! Invocation parameters passed by the platform as a JSON array
//!
//! `[{"name": "device_code", "value": "abc"}, ...]`

use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

pub const DEVICE_CODE_PARAM: &str = "device_code";

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Invocation parameters are not a JSON array: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invocation parameters contain no '{DEVICE_CODE_PARAM}' entry")]
    MissingDeviceCode,
}

/// Named parameters in invocation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationParams {
    entries: Vec<(String, String)>,
}

impl InvocationParams {
    /// Parse the array; entries without both `name` and `value` are skipped
    pub fn parse(raw: &str) -> Result<Self, ParamsError> {
        let items: Vec<Value> = serde_json::from_str(raw)?;

        let entries = items
            .iter()
            .filter_map(|item| {
                let object = item.as_object()?;
                let name = object.get("name")?.as_str()?;
                let value = match object.get("value")? {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((name.to_string(), value))
            })
            .collect();

        Ok(Self { entries })
    }

    /// Value of the last entry with this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn device_code(&self) -> Result<&str, ParamsError> {
        self.get(DEVICE_CODE_PARAM)
            .ok_or(ParamsError::MissingDeviceCode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for InvocationParams {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
