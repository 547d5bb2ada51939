//! Server configuration, fed from `initializationOptions` and later
//! `workspace/didChangeConfiguration` notifications.

use std::collections::HashMap;

use jsonnet_analysis::FormatOptions;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Configuration {
    /// Extra library search paths, consulted before the file's own directory.
    pub jpaths: Vec<String>,
    /// When set, derive import roots from the surrounding project
    /// (`jsonnetfile.json` or `tkrc.yaml`) instead of `jpaths` alone.
    pub resolve_paths_with_tanka: bool,
    pub ext_vars: HashMap<String, String>,
    pub enable_eval_diagnostics: bool,
    pub enable_lint_diagnostics: bool,
    pub formatting: FormatOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            jpaths: Vec::new(),
            resolve_paths_with_tanka: true,
            ext_vars: HashMap::new(),
            enable_eval_diagnostics: true,
            enable_lint_diagnostics: false,
            formatting: FormatOptions::default(),
        }
    }
}

impl Configuration {
    /// Parses `initializationOptions`. Absent or null options mean defaults.
    pub fn from_initialization_options(options: Option<Value>) -> Result<Self, String> {
        match options {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|err| format!("invalid initialization options: {err}")),
        }
    }

    /// Applies one `didChangeConfiguration` settings payload in place.
    ///
    /// Only `ext_vars` and `formatting` may change at runtime; any other key
    /// is rejected so typos do not silently do nothing.
    pub fn apply_settings(&mut self, settings: Value) -> Result<(), String> {
        let Value::Object(map) = settings else {
            return Err(format!(
                "unsupported settings payload, expected an object, got: {settings}"
            ));
        };

        for (key, value) in map {
            match key.as_str() {
                "ext_vars" => {
                    self.ext_vars = parse_ext_vars(value)?;
                }
                "formatting" => {
                    self.formatting = serde_json::from_value(value)
                        .map_err(|err| format!("formatting options parsing failed: {err}"))?;
                }
                other => {
                    return Err(format!("unsupported settings key: {other:?}"));
                }
            }
        }
        Ok(())
    }
}

fn parse_ext_vars(value: Value) -> Result<HashMap<String, String>, String> {
    let Value::Object(map) = value else {
        return Err(format!(
            "unsupported settings value for ext_vars, expected an object, got: {value}"
        ));
    };

    let mut vars = HashMap::with_capacity(map.len());
    for (key, value) in map {
        let Value::String(text) = value else {
            return Err(format!(
                "unsupported settings value for ext_vars.{key}, expected a string, got: {value}"
            ));
        };
        vars.insert(key, text);
    }
    Ok(vars)
}
