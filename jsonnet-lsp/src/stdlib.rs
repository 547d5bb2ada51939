//! Embedded catalogue of the Jsonnet standard library.
//!
//! The table is baked into the binary so completion and hover never depend
//! on a jsonnet distribution being installed next to the server.

use serde::Deserialize;

const STDLIB_JSON: &str = include_str!("../assets/stdlib.json");

/// One `std` function with its rendered Markdown documentation.
#[derive(Debug, Clone, Deserialize)]
pub struct StdFunction {
    pub name: String,
    pub params: Vec<String>,
    #[serde(rename = "description")]
    pub markdown_description: String,
    /// First jsonnet release shipping the function, when known.
    #[serde(default, rename = "availableSince")]
    pub available_since: Option<String>,
}

impl StdFunction {
    /// `std.join(sep, arr)` style signature.
    pub fn signature(&self) -> String {
        let mut sig = format!("std.{}", self.name);
        if !self.params.is_empty() {
            sig.push('(');
            sig.push_str(&self.params.join(", "));
            sig.push(')');
        }
        sig
    }
}

/// Parses the embedded table. Fails only if the embedded asset is malformed.
pub fn functions() -> Result<Vec<StdFunction>, serde_json::Error> {
    serde_json::from_str(STDLIB_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_parses() {
        let functions = functions().unwrap();
        assert!(functions.len() > 50);
        assert!(functions.iter().all(|f| !f.name.is_empty()));
        assert!(functions.iter().all(|f| !f.markdown_description.is_empty()));
    }

    #[test]
    fn signature_joins_parameters() {
        let f = StdFunction {
            name: "join".to_string(),
            params: vec!["sep".to_string(), "arr".to_string()],
            markdown_description: String::new(),
            available_since: None,
        };
        assert_eq!(f.signature(), "std.join(sep, arr)");
    }

    #[test]
    fn availability_parses_when_present() {
        let functions = functions().unwrap();
        let clamp = functions.iter().find(|f| f.name == "clamp").unwrap();
        assert_eq!(clamp.available_since.as_deref(), Some("0.15.0"));
        let map = functions.iter().find(|f| f.name == "map").unwrap();
        assert!(map.available_since.is_none());
    }

    #[test]
    fn known_functions_are_present() {
        let functions = functions().unwrap();
        for name in ["map", "format", "objectFields", "manifestJsonEx"] {
            assert!(
                functions.iter().any(|f| f.name == name),
                "missing std.{name}"
            );
        }
    }
}
