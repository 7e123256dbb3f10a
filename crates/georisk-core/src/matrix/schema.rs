//! JSON Schema validation for risk matrix documents.
//!
//! The schema is embedded at compile time from `schema/matrix.schema.json`
//! and compiled once on first use.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded matrix schema (loaded at compile time).
const MATRIX_SCHEMA_JSON: &str = include_str!("../../schema/matrix.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(MATRIX_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate a matrix document against the schema.
///
/// Returns every violation found, each formatted as `"<message> at <path>"`.
pub fn validate_matrix_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
