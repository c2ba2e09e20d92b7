//! JSON Schema validation for model output.
//!
//! Every structured reply (summary, vote, verdict) is validated against an
//! embedded schema before it is deserialized. The same schema text is sent
//! to the model in JSON mode.

use std::sync::OnceLock;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::types::{EvaluationVote, ReviewVerdict, StructuredSummary};

const SUMMARY_SCHEMA_JSON: &str = include_str!("../schemas/structured_summary.schema.json");
const VOTE_SCHEMA_JSON: &str = include_str!("../schemas/evaluation_vote.schema.json");
const VERDICT_SCHEMA_JSON: &str = include_str!("../schemas/review_verdict.schema.json");

static SUMMARY_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static VOTE_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static VERDICT_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),

    #[error("{name} failed schema validation: {}", .errors.join("; "))]
    Invalid { name: &'static str, errors: Vec<String> },

    #[error("{name} does not deserialize: {source}")]
    Deserialize {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The embedded schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Summary,
    Vote,
    Verdict,
}

impl SchemaKind {
    /// Raw schema text, as embedded at compile time.
    pub fn source(self) -> &'static str {
        match self {
            SchemaKind::Summary => SUMMARY_SCHEMA_JSON,
            SchemaKind::Vote => VOTE_SCHEMA_JSON,
            SchemaKind::Verdict => VERDICT_SCHEMA_JSON,
        }
    }

    fn cell(self) -> &'static OnceLock<Result<jsonschema::Validator, String>> {
        match self {
            SchemaKind::Summary => &SUMMARY_VALIDATOR,
            SchemaKind::Vote => &VOTE_VALIDATOR,
            SchemaKind::Verdict => &VERDICT_VALIDATOR,
        }
    }
}

/// A type the model is asked to produce as JSON.
pub trait StructuredOutput: DeserializeOwned + Serialize + Send + 'static {
    /// Name used in errors and logs.
    const NAME: &'static str;
    const SCHEMA: SchemaKind;
}

impl StructuredOutput for StructuredSummary {
    const NAME: &'static str = "StructuredSummary";
    const SCHEMA: SchemaKind = SchemaKind::Summary;
}

impl StructuredOutput for EvaluationVote {
    const NAME: &'static str = "EvaluationVote";
    const SCHEMA: SchemaKind = SchemaKind::Vote;
}

impl StructuredOutput for ReviewVerdict {
    const NAME: &'static str = "ReviewVerdict";
    const SCHEMA: SchemaKind = SchemaKind::Verdict;
}

/// Get or initialize the compiled validator for `kind`.
fn get_validator(kind: SchemaKind) -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = kind.cell().get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(kind.source()) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate a JSON value against one of the embedded schemas.
///
/// Returns `Err` with every violation, formatted as `"<message> at <path>"`.
pub fn validate(kind: SchemaKind, value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator(kind).map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate then deserialize.
pub fn from_value<T: StructuredOutput>(value: serde_json::Value) -> Result<T, SchemaError> {
    validate(T::SCHEMA, &value).map_err(|errors| SchemaError::Invalid {
        name: T::NAME,
        errors,
    })?;

    serde_json::from_value(value).map_err(|source| SchemaError::Deserialize {
        name: T::NAME,
        source,
    })
}

/// Parse strictly (no repair), validate, deserialize.
pub fn from_str<T: StructuredOutput>(text: &str) -> Result<T, SchemaError> {
    let value: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|source| SchemaError::Deserialize {
            name: T::NAME,
            source,
        })?;
    from_value(value)
}
