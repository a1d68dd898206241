//! Revert risk scores as returned by the prediction endpoint.
//!
//! The endpoint answers with an untyped JSON object. It is kept as a
//! `serde_json::Value` at the boundary and converted here, once, into a
//! typed [`Score`]. A body with an `error` member is a model-side failure
//! and never becomes a `Score`.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::RevisionId;

/// Key of the probability that the edit should be reverted.
pub const PROBABILITY_REVERT_KEY: &str = "true";
/// Key of the probability that the edit is fine.
pub const PROBABILITY_KEEP_KEY: &str = "false";

#[derive(Debug, Error, PartialEq)]
pub enum ScoreParseError {
    /// The model answered with an explicit error object.
    #[error("Model returned an error: {0}")]
    Model(String),

    /// The body is not a score document.
    #[error("Malformed score body: {0}")]
    Malformed(String),

    /// The probability mapping lacks the revert probability or it is unusable.
    #[error("Score has no usable '{key}' probability: {detail}")]
    MissingProbability { key: &'static str, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub model_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub model_version: String,
    #[serde(alias = "wiki_db")]
    pub wiki_id: String,
    #[serde(alias = "revision_id")]
    pub rev_id: RevisionId,
    pub output: ScoreOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutput {
    #[serde(default)]
    pub prediction: bool,
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
}

impl Score {
    /// Convert an endpoint body into a score.
    pub fn from_value(value: Value) -> Result<Self, ScoreParseError> {
        if let Some(error) = value.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(ScoreParseError::Model(message));
        }
        serde_json::from_value(value).map_err(|e| ScoreParseError::Malformed(e.to_string()))
    }

    /// Probability that the edit should be reverted, in `[0, 1]`.
    pub fn revert_probability(&self) -> Result<f64, ScoreParseError> {
        let probability = self
            .output
            .probabilities
            .get(PROBABILITY_REVERT_KEY)
            .copied()
            .ok_or_else(|| ScoreParseError::MissingProbability {
                key: PROBABILITY_REVERT_KEY,
                detail: "key absent".to_string(),
            })?;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoreParseError::MissingProbability {
                key: PROBABILITY_REVERT_KEY,
                detail: format!("{} is outside [0, 1]", probability),
            });
        }
        Ok(probability)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
