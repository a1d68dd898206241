//! `automod score`: fetch one score from the prediction service.

use anyhow::{Context, Result};
use automod_core::{ScoreClient, ScoreRequest, ScoreSource};
use automod_protocol::defaults::{MODEL_LANGUAGE_AGNOSTIC, MODEL_MULTILINGUAL};
use serde_json::json;

use super::config::ScoringArgs;

pub async fn run(rev_id: u64, lang: &str, multilingual: bool, scoring: &ScoringArgs) -> Result<()> {
    let client = ScoreClient::new(scoring.client_config()).context("Invalid scoring settings")?;
    let model = if multilingual {
        MODEL_MULTILINGUAL
    } else {
        MODEL_LANGUAGE_AGNOSTIC
    };
    let request = ScoreRequest::new(rev_id, lang).with_model(model);

    let score = match client.fetch_score(&request).await {
        Ok(score) => score,
        Err(e) => {
            let retry = if e.allow_retries() {
                "retryable"
            } else {
                "not retryable"
            };
            return Err(e).context(format!("Scoring revision {} failed ({})", rev_id, retry));
        }
    };

    let probability = score.revert_probability().ok();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "score": score,
            "revert_probability": probability,
        }))?
    );
    Ok(())
}
