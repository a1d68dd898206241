//! Client for the revert risk prediction endpoint.
//!
//! One request, and at most one identical retry when the first attempt
//! fails for a reason other than a 4xx answer:
//!
//! ```text
//! NotSent -> Sent -> Success
//!                 -> ClientError                      (terminal, no retry)
//!                 -> ServerError -> RetrySent -> Success
//!                                             -> Failed (terminal, retryable by the job runner)
//! ```
//!
//! Backoff and further redelivery are the job runner's business.

use async_trait::async_trait;
use automod_protocol::defaults::{
    DEFAULT_SCORE_TIMEOUT_SECS, DEFAULT_SCORING_BASE_URL, MODEL_LANGUAGE_AGNOSTIC,
    USER_AGENT_PREFIX,
};
use automod_protocol::{RevisionId, Score, ScoreParseError};
use reqwest::header::{HeaderValue, HOST, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ScoreError {
    /// The endpoint rejected the request (4xx). Retrying cannot help.
    #[error("Scoring request for revision {rev_id} rejected with HTTP {status}")]
    Rejected { rev_id: RevisionId, status: u16 },

    /// Both attempts failed with a server error or a transport failure.
    #[error("Scoring request for revision {rev_id} failed after retry: {message}")]
    Unavailable { rev_id: RevisionId, message: String },

    /// A success response that is not a usable score.
    #[error("Unusable score body for revision {rev_id}: {source}")]
    Body {
        rev_id: RevisionId,
        #[source]
        source: ScoreParseError,
    },

    #[error("Invalid scoring client configuration: {0}")]
    Config(String),
}

impl ScoreError {
    /// Whether the job runner may redeliver the task.
    pub fn allow_retries(&self) -> bool {
        matches!(self, ScoreError::Unavailable { .. })
    }
}

/// What to score and with which model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    pub rev_id: RevisionId,
    pub lang: String,
    pub model: String,
}

impl ScoreRequest {
    pub fn new(rev_id: RevisionId, lang: impl Into<String>) -> Self {
        Self {
            rev_id,
            lang: lang.into(),
            model: MODEL_LANGUAGE_AGNOSTIC.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Anything that can produce a score for a revision.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    async fn fetch_score(&self, request: &ScoreRequest) -> Result<Score, ScoreError>;
}

#[derive(Debug, Clone)]
pub struct ScoreClientConfig {
    /// Prefix the model name is appended to; normally ends with `/`.
    pub base_url: String,
    /// Sent as `Host`, for routing through an internal gateway.
    pub host_header: Option<String>,
    /// Per attempt.
    pub timeout: Duration,
}

impl Default for ScoreClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SCORING_BASE_URL.to_string(),
            host_header: None,
            timeout: Duration::from_secs(DEFAULT_SCORE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictBody<'a> {
    rev_id: RevisionId,
    lang: &'a str,
}

/// Result of a single HTTP attempt.
enum Attempt {
    Success(Value),
    Rejected(StatusCode),
    Failed(String),
    Undecodable(String),
}

pub struct ScoreClient {
    config: ScoreClientConfig,
    http: reqwest::Client,
    host_header: Option<HeaderValue>,
}

impl ScoreClient {
    pub fn new(config: ScoreClientConfig) -> Result<Self, ScoreError> {
        let host_header = config
            .host_header
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| ScoreError::Config(format!("invalid host header: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScoreError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http,
            host_header,
        })
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}{}:predict", self.config.base_url, model)
    }

    pub fn user_agent(lang: &str) -> String {
        format!("{}.{}", USER_AGENT_PREFIX, lang)
    }

    fn user_agent_header(lang: &str) -> Result<HeaderValue, ScoreError> {
        HeaderValue::from_str(&Self::user_agent(lang))
            .map_err(|e| ScoreError::Config(format!("invalid language tag {:?}: {}", lang, e)))
    }

    async fn attempt(
        &self,
        url: &str,
        user_agent: &HeaderValue,
        request: &ScoreRequest,
    ) -> Attempt {
        let mut builder = self
            .http
            .post(url)
            .header(USER_AGENT, user_agent.clone())
            .json(&PredictBody {
                rev_id: request.rev_id,
                lang: &request.lang,
            });
        if let Some(host) = &self.host_header {
            builder = builder.header(HOST, host.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Failed(e.to_string()),
        };

        let status = response.status();
        if status.is_client_error() {
            return Attempt::Rejected(status);
        }
        if !status.is_success() {
            return Attempt::Failed(format!("HTTP {}", status.as_u16()));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Failed(format!("reading body: {}", e)),
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Attempt::Success(value),
            Err(e) => Attempt::Undecodable(e.to_string()),
        }
    }

    fn finish(rev_id: RevisionId, attempt: Attempt) -> Result<Score, ScoreError> {
        match attempt {
            Attempt::Success(value) => {
                Score::from_value(value).map_err(|source| ScoreError::Body { rev_id, source })
            }
            Attempt::Rejected(status) => Err(ScoreError::Rejected {
                rev_id,
                status: status.as_u16(),
            }),
            Attempt::Undecodable(message) => Err(ScoreError::Body {
                rev_id,
                source: ScoreParseError::Malformed(message),
            }),
            Attempt::Failed(message) => Err(ScoreError::Unavailable { rev_id, message }),
        }
    }
}

#[async_trait]
impl ScoreSource for ScoreClient {
    async fn fetch_score(&self, request: &ScoreRequest) -> Result<Score, ScoreError> {
        let url = self.endpoint(&request.model);
        let user_agent = Self::user_agent_header(&request.lang)?;
        debug!(rev_id = request.rev_id, %url, "requesting score");

        let attempt = match self.attempt(&url, &user_agent, request).await {
            Attempt::Failed(message) => {
                warn!(
                    rev_id = request.rev_id,
                    error = %message,
                    "score request failed, retrying once"
                );
                self.attempt(&url, &user_agent, request).await
            }
            other => other,
        };

        let result = Self::finish(request.rev_id, attempt);
        match &result {
            Ok(score) => info!(
                rev_id = request.rev_id,
                model = %score.model_name,
                version = %score.model_version,
                "score received"
            ),
            Err(e) => warn!(
                rev_id = request.rev_id,
                allow_retries = e.allow_retries(),
                error = %e,
                "score request failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_and_user_agent() {
        let client = ScoreClient::new(ScoreClientConfig {
            base_url: "http://localhost:8080/v1/models/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint("revertrisk-language-agnostic"),
            "http://localhost:8080/v1/models/revertrisk-language-agnostic:predict"
        );
        assert_eq!(ScoreClient::user_agent("en"), "mediawiki.ext.AutoModerator.en");
    }

    #[test]
    fn test_invalid_host_header_rejected() {
        let result = ScoreClient::new(ScoreClientConfig {
            host_header: Some("bad\nhost".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(ScoreError::Config(_))));
    }

    #[test]
    fn test_retry_classification() {
        assert!(!ScoreError::Rejected { rev_id: 1, status: 404 }.allow_retries());
        assert!(ScoreError::Unavailable {
            rev_id: 1,
            message: "HTTP 503".into()
        }
        .allow_retries());
        assert!(!ScoreError::Body {
            rev_id: 1,
            source: ScoreParseError::Model("boom".into())
        }
        .allow_retries());
    }

    #[test]
    fn test_request_defaults_to_language_agnostic_model() {
        let request = ScoreRequest::new(5, "en");
        assert_eq!(request.model, "revertrisk-language-agnostic");
        assert_eq!(
            request.with_model("revertrisk-multilingual").model,
            "revertrisk-multilingual"
        );
    }

    #[test]
    fn test_unencodable_language_is_a_config_error() {
        let err = ScoreClient::user_agent_header("en\n").unwrap_err();
        assert!(matches!(err, ScoreError::Config(_)));
        assert!(!err.allow_retries());
        assert!(ScoreClient::user_agent_header("zh-hant").is_ok());
    }
}
