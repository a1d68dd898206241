//! Policy snapshot: the resolved, validated configuration a task runs under.
//!
//! The raw form ([`PolicyConfig`]) mirrors the on-wiki JSON configuration
//! page. Unknown keys are rejected while parsing and value ranges are checked
//! once in [`PolicyConfig::resolve`], so everything downstream works with a
//! plain typed [`Policy`].

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::defaults::{
    DEFAULT_FALSE_POSITIVE_PAGE, DEFAULT_MAX_REVERTS_PER_USER_PER_PAGE, DEFAULT_REVERT_THRESHOLD,
    DEFAULT_REVERT_WINDOW_HOURS, DEFAULT_SKIP_TAGS, DEFAULT_SKIP_USER_GROUPS,
    DEFAULT_SKIP_USER_RIGHTS, MAX_REVERT_WINDOW_HOURS, MODEL_LANGUAGE_AGNOSTIC,
    MODEL_MULTILINGUAL,
};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Unknown keys end up here too, via `deny_unknown_fields`.
    #[error("Invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid policy value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl PolicyError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Caution level
// ============================================================================

/// Community-facing knob that selects a revert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CautionLevel {
    VeryCautious,
    Cautious,
    SomewhatCautious,
    NotVeryCautious,
}

impl CautionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CautionLevel::VeryCautious => "very-cautious",
            CautionLevel::Cautious => "cautious",
            CautionLevel::SomewhatCautious => "somewhat-cautious",
            CautionLevel::NotVeryCautious => "not-very-cautious",
        }
    }

    /// Revert probability above which an edit is reverted.
    pub fn threshold(&self) -> f64 {
        match self {
            CautionLevel::VeryCautious => 0.990,
            CautionLevel::Cautious => 0.985,
            CautionLevel::SomewhatCautious => 0.980,
            CautionLevel::NotVeryCautious => 0.975,
        }
    }
}

impl fmt::Display for CautionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CautionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "very-cautious" => Ok(CautionLevel::VeryCautious),
            "cautious" => Ok(CautionLevel::Cautious),
            "somewhat-cautious" => Ok(CautionLevel::SomewhatCautious),
            "not-very-cautious" => Ok(CautionLevel::NotVeryCautious),
            _ => Err(format!(
                "Invalid caution level: '{}'. Expected: very-cautious, cautious, somewhat-cautious, or not-very-cautious",
                s
            )),
        }
    }
}

// ============================================================================
// Raw configuration
// ============================================================================

/// On-wiki configuration as stored. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicyConfig {
    pub enabled: bool,
    pub caution_level: Option<CautionLevel>,
    pub revert_threshold: Option<f64>,
    pub skip_tags: Option<Vec<String>>,
    pub skip_user_rights: Option<Vec<String>>,
    pub skip_user_groups: Option<Vec<String>>,
    pub max_reverts_per_user_per_page: Option<u32>,
    pub revert_window_hours: Option<i64>,
    pub minor_edit: bool,
    pub bot_edit: bool,
    pub talk_page_message_enabled: bool,
    pub false_positive_page: Option<String>,
    pub help_page_link: Option<String>,
    pub multilingual_enabled: bool,
    pub multilingual_languages: Vec<String>,
}

impl PolicyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate ranges and fill defaults.
    pub fn resolve(self) -> Result<Policy, PolicyError> {
        let threshold = match (self.revert_threshold, self.caution_level) {
            (Some(_), Some(_)) => {
                return Err(PolicyError::invalid(
                    "revert_threshold",
                    "set either revert_threshold or caution_level, not both",
                ))
            }
            (Some(t), None) => {
                if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                    return Err(PolicyError::invalid(
                        "revert_threshold",
                        format!("{} is outside [0, 1]", t),
                    ));
                }
                t
            }
            (None, Some(level)) => level.threshold(),
            (None, None) => DEFAULT_REVERT_THRESHOLD,
        };

        let max_reverts = self
            .max_reverts_per_user_per_page
            .unwrap_or(DEFAULT_MAX_REVERTS_PER_USER_PER_PAGE);
        if max_reverts == 0 {
            return Err(PolicyError::invalid(
                "max_reverts_per_user_per_page",
                "must be at least 1",
            ));
        }

        let window_hours = self
            .revert_window_hours
            .unwrap_or(DEFAULT_REVERT_WINDOW_HOURS);
        if window_hours <= 0 {
            return Err(PolicyError::invalid(
                "revert_window_hours",
                "must be positive",
            ));
        }
        let revert_window = Duration::try_hours(window_hours)
            .filter(|_| window_hours <= MAX_REVERT_WINDOW_HOURS)
            .ok_or_else(|| {
                PolicyError::invalid(
                    "revert_window_hours",
                    format!("must be at most {}", MAX_REVERT_WINDOW_HOURS),
                )
            })?;

        let model = if self.multilingual_enabled {
            ScoringModel::Multilingual {
                languages: self.multilingual_languages,
            }
        } else {
            ScoringModel::LanguageAgnostic
        };

        Ok(Policy {
            enabled: self.enabled,
            caution_level: self.caution_level,
            threshold,
            skip_tags: self.skip_tags.unwrap_or_else(|| owned(DEFAULT_SKIP_TAGS)),
            skip_user_rights: self
                .skip_user_rights
                .unwrap_or_else(|| owned(DEFAULT_SKIP_USER_RIGHTS)),
            skip_user_groups: self
                .skip_user_groups
                .unwrap_or_else(|| owned(DEFAULT_SKIP_USER_GROUPS)),
            max_reverts_per_user_per_page: max_reverts,
            revert_window,
            minor_edit: self.minor_edit,
            bot_edit: self.bot_edit,
            talk_page_message_enabled: self.talk_page_message_enabled,
            false_positive_page: self
                .false_positive_page
                .unwrap_or_else(|| DEFAULT_FALSE_POSITIVE_PAGE.to_string()),
            help_page_link: self.help_page_link,
            model,
        })
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Resolved policy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScoringModel {
    LanguageAgnostic,
    /// Multilingual model for the listed languages, language-agnostic otherwise.
    Multilingual { languages: Vec<String> },
}

/// Typed, validated policy snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    pub enabled: bool,
    pub caution_level: Option<CautionLevel>,
    pub threshold: f64,
    pub skip_tags: Vec<String>,
    pub skip_user_rights: Vec<String>,
    pub skip_user_groups: Vec<String>,
    pub max_reverts_per_user_per_page: u32,
    #[serde(serialize_with = "serialize_hours")]
    pub revert_window: Duration,
    pub minor_edit: bool,
    pub bot_edit: bool,
    pub talk_page_message_enabled: bool,
    pub false_positive_page: String,
    pub help_page_link: Option<String>,
    pub model: ScoringModel,
}

impl Policy {
    pub fn from_json_str(json: &str) -> Result<Self, PolicyError> {
        PolicyConfig::from_json_str(json)?.resolve()
    }

    pub fn from_path(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Name of the prediction model to query for a wiki language.
    pub fn model_for(&self, lang: &str) -> &'static str {
        match &self.model {
            ScoringModel::Multilingual { languages } if languages.iter().any(|l| l == lang) => {
                MODEL_MULTILINGUAL
            }
            _ => MODEL_LANGUAGE_AGNOSTIC,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        // An empty config always resolves.
        PolicyConfig::default()
            .resolve()
            .unwrap_or_else(|_| unreachable!("default policy config is valid"))
    }
}

fn serialize_hours<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_hours())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_resolves_to_defaults() {
        let policy = Policy::from_json_str("{}").unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.threshold, 0.5);
        assert_eq!(policy.skip_tags, vec!["manual-revert", "rollback", "undo"]);
        assert_eq!(policy.skip_user_rights, vec!["bot", "autopatrol"]);
        assert_eq!(policy.skip_user_groups, vec!["sysop"]);
        assert_eq!(policy.max_reverts_per_user_per_page, 1);
        assert_eq!(policy.revert_window, Duration::hours(24));
        assert_eq!(policy, Policy::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err =
            Policy::from_json_str(r#"{"enabled": true, "revert_treshold": 0.7}"#).unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
        assert!(err.to_string().contains("revert_treshold"));
    }

    #[test]
    fn test_caution_level_selects_threshold() {
        let policy = Policy::from_json_str(r#"{"caution_level": "very-cautious"}"#).unwrap();
        assert_eq!(policy.threshold, 0.990);
        assert_eq!(policy.caution_level, Some(CautionLevel::VeryCautious));
    }

    #[test]
    fn test_threshold_and_caution_level_conflict() {
        let err = Policy::from_json_str(r#"{"caution_level": "cautious", "revert_threshold": 0.6}"#)
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidValue { key: "revert_threshold", .. }));
    }

    #[test]
    fn test_threshold_out_of_range() {
        assert!(Policy::from_json_str(r#"{"revert_threshold": 1.2}"#).is_err());
        assert!(Policy::from_json_str(r#"{"revert_threshold": -0.1}"#).is_err());
    }

    #[test]
    fn test_revert_window_bounds() {
        assert!(Policy::from_json_str(r#"{"revert_window_hours": 0}"#).is_err());
        let year = Policy::from_json_str(r#"{"revert_window_hours": 8784}"#).unwrap();
        assert_eq!(year.revert_window, Duration::hours(8784));

        for hours in ["8785", "3000000000", "9000000000000"] {
            let err = Policy::from_json_str(&format!(r#"{{"revert_window_hours": {}}}"#, hours))
                .unwrap_err();
            assert!(
                matches!(err, PolicyError::InvalidValue { key: "revert_window_hours", .. }),
                "{hours}: {err}"
            );
        }
    }

    #[test]
    fn test_zero_max_reverts_rejected() {
        assert!(Policy::from_json_str(r#"{"max_reverts_per_user_per_page": 0}"#).is_err());
    }

    #[test]
    fn test_model_selection() {
        let policy = Policy::from_json_str(
            r#"{"multilingual_enabled": true, "multilingual_languages": ["de", "fr"]}"#,
        )
        .unwrap();
        assert_eq!(policy.model_for("de"), MODEL_MULTILINGUAL);
        assert_eq!(policy.model_for("en"), MODEL_LANGUAGE_AGNOSTIC);
        assert_eq!(Policy::default().model_for("de"), MODEL_LANGUAGE_AGNOSTIC);
    }

    #[test]
    fn test_caution_level_from_str() {
        assert_eq!("Cautious".parse::<CautionLevel>().unwrap(), CautionLevel::Cautious);
        assert!("reckless".parse::<CautionLevel>().is_err());
    }

    #[test]
    fn test_from_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"enabled": true, "talk_page_message_enabled": true}"#)?;
        let policy = Policy::from_path(&path)?;
        assert!(policy.enabled);
        assert!(policy.talk_page_message_enabled);
        assert!(matches!(
            Policy::from_path(&dir.path().join("missing.json")),
            Err(PolicyError::Io { .. })
        ));
        Ok(())
    }
}
