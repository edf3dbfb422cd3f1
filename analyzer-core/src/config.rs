//! Run configuration.
//!
//! A [`RunConfig`] is built once at startup, either from process environment
//! variables or from a TOML file with the same keys in lowercase, and then
//! passed by reference to every component that needs it.

use crate::error::ConfigError;
use crate::types::ExplanationSchema;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Comments handed to the model per post. Not configurable.
pub const MAX_COMMENTS_FOR_PROMPT: usize = 3;

pub const DEFAULT_SUBREDDIT: &str = "aws";
pub const DEFAULT_POST_LIMIT: usize = 5;
pub const DEFAULT_NEW_POST_CHECK_LIMIT: usize = 50;
pub const DEFAULT_MIN_COMMENTS_TO_PROCESS: u32 = 2;
pub const DEFAULT_COMMENT_LIMIT: usize = 10;
pub const DEFAULT_KEY_PREFIX: &str = "reddit-analysis";
pub const DEFAULT_SECRET_NAME: &str = "reddit_api";
pub const DEFAULT_MODEL_API_BASE_URL: &str = "https://api.anthropic.com/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub subreddit: String,
    /// Target number of eligible posts.
    pub post_limit: usize,
    /// Scan budget over the newest posts.
    pub new_post_check_limit: usize,
    pub min_comments_to_process: u32,
    /// Comments kept in the stored record.
    pub comment_limit: usize,
    pub max_comments_for_prompt: usize,
    pub output_location: PathBuf,
    pub key_prefix: String,
    pub model_id: String,
    pub model_api_base_url: String,
    pub ledger_database_url: String,
    pub secret_name: String,
    pub secrets_dir: Option<PathBuf>,
    pub explanation_schema: ExplanationSchema,
    pub poll_interval_minutes: u64,
}

impl RunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = contents.parse()?;
        Self::from_lookup(|key| {
            table
                .get(&key.to_ascii_lowercase())
                .map(|value| match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        })
    }

    /// Builds the configuration from a key lookup using the environment
    /// variable names. Required keys are checked together so that every
    /// missing one is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let output_location = get(&["OUTPUT_LOCATION", "S3_BUCKET_NAME"]);
        let model_id = get(&["MODEL_ID", "BEDROCK_MODEL_ID"]);
        let ledger_database_url = get(&["LEDGER_DATABASE_URL"]);

        let mut missing = Vec::new();
        if output_location.is_none() {
            missing.push("OUTPUT_LOCATION");
        }
        if model_id.is_none() {
            missing.push("MODEL_ID");
        }
        if ledger_database_url.is_none() {
            missing.push("LEDGER_DATABASE_URL");
        }
        let (Some(output_location), Some(model_id), Some(ledger_database_url)) =
            (output_location, model_id, ledger_database_url)
        else {
            return Err(ConfigError::MissingField {
                field: missing.join(", "),
            });
        };

        let post_limit = parse_or_default(
            "POST_LIMIT",
            get(&["POST_LIMIT"]),
            DEFAULT_POST_LIMIT,
            |v| *v > 0,
        );
        let new_post_check_limit = parse_or_default(
            "NEW_POST_CHECK_LIMIT",
            get(&["NEW_POST_CHECK_LIMIT"]),
            DEFAULT_NEW_POST_CHECK_LIMIT,
            |v| *v > 0,
        );
        let min_comments_to_process = parse_or_default(
            "MIN_COMMENTS_TO_PROCESS",
            get(&["MIN_COMMENTS_TO_PROCESS"]),
            DEFAULT_MIN_COMMENTS_TO_PROCESS,
            |_| true,
        );
        let comment_limit = parse_or_default(
            "COMMENT_LIMIT",
            get(&["COMMENT_LIMIT"]),
            DEFAULT_COMMENT_LIMIT,
            |_| true,
        );
        let poll_interval_minutes =
            parse_or_default("POLL_INTERVAL_MINUTES", get(&["POLL_INTERVAL_MINUTES"]), 0, |_| true);

        let explanation_schema = match get(&["PROBLEM_EXPLANATION_SCHEMA"]).as_deref() {
            None => ExplanationSchema::default(),
            Some(value) if value.eq_ignore_ascii_case("structured") => ExplanationSchema::Structured,
            Some(value) if value.eq_ignore_ascii_case("text") => ExplanationSchema::Text,
            Some(value) => {
                return Err(ConfigError::InvalidValue {
                    field: "PROBLEM_EXPLANATION_SCHEMA".to_string(),
                    value: value.to_string(),
                })
            }
        };

        let config = Self {
            subreddit: get(&["SUBREDDIT_NAME"]).unwrap_or_else(|| DEFAULT_SUBREDDIT.to_string()),
            post_limit,
            new_post_check_limit,
            min_comments_to_process,
            comment_limit,
            max_comments_for_prompt: MAX_COMMENTS_FOR_PROMPT,
            output_location: PathBuf::from(output_location),
            key_prefix: get(&["S3_KEY_PREFIX", "KEY_PREFIX"])
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            model_id,
            model_api_base_url: get(&["MODEL_API_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_MODEL_API_BASE_URL.to_string()),
            ledger_database_url,
            secret_name: get(&["SECRET_NAME", "SECRET_NAME_ENV_VAR"])
                .unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string()),
            secrets_dir: get(&["SECRETS_DIR"]).map(PathBuf::from),
            explanation_schema,
            poll_interval_minutes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints. Returns the warnings that were logged.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.subreddit.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "subreddit name is empty".to_string(),
            });
        }
        if self.post_limit == 0 || self.new_post_check_limit == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "post limits must be positive".to_string(),
            });
        }

        let mut warnings = Vec::new();
        if self.new_post_check_limit < self.post_limit && self.min_comments_to_process > 0 {
            let message = format!(
                "NEW_POST_CHECK_LIMIT ({}) is less than POST_LIMIT ({}) and MIN_COMMENTS_TO_PROCESS is > 0. May not find enough eligible posts.",
                self.new_post_check_limit, self.post_limit
            );
            warn!("{}", message);
            warnings.push(message);
        }
        Ok(warnings)
    }

    pub fn log_summary(&self) {
        info!("Config loaded:");
        info!("  SUBREDDIT_NAME: {}", self.subreddit);
        info!("  POST_LIMIT (target eligible posts): {}", self.post_limit);
        info!("  NEW_POST_CHECK_LIMIT: {}", self.new_post_check_limit);
        info!("  MIN_COMMENTS_TO_PROCESS: {}", self.min_comments_to_process);
        info!("  COMMENT_LIMIT: {}", self.comment_limit);
        info!("  OUTPUT_LOCATION: {}", self.output_location.display());
        info!("  KEY_PREFIX: {}", self.key_prefix);
        info!("  MODEL_ID: {}", self.model_id);
        info!("  SECRET_NAME: {}", self.secret_name);
        info!("  PROBLEM_EXPLANATION_SCHEMA: {:?}", self.explanation_schema);
    }
}

fn parse_or_default<T>(key: &str, raw: Option<String>, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Invalid {} value '{}'. Using default {}.", key, raw, default);
            default
        }
    }
}
