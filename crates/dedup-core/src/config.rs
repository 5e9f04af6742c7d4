//! Run configuration for the duplicate detector
//!
//! The configuration is read once at startup into an immutable
//! [`DetectorConfig`] and handed to each component by reference.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{DedupError, Result};

/// Default similarity cutoff for flagging a duplicate
pub const DEFAULT_THRESHOLD: f32 = 0.85;

/// Default label attached to flagged issues
pub const DEFAULT_DUPLICATE_LABEL: &str = "potential-duplicate";

/// Default sentence embedding model on the Hugging Face Hub
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default GitHub REST endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const THRESHOLD_KEYS: &[&str] = &["INPUT_THRESHOLD", "THRESHOLD"];
const LABEL_KEYS: &[&str] = &[
    "INPUT_DUPLICATE_LABEL",
    "INPUT_DUPLICATE-LABEL",
    "DUPLICATE_LABEL",
];
const REPOSITORY_KEYS: &[&str] = &["GITHUB_REPOSITORY", "REPOSITORY_ID"];
const EVENT_PATH_KEYS: &[&str] = &["GITHUB_EVENT_PATH", "EVENT_SOURCE"];
const TOKEN_KEYS: &[&str] = &["INPUT_GITHUB_TOKEN", "INPUT_GITHUB-TOKEN", "GITHUB_TOKEN"];
const API_URL_KEYS: &[&str] = &["GITHUB_API_URL"];
const MODEL_KEYS: &[&str] = &["INPUT_MODEL", "EMBEDDING_MODEL"];
const MODEL_PATH_KEYS: &[&str] = &["EMBEDDING_MODEL_PATH"];

/// Similarity cutoff, validated to be a finite cosine value
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f32);

impl Threshold {
    /// Create a threshold, rejecting values that are not finite or lie
    /// outside the cosine range [-1, 1].
    pub fn new(value: f32) -> Result<Self> {
        if !value.is_finite() {
            return Err(DedupError::Config(format!(
                "threshold must be a finite number, got {}",
                value
            )));
        }
        if !(-1.0..=1.0).contains(&value) {
            return Err(DedupError::Config(format!(
                "threshold must lie in [-1, 1], got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Inclusive comparison: a score equal to the threshold is a match.
    pub fn is_met_by(self, score: f32) -> bool {
        score >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl FromStr for Threshold {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| DedupError::Config(format!("threshold is not a number: {:?}", s)))?;
        Self::new(value)
    }
}

/// Repository identity in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl FromStr for Repository {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || DedupError::Config(format!("repository must look like owner/name, got {:?}", s));

        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Where the embedding model comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Download (or reuse the cached copy of) a Hugging Face Hub repository
    Hub { repo_id: String },
    /// A local directory holding `config.json`, `tokenizer.json` and
    /// `model.safetensors`
    Local(PathBuf),
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Hub { repo_id } => write!(f, "hf-hub:{}", repo_id),
            ModelSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Immutable configuration for one detection run
#[derive(Clone, PartialEq)]
pub struct DetectorConfig {
    /// Minimum cosine similarity for a match
    pub threshold: Threshold,
    /// Label applied to the triggering issue on a match
    pub duplicate_label: String,
    /// Target repository
    pub repository: Repository,
    /// Path to the JSON event that triggered the run
    pub event_path: PathBuf,
    /// Tracker API token
    pub token: String,
    /// Tracker API base URL
    pub api_url: String,
    /// Embedding model location
    pub model: ModelSource,
}

impl fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("threshold", &self.threshold)
            .field("duplicate_label", &self.duplicate_label)
            .field("repository", &self.repository)
            .field("event_path", &self.event_path)
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

impl DetectorConfig {
    /// Load configuration from the process environment
    ///
    /// Expected variables (first match wins within each row):
    /// - INPUT_THRESHOLD / THRESHOLD: similarity cutoff (default 0.85)
    /// - INPUT_DUPLICATE_LABEL / INPUT_DUPLICATE-LABEL / DUPLICATE_LABEL
    /// - GITHUB_REPOSITORY / REPOSITORY_ID: `owner/name` (required)
    /// - GITHUB_EVENT_PATH / EVENT_SOURCE: event payload path (required)
    /// - INPUT_GITHUB_TOKEN / INPUT_GITHUB-TOKEN / GITHUB_TOKEN (required)
    /// - GITHUB_API_URL: REST endpoint (default https://api.github.com)
    /// - INPUT_MODEL / EMBEDDING_MODEL: Hub model id
    /// - EMBEDDING_MODEL_PATH: local model directory, overrides the Hub id
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let threshold = match first_set(&lookup, THRESHOLD_KEYS) {
            Some(raw) => raw.parse::<Threshold>()?,
            None => Threshold::default(),
        };

        // Blank only counts as an error when every spelling that is set is blank
        let duplicate_label = match first_set(&lookup, LABEL_KEYS) {
            Some(label) => label,
            None if lookup_any(&lookup, LABEL_KEYS).is_some() => {
                return Err(DedupError::Config("duplicate label must not be empty".into()))
            }
            None => DEFAULT_DUPLICATE_LABEL.to_string(),
        };

        let repository = first_set(&lookup, REPOSITORY_KEYS)
            .ok_or_else(|| missing(REPOSITORY_KEYS))?
            .parse::<Repository>()?;

        let event_path = first_set(&lookup, EVENT_PATH_KEYS)
            .map(PathBuf::from)
            .ok_or_else(|| missing(EVENT_PATH_KEYS))?;

        let token = first_set(&lookup, TOKEN_KEYS).ok_or_else(|| missing(TOKEN_KEYS))?;

        let api_url = first_set(&lookup, API_URL_KEYS)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let model = match first_set(&lookup, MODEL_PATH_KEYS) {
            Some(path) => ModelSource::Local(PathBuf::from(path)),
            None => ModelSource::Hub {
                repo_id: first_set(&lookup, MODEL_KEYS)
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
        };

        Ok(Self {
            threshold,
            duplicate_label,
            repository,
            event_path,
            token,
            api_url,
            model,
        })
    }
}

/// First key with a non-blank value, trimmed
fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// First key that is present at all, blank or not
fn lookup_any<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| lookup(key))
}

fn missing(keys: &[&str]) -> DedupError {
    DedupError::Config(format!("missing required variable {}", keys.join(" or ")))
}
