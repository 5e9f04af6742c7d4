//! Trigger event payload parsing

use serde::Deserialize;
use std::path::Path;

use crate::error::{DedupError, Result};

/// The event that started a run; only the issue number is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub issue_number: u64,
}

#[derive(Deserialize)]
struct RawEvent {
    issue: RawIssue,
}

#[derive(Deserialize)]
struct RawIssue {
    number: u64,
}

impl TriggerEvent {
    /// Read and parse the event file at `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DedupError::Payload(format!("cannot read {}: {}", path.display(), e))
        })?;

        Self::from_json(&raw)
            .map_err(|e| DedupError::Payload(format!("{} in {}", e, path.display())))
    }

    /// Parse an event document; the error carries the serde message only
    fn from_json(raw: &str) -> std::result::Result<Self, String> {
        let event: RawEvent = serde_json::from_str(raw).map_err(|e| e.to_string())?;

        if event.issue.number == 0 {
            return Err("issue.number must be positive".to_string());
        }

        Ok(Self {
            issue_number: event.issue.number,
        })
    }
}
