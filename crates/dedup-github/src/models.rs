//! GitHub REST response shapes

use dedup_core::{IssueRecord, TrackerItem};
use serde::{Deserialize, Serialize};

/// Login used when the author account has been deleted
pub const GHOST_LOGIN: &str = "ghost";

/// An entry from `GET /repos/{owner}/{repo}/issues`
///
/// The endpoint returns pull requests too; those carry a `pull_request`
/// object.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssue {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<ApiUser>,
    pub html_url: String,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub login: String,
}

impl ApiIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

impl From<ApiIssue> for TrackerItem {
    fn from(issue: ApiIssue) -> Self {
        let is_pull_request = issue.is_pull_request();
        TrackerItem {
            record: IssueRecord {
                number: issue.number,
                title: issue.title,
                body: issue.body,
                author: issue
                    .user
                    .map(|user| user.login)
                    .unwrap_or_else(|| GHOST_LOGIN.to_string()),
                url: issue.html_url,
            },
            is_pull_request,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentRequest<'a> {
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LabelsRequest<'a> {
    pub labels: [&'a str; 1],
}
