//! Issue tracker seam
//!
//! The pipeline reads the open-item list and writes the duplicate notice
//! through [`IssueTracker`]; `dedup-github` provides the GitHub REST
//! implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::issue::TrackerItem;

/// Failures talking to the tracker
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// The request never produced a response
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// The tracker answered with a non-success status
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The listing did not end within the page limit
    #[error("open item listing still incomplete after {pages} pages of {per_page}")]
    Truncated { pages: usize, per_page: usize },
}

/// Read and write access to one repository's issues
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch a single issue by number
    async fn get_issue(&self, number: u64) -> Result<TrackerItem, TrackerError>;

    /// Fetch every open item, pull requests included
    async fn list_open_items(&self) -> Result<Vec<TrackerItem>, TrackerError>;

    /// Post a comment on an issue
    async fn post_comment(&self, number: u64, body: &str) -> Result<(), TrackerError>;

    /// Attach an existing label to an issue
    async fn add_label(&self, number: u64, label: &str) -> Result<(), TrackerError>;
}
