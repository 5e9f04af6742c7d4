//! GitHub REST tracker for dedup
//!
//! Implements `dedup_core::IssueTracker` over the GitHub REST API with
//! pagination of the open-item listing and retry of rate-limited or
//! server-failed requests.

pub mod client;
pub mod models;
pub mod retry;

pub use client::{GitHubTracker, MAX_PAGES, PER_PAGE};
pub use models::{ApiIssue, ApiUser, GHOST_LOGIN};
pub use retry::{Replay, RetryPolicy};
