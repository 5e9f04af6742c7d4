//! GitHub REST client implementing [`IssueTracker`]

use std::future::Future;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use async_trait::async_trait;
use dedup_core::{DetectorConfig, IssueTracker, Repository, TrackerError, TrackerItem};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::models::{ApiIssue, CommentRequest, LabelsRequest};
use crate::retry::{is_retryable_error, retry_after, should_retry_status, Replay, RetryPolicy};

/// Items per listing page (GitHub maximum)
pub const PER_PAGE: usize = 100;

/// Page limit for the open-item listing.
///
/// A repository with more open items than this fails the listing rather
/// than yielding a partial corpus.
pub const MAX_PAGES: usize = 50;

const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Issue tracker backed by the GitHub REST API
pub struct GitHubTracker {
    client: Client,
    api_url: String,
    repository: Repository,
    retry: RetryPolicy,
}

impl GitHubTracker {
    /// Build a client for `repository` authenticated with `token`
    pub fn new(api_url: &str, token: &str, repository: Repository) -> anyhow::Result<Self> {
        anyhow::ensure!(!token.trim().is_empty(), "missing GitHub token");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("invalid GitHub token")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("dedup-action/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("failed to build GitHub HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repository,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &DetectorConfig) -> anyhow::Result<Self> {
        Self::new(&config.api_url, &config.token, config.repository.clone())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// `{api}/repos/{owner}/{name}{path}`
    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_url, self.repository.owner, self.repository.name, path
        )
    }

    fn list_url(&self, page: usize) -> String {
        self.repo_url(&format!(
            "/issues?state=open&per_page={}&page={}",
            PER_PAGE, page
        ))
    }

    /// Send a request, retrying transient failures per the policy.
    ///
    /// `replay` decides which failures are safe to retry; a server-sent
    /// `Retry-After` or rate-limit reset replaces the computed backoff.
    async fn execute<F>(&self, url: &str, replay: Replay, build: F) -> Result<Response, TrackerError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let hint = retry_after(response.headers(), SystemTime::now());
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());

                    if should_retry_status(status, replay) && self.retry.allows_retry(attempts) {
                        let delay = self.retry.delay(attempts, hint);
                        warn!(url, status, attempt = attempts, ?delay, "retrying GitHub request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(TrackerError::Status {
                        url: url.to_string(),
                        status,
                        body: condense(&body),
                    });
                }
                Err(err) => {
                    if is_retryable_error(&err, replay) && self.retry.allows_retry(attempts) {
                        let delay = self.retry.backoff(attempts);
                        warn!(url, error = %err, attempt = attempts, ?delay, "retrying GitHub request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(TrackerError::Http {
                        url: url.to_string(),
                        message: err.without_url().to_string(),
                    });
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TrackerError> {
        let response = self
            .execute(url, Replay::Safe, || self.client.get(url))
            .await?;
        response.json().await.map_err(|err| TrackerError::Decode {
            url: url.to_string(),
            message: err.without_url().to_string(),
        })
    }

    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        replay: Replay,
        body: &B,
    ) -> Result<(), TrackerError> {
        self.execute(url, replay, || self.client.post(url).json(body))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    #[instrument(skip(self), fields(repo = %self.repository))]
    async fn get_issue(&self, number: u64) -> Result<TrackerItem, TrackerError> {
        let url = self.repo_url(&format!("/issues/{}", number));
        let issue: ApiIssue = self.get_json(&url).await?;
        Ok(issue.into())
    }

    #[instrument(skip(self), fields(repo = %self.repository))]
    async fn list_open_items(&self) -> Result<Vec<TrackerItem>, TrackerError> {
        let issues = collect_pages(MAX_PAGES, PER_PAGE, |page| async move {
            let url = self.list_url(page);
            self.get_json::<Vec<ApiIssue>>(&url).await
        })
        .await?;

        Ok(issues.into_iter().map(TrackerItem::from).collect())
    }

    #[instrument(skip(self, body), fields(repo = %self.repository))]
    async fn post_comment(&self, number: u64, body: &str) -> Result<(), TrackerError> {
        let url = self.repo_url(&format!("/issues/{}/comments", number));
        self.post_json(&url, Replay::Unsafe, &CommentRequest { body })
            .await
    }

    #[instrument(skip(self), fields(repo = %self.repository))]
    async fn add_label(&self, number: u64, label: &str) -> Result<(), TrackerError> {
        let url = self.repo_url(&format!("/issues/{}/labels", number));
        self.post_json(&url, Replay::Safe, &LabelsRequest { labels: [label] })
            .await
    }
}

/// Fetch pages 1, 2, ... until one comes back shorter than `per_page`.
///
/// Fails with [`TrackerError::Truncated`] if page `max_pages` is still full.
async fn collect_pages<T, F, Fut>(
    max_pages: usize,
    per_page: usize,
    mut fetch: F,
) -> Result<Vec<T>, TrackerError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, TrackerError>>,
{
    let mut items = Vec::new();

    for page in 1..=max_pages {
        let batch = fetch(page).await?;
        let count = batch.len();
        items.extend(batch);

        if count < per_page {
            debug!(pages = page, items = items.len(), "listed open items");
            return Ok(items);
        }
    }

    Err(TrackerError::Truncated {
        pages: max_pages,
        per_page,
    })
}

/// Collapse an error body to one bounded line
fn condense(body: &str) -> String {
    let line = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= MAX_ERROR_BODY_CHARS {
        return line;
    }
    let mut truncated: String = line.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tracker(api_url: &str) -> GitHubTracker {
        let repository = "octo/widgets".parse().unwrap();
        GitHubTracker::new(api_url, "ghp_test", repository).unwrap()
    }

    #[test]
    fn test_repo_urls() {
        let tracker = tracker("https://api.github.com/");
        assert_eq!(
            tracker.repo_url("/issues/12/comments"),
            "https://api.github.com/repos/octo/widgets/issues/12/comments"
        );
        assert_eq!(
            tracker.list_url(2),
            "https://api.github.com/repos/octo/widgets/issues?state=open&per_page=100&page=2"
        );
    }

    #[test]
    fn test_enterprise_api_url() {
        let tracker = tracker("https://ghe.example.com/api/v3");
        assert_eq!(
            tracker.repo_url("/issues/1"),
            "https://ghe.example.com/api/v3/repos/octo/widgets/issues/1"
        );
    }

    #[test]
    fn test_rejects_blank_token() {
        let repository = "octo/widgets".parse().unwrap();
        assert!(GitHubTracker::new("https://api.github.com", "  ", repository).is_err());
    }

    #[test]
    fn test_rejects_token_with_control_characters() {
        let repository = "octo/widgets".parse().unwrap();
        assert!(GitHubTracker::new("https://api.github.com", "abc\ndef", repository).is_err());
    }

    fn page(len: usize) -> Result<Vec<usize>, TrackerError> {
        Ok((0..len).collect())
    }

    #[tokio::test]
    async fn test_pages_stop_at_short_page() {
        let sizes = [100, 100, 37];
        let mut requested = Vec::new();

        let items = collect_pages(MAX_PAGES, PER_PAGE, |n| {
            requested.push(n);
            std::future::ready(page(sizes[n - 1]))
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 237);
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_empty_page() {
        let sizes = [100, 0];
        let mut calls = 0;

        let items = collect_pages(MAX_PAGES, PER_PAGE, |n| {
            calls += 1;
            std::future::ready(page(sizes[n - 1]))
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 100);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_full_last_page_is_truncation_error() {
        let mut calls = 0;

        let err = collect_pages(3, 10, |_| {
            calls += 1;
            std::future::ready(page(10))
        })
        .await
        .unwrap_err();

        assert_eq!(
            err,
            TrackerError::Truncated {
                pages: 3,
                per_page: 10
            }
        );
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_page_error_stops_listing() {
        let mut calls = 0;

        let err = collect_pages(MAX_PAGES, PER_PAGE, |n| {
            calls += 1;
            std::future::ready(if n == 2 {
                Err(TrackerError::Status {
                    url: "page2".into(),
                    status: 500,
                    body: String::new(),
                })
            } else {
                page(PER_PAGE)
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TrackerError::Status { status: 500, .. }));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_condense_error_body() {
        assert_eq!(
            condense("{\n  \"message\": \"Not Found\",\n  \"status\": \"404\"\n}"),
            r#"{ "message": "Not Found", "status": "404" }"#
        );

        let long = "x".repeat(1000);
        let condensed = condense(&long);
        assert!(condensed.ends_with("..."));
        assert_eq!(condensed.chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }
}
