//! Acting on a duplicate decision
//!
//! On `MatchFound` the reporter posts a notice on the triggering issue and
//! then tries to attach the duplicate label. Label attachment is best
//! effort: a missing label or a failed request is logged and recorded in the
//! summary, never returned as an error.

use tracing::{info, warn};

use crate::decision::DecisionOutcome;
use crate::error::{DedupError, Result};
use crate::issue::IssueRecord;
use crate::tracker::IssueTracker;

/// What happened to the duplicate label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    Attached,
    /// Attaching failed; the run still succeeds
    Skipped { reason: String },
    /// Dry run, nothing written
    NotAttempted,
}

/// Writes performed for one match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub comment_posted: bool,
    pub label: LabelOutcome,
}

/// Format a cosine score as a percentage with two decimals
pub fn format_score(score: f32) -> String {
    format!("{:.2}%", score * 100.0)
}

/// Markdown notice posted on the triggering issue
pub fn render_comment(query_author: &str, matched: &IssueRecord, score: f32) -> String {
    format!(
        "Hi @{author}, thanks for the report!\n\
         \n\
         This issue looks very similar to an issue that is already open.\n\
         \n\
         **Possible duplicate:** [{title} (#{number})]({url}) (similarity: {score})\n\
         \n\
         A maintainer will take a look and confirm.\n",
        author = query_author,
        title = matched.display_title(),
        number = matched.number,
        url = matched.url,
        score = format_score(score),
    )
}

/// Posts duplicate notices through an [`IssueTracker`]
pub struct ActionReporter<'a> {
    tracker: &'a dyn IssueTracker,
    label: &'a str,
    dry_run: bool,
}

impl<'a> ActionReporter<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, label: &'a str) -> Self {
        Self {
            tracker,
            label,
            dry_run: false,
        }
    }

    /// Log intended writes instead of performing them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Act on `outcome` for the triggering issue `query`.
    ///
    /// Returns `None` for `NoMatch`. A failed comment is fatal
    /// ([`DedupError::ReportFailure`]); a failed label is not.
    pub async fn report(
        &self,
        query: &IssueRecord,
        outcome: &DecisionOutcome,
    ) -> Result<Option<ReportSummary>> {
        let DecisionOutcome::MatchFound { record, score } = outcome else {
            info!(issue = query.number, "no clear duplicate found");
            return Ok(None);
        };

        info!(
            issue = query.number,
            duplicate_of = record.number,
            score = %format_score(*score),
            "potential duplicate found"
        );

        let comment = render_comment(&query.author, record, *score);

        if self.dry_run {
            info!(issue = query.number, label = self.label, comment = %comment, "dry run: skipping tracker writes");
            return Ok(Some(ReportSummary {
                comment_posted: false,
                label: LabelOutcome::NotAttempted,
            }));
        }

        self.tracker
            .post_comment(query.number, &comment)
            .await
            .map_err(|source| DedupError::ReportFailure {
                issue: query.number,
                source,
            })?;
        info!(issue = query.number, "comment posted");

        let label = self.attach_label_or_warn(query.number).await;

        Ok(Some(ReportSummary {
            comment_posted: true,
            label,
        }))
    }

    /// Label failures are downgraded to a warning
    async fn attach_label_or_warn(&self, issue: u64) -> LabelOutcome {
        match self.tracker.add_label(issue, self.label).await {
            Ok(()) => {
                info!(issue, label = self.label, "label attached");
                LabelOutcome::Attached
            }
            Err(err) => {
                warn!(
                    issue,
                    label = self.label,
                    error = %err,
                    "could not attach label; does it exist in the repository?"
                );
                LabelOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched() -> IssueRecord {
        IssueRecord {
            number: 12,
            title: Some("Login fails on mobile".into()),
            body: None,
            author: "alice".into(),
            url: "https://github.com/octo/widgets/issues/12".into(),
        }
    }

    #[test]
    fn test_format_score_two_decimals() {
        assert_eq!(format_score(0.92), "92.00%");
        assert_eq!(format_score(0.8765), "87.65%");
        assert_eq!(format_score(1.0), "100.00%");
    }

    #[test]
    fn test_comment_mentions_match() {
        let comment = render_comment("bob", &matched(), 0.92);
        assert!(comment.contains("@bob"));
        assert!(comment.contains(
            "[Login fails on mobile (#12)](https://github.com/octo/widgets/issues/12)"
        ));
        assert!(comment.contains("92.00%"));
    }

    #[test]
    fn test_comment_untitled_match() {
        let mut record = matched();
        record.title = None;
        let comment = render_comment("bob", &record, 0.5);
        assert!(comment.contains("[(untitled) (#12)]"));
        assert!(!comment.contains("None"));
    }
}
