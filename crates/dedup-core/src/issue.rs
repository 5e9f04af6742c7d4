use serde::{Deserialize, Serialize};

/// An issue as fetched from the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: String,
    pub url: String,
}

impl IssueRecord {
    /// Text used for embedding: title and body joined by one space, with an
    /// absent field contributing an empty string.
    pub fn comparison_text(&self) -> String {
        format!(
            "{} {}",
            self.title.as_deref().unwrap_or(""),
            self.body.as_deref().unwrap_or("")
        )
    }

    /// Title for display in comments
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "(untitled)",
        }
    }
}

/// One entry of the tracker's open-item listing.
///
/// Trackers such as GitHub return pull requests through the issue API, so
/// each item records whether it is really a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerItem {
    pub record: IssueRecord,
    pub is_pull_request: bool,
}

impl TrackerItem {
    pub fn issue(record: IssueRecord) -> Self {
        Self {
            record,
            is_pull_request: false,
        }
    }

    pub fn pull_request(record: IssueRecord) -> Self {
        Self {
            record,
            is_pull_request: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: Option<&str>, body: Option<&str>) -> IssueRecord {
        IssueRecord {
            number: 1,
            title: title.map(String::from),
            body: body.map(String::from),
            author: "octocat".into(),
            url: "https://github.com/octo/widgets/issues/1".into(),
        }
    }

    #[test]
    fn test_comparison_text_joins_with_space() {
        let r = record(Some("Login fails"), Some("on mobile"));
        assert_eq!(r.comparison_text(), "Login fails on mobile");
    }

    #[test]
    fn test_absent_body_becomes_empty() {
        let r = record(Some("Crash on startup"), None);
        assert_eq!(r.comparison_text(), "Crash on startup ");
    }

    #[test]
    fn test_absent_title_becomes_empty() {
        let r = record(None, Some("details"));
        assert_eq!(r.comparison_text(), " details");
    }

    #[test]
    fn test_both_absent() {
        let r = record(None, None);
        assert_eq!(r.comparison_text(), " ");
        assert!(!r.comparison_text().contains("None"));
    }

    #[test]
    fn test_display_title_fallback() {
        assert_eq!(record(None, None).display_title(), "(untitled)");
        assert_eq!(record(Some("  "), None).display_title(), "(untitled)");
        assert_eq!(record(Some("Bug"), None).display_title(), "Bug");
    }
}
