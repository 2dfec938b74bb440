//! Publishing reports to an issue tracker
//!
//! Publishing is idempotent per period: the report's idempotency key is
//! embedded in the issue body, and the tracker is searched for it before
//! anything is created. Local state is never touched here.

mod linear;

pub use linear::LinearClient;

use crate::config::{PublishConfig, TrackerProvider};
use crate::error::Result;
use crate::types::{IdempotencyKey, IssueId, Report};

/// Remote issue tracker.
pub trait IssueTracker: Send + Sync {
    /// Find an issue whose body carries `key`.
    fn find_issue(&self, key: &IdempotencyKey) -> Result<Option<IssueId>>;

    /// Create a new issue. `body` already contains `key`.
    fn create_issue(&self, title: &str, body: &str, key: &IdempotencyKey) -> Result<IssueId>;

    /// Return the existing issue for `key`, creating it when absent.
    fn find_or_create_issue(
        &self,
        title: &str,
        body: &str,
        key: &IdempotencyKey,
    ) -> Result<IssueId> {
        if let Some(existing) = self.find_issue(key)? {
            tracing::info!(key = %key, issue = %existing.id, "Issue already published");
            return Ok(existing);
        }
        let created = self.create_issue(title, body, key)?;
        tracing::info!(key = %key, issue = %created.id, "Issue created");
        Ok(created)
    }
}

/// Create the tracker client for the configured provider.
pub fn create_tracker(config: &PublishConfig) -> Result<Box<dyn IssueTracker>> {
    match config.provider {
        TrackerProvider::Linear => Ok(Box::new(LinearClient::new(config)?)),
    }
}

/// Issue body: the rendered report followed by the key footer.
pub fn issue_body(report: &Report, key: &IdempotencyKey) -> String {
    format!(
        "{}\n---\nweeknotes idempotency key: {}\n",
        report.to_markdown(),
        key
    )
}

/// Publish `report` under `key`, returning the remote issue.
pub fn publish(report: &Report, key: &IdempotencyKey, tracker: &dyn IssueTracker) -> Result<IssueId> {
    let body = issue_body(report, key);
    tracker.find_or_create_issue(&report.title(), &body, key)
}
