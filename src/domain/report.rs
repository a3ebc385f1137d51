use crate::domain::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline run state. `Done` and `PartialFailure` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    FetchingAll,
    Normalizing,
    Reconciling,
    Persisting,
    Done,
    PartialFailure,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::PartialFailure)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::FetchingAll => "fetching_all",
            RunState::Normalizing => "normalizing",
            RunState::Reconciling => "reconciling",
            RunState::Persisting => "persisting",
            RunState::Done => "done",
            RunState::PartialFailure => "partial_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSubject {
    TitleKey(String),
    Platform(Platform),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub subject: FailureSubject,
    pub reason: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub succeeded: usize,
    pub failed: Vec<Failure>,
    pub offers_fetched: usize,
    pub offers_normalized: usize,
    pub listings_unchanged: usize,
    pub offers_marked_stale: usize,
    #[serde(default)]
    pub details_fetched: usize,
    #[serde(default)]
    pub non_games_dropped: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            succeeded: 0,
            failed: Vec::new(),
            offers_fetched: 0,
            offers_normalized: 0,
            listings_unchanged: 0,
            offers_marked_stale: 0,
            details_fetched: 0,
            non_games_dropped: 0,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_failure(
        &mut self,
        subject: FailureSubject,
        reason: &str,
        detail: impl ToString,
    ) {
        self.failed.push(Failure {
            subject,
            reason: reason.to_string(),
            detail: detail.to_string(),
        });
    }

    pub fn platform_failed(&self, platform: Platform) -> bool {
        self.failed
            .iter()
            .any(|f| f.subject == FailureSubject::Platform(platform))
    }

    pub fn title_failed(&self, title_key: &str) -> bool {
        self.failed
            .iter()
            .any(|f| matches!(&f.subject, FailureSubject::TitleKey(k) if k == title_key))
    }

    /// Settles the terminal state from the recorded failures.
    pub fn finish(&mut self) {
        self.state = if self.failed.is_empty() {
            RunState::Done
        } else {
            RunState::PartialFailure
        };
        self.finished_at = Some(Utc::now());
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
