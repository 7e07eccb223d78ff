//! Detection job tracking and its state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{JobId, MediaId};

/// Lifecycle state of a detection job.
///
/// ```text
/// Pending -> Submitted -> Polling -> {Succeeded | Failed | TimedOut}
/// ```
///
/// `Abandoned` is entered from any non-terminal state when the media backing
/// the job has been withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Not yet accepted by the backend
    #[default]
    Pending,
    /// Backend accepted the job
    Submitted,
    /// Last poll reported "in progress"
    Polling,
    /// Backend completed and results were fetched
    Succeeded,
    /// Backend reported an error, or submission/fetch failed permanently
    Failed,
    /// Timeout ceiling or poll budget exhausted
    TimedOut,
    /// Source media was withdrawn while the job was in flight
    Abandoned,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Abandoned => "abandoned",
        }
    }

    /// Check if this is a terminal state (no more transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Abandoned
        )
    }

    /// Terminal states that must be surfaced to the alerting sink.
    pub fn is_alerting(&self) -> bool {
        matches!(self, JobState::Failed | JobState::TimedOut)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Submitted | Failed | Abandoned) => true,
            (Submitted | Polling, Polling | Succeeded | Failed | TimedOut | Abandoned) => true,
            // Results fetched but the index commit could not be made durable
            (Succeeded, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// One unit of detection work tracked by the job manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionJob {
    /// Backend-assigned ID, present once submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,

    /// Media being analysed
    pub media_id: MediaId,

    /// Current state
    pub state: JobState,

    /// When the backend accepted the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    /// When the backend was last polled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,

    /// Number of polls performed
    pub attempts: u32,

    /// Terminal error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionJob {
    pub fn new(media_id: MediaId) -> Self {
        Self {
            job_id: None,
            media_id,
            state: JobState::Pending,
            submitted_at: None,
            last_polled_at: None,
            attempts: 0,
            error: None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record backend acceptance.
    pub fn mark_submitted(&mut self, job_id: JobId) -> Result<(), TransitionError> {
        self.transition(JobState::Submitted)?;
        self.job_id = Some(job_id);
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    /// Record one poll against the backend.
    pub fn record_poll(&mut self) {
        self.attempts += 1;
        self.last_polled_at = Some(Utc::now());
    }

    /// Move to a terminal state with an error reason.
    pub fn finish_with_error(
        &mut self,
        state: JobState,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.transition(state)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Job id as a string for logging; empty before submission.
    pub fn job_id_str(&self) -> &str {
        self.job_id.as_ref().map(|id| id.as_str()).unwrap_or("")
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut job = DetectionJob::new(MediaId::from_string("m"));
        job.mark_submitted(JobId::from_string("j")).unwrap();
        job.transition(JobState::Polling).unwrap();
        job.transition(JobState::Polling).unwrap();
        job.transition(JobState::Succeeded).unwrap();
        assert!(job.is_terminal());
        assert_eq!(job.job_id_str(), "j");
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Abandoned,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(JobState::Polling));
            assert!(!terminal.can_transition_to(JobState::Succeeded));
        }
    }

    #[test]
    fn test_pending_cannot_succeed_or_time_out() {
        let mut job = DetectionJob::new(MediaId::from_string("m"));
        let err = job.transition(JobState::Succeeded).unwrap_err();
        assert_eq!(err.from, JobState::Pending);
        assert!(!JobState::Pending.can_transition_to(JobState::TimedOut));
        assert!(JobState::Pending.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_commit_failure_escalates_success() {
        let mut job = DetectionJob::new(MediaId::from_string("m"));
        job.mark_submitted(JobId::from_string("j")).unwrap();
        job.transition(JobState::Succeeded).unwrap();
        job.finish_with_error(JobState::Failed, "index write failed").unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(!JobState::Failed.can_transition_to(JobState::Succeeded));
    }

    #[test]
    fn test_finish_with_error_records_reason() {
        let mut job = DetectionJob::new(MediaId::from_string("m"));
        job.mark_submitted(JobId::from_string("j")).unwrap();
        job.finish_with_error(JobState::TimedOut, "poll ceiling").unwrap();
        assert_eq!(job.state, JobState::TimedOut);
        assert_eq!(job.error.as_deref(), Some("poll ceiling"));
        assert!(job.state.is_alerting());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&JobState::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
