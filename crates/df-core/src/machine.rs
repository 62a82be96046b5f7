use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::job::{Job, JobStatus, Progress};

pub const INITIAL_STEP: &str = "Initializing";
pub const UPLOAD_FAILED: &str = "Upload failed. Please try again.";
pub const PROCESSING_FAILED: &str = "Processing failed";
pub const PROCESSING_TIMED_OUT: &str = "Processing timed out";

/// Status values reported by `GET /status/{id}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Processing,
    Complete,
    Error,
    #[serde(other)]
    Unknown,
}

/// Body of one status poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollUpdate {
    pub status: RemoteStatus,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PollUpdate {
    /// Converts a poll result for `job_id` into the event the machine consumes.
    /// `result_url` is only evaluated for a completed job.
    pub fn into_event(self, job_id: &str, result_url: impl FnOnce(&str) -> String) -> JobEvent {
        let job_id = job_id.to_string();
        match self.status {
            RemoteStatus::Complete => {
                let result_url = result_url(&job_id);
                JobEvent::Completed { job_id, result_url }
            }
            RemoteStatus::Error => JobEvent::Failed {
                job_id,
                message: self.error,
            },
            RemoteStatus::Processing | RemoteStatus::Unknown => JobEvent::Progress {
                job_id,
                step: self.step,
                message: self.message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    UploadStarted,
    UploadSucceeded { job_id: String },
    UploadFailed { message: Option<String> },
    Progress {
        job_id: String,
        step: Option<String>,
        message: Option<String>,
    },
    Completed { job_id: String, result_url: String },
    Failed { job_id: String, message: Option<String> },
    TimedOut { job_id: String },
}

impl JobEvent {
    /// The job this event was produced for, if it is tied to one.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::TimedOut { job_id }
            | Self::UploadSucceeded { job_id } => Some(job_id),
            Self::UploadStarted | Self::UploadFailed { .. } => None,
        }
    }
}

/// Pure transition over (job, event). Returns `None` when the event does not
/// apply to the job in its current state, which covers stale poll results,
/// results for a previous job and anything after a terminal state.
pub fn transition(job: &Job, event: &JobEvent, now: DateTime<Utc>) -> Option<Job> {
    match (job.status, event) {
        (JobStatus::Uploading, JobEvent::UploadStarted) => None,
        (_, JobEvent::UploadStarted) => Some(Job {
            status: JobStatus::Uploading,
            created_at: Some(now),
            ..Job::default()
        }),

        (JobStatus::Uploading, JobEvent::UploadSucceeded { job_id }) if !job_id.is_empty() => {
            Some(Job {
                id: Some(job_id.clone()),
                status: JobStatus::Processing,
                progress: Progress {
                    step: Some(INITIAL_STEP.to_string()),
                    message: String::new(),
                },
                ..job.clone()
            })
        }
        (JobStatus::Uploading, JobEvent::UploadFailed { message }) => Some(Job {
            status: JobStatus::Error,
            error: Some(message.clone().unwrap_or_else(|| UPLOAD_FAILED.to_string())),
            finished_at: Some(now),
            ..job.clone()
        }),

        (JobStatus::Processing, JobEvent::Progress { job_id, step, message })
            if job.is_current(job_id) =>
        {
            Some(Job {
                progress: Progress {
                    step: step.clone(),
                    message: message.clone().unwrap_or_default(),
                },
                ..job.clone()
            })
        }
        (JobStatus::Processing, JobEvent::Completed { job_id, result_url })
            if job.is_current(job_id) =>
        {
            Some(Job {
                status: JobStatus::Complete,
                result_url: Some(result_url.clone()),
                finished_at: Some(now),
                ..job.clone()
            })
        }
        (JobStatus::Processing, JobEvent::Failed { job_id, message }) if job.is_current(job_id) => {
            let message = message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| PROCESSING_FAILED.to_string());
            Some(Job {
                status: JobStatus::Error,
                error: Some(message),
                finished_at: Some(now),
                ..job.clone()
            })
        }
        (JobStatus::Processing, JobEvent::TimedOut { job_id }) if job.is_current(job_id) => {
            Some(Job {
                status: JobStatus::Error,
                error: Some(PROCESSING_TIMED_OUT.to_string()),
                finished_at: Some(now),
                ..job.clone()
            })
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[JobEvent]) -> Job {
        events.iter().fold(Job::default(), |job, e| {
            transition(&job, e, Utc::now()).unwrap_or(job)
        })
    }

    fn processing(id: &str) -> Job {
        run(&[
            JobEvent::UploadStarted,
            JobEvent::UploadSucceeded { job_id: id.into() },
        ])
    }

    #[test]
    fn test_upload_moves_to_processing() {
        let job = processing("abc123");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.id.as_deref(), Some("abc123"));
        assert_eq!(job.progress.step.as_deref(), Some(INITIAL_STEP));
        assert!(job.result_url.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_upload_failure_uses_generic_message() {
        let job = run(&[JobEvent::UploadStarted, JobEvent::UploadFailed { message: None }]);
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some(UPLOAD_FAILED));
        assert!(job.id.is_none());
    }

    #[test]
    fn test_second_upload_start_while_uploading_is_rejected() {
        let job = run(&[JobEvent::UploadStarted]);
        assert!(transition(&job, &JobEvent::UploadStarted, Utc::now()).is_none());
    }

    #[test]
    fn test_empty_job_id_is_not_accepted() {
        let job = run(&[JobEvent::UploadStarted]);
        let event = JobEvent::UploadSucceeded { job_id: String::new() };
        assert!(transition(&job, &event, Utc::now()).is_none());
    }

    #[test]
    fn test_progress_then_complete() {
        let job = processing("abc123");
        let job = transition(&job, &JobEvent::Progress {
            job_id: "abc123".into(),
            step: Some("Estimating depth".into()),
            message: Some("running depth model".into()),
        }, Utc::now()).unwrap();
        assert_eq!(job.progress.step.as_deref(), Some("Estimating depth"));
        assert_eq!(job.progress.message, "running depth model");

        let job = transition(&job, &JobEvent::Completed {
            job_id: "abc123".into(),
            result_url: "http://x/result/abc123".into(),
        }, Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.result_url.as_deref(), Some("http://x/result/abc123"));
        assert!(job.error.is_none());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_first_terminal_result_wins() {
        let job = processing("abc123");
        let done = transition(&job, &JobEvent::Completed {
            job_id: "abc123".into(),
            result_url: "u".into(),
        }, Utc::now()).unwrap();

        let late = [
            JobEvent::Failed { job_id: "abc123".into(), message: Some("late".into()) },
            JobEvent::Progress { job_id: "abc123".into(), step: None, message: None },
            JobEvent::Completed { job_id: "abc123".into(), result_url: "other".into() },
        ];
        for e in &late {
            assert!(transition(&done, e, Utc::now()).is_none(), "{e:?} should be ignored");
        }
    }

    #[test]
    fn test_events_for_previous_job_are_ignored() {
        let job = processing("new");
        let stale = JobEvent::Completed { job_id: "old".into(), result_url: "u".into() };
        assert!(transition(&job, &stale, Utc::now()).is_none());
    }

    #[test]
    fn test_backend_error_message() {
        let job = processing("j");
        let failed = transition(&job, &JobEvent::Failed {
            job_id: "j".into(),
            message: Some("X".into()),
        }, Utc::now()).unwrap();
        assert_eq!(failed.status, JobStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("X"));
        assert!(failed.result_url.is_none());

        let defaulted = transition(&job, &JobEvent::Failed {
            job_id: "j".into(),
            message: None,
        }, Utc::now()).unwrap();
        assert_eq!(defaulted.error.as_deref(), Some(PROCESSING_FAILED));
    }

    #[test]
    fn test_new_upload_after_terminal_starts_fresh_job() {
        let job = processing("first");
        let job = transition(&job, &JobEvent::Failed { job_id: "first".into(), message: None }, Utc::now()).unwrap();
        let job = transition(&job, &JobEvent::UploadStarted, Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Uploading);
        assert!(job.id.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_poll_update_parsing() {
        let update: PollUpdate = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(update.status, RemoteStatus::Error);
        assert_eq!(
            update.into_event("j", |_| unreachable!()),
            JobEvent::Failed { job_id: "j".into(), message: None }
        );

        let update: PollUpdate = serde_json::from_str(r#"{"status":"queued","message":"waiting"}"#).unwrap();
        assert_eq!(update.status, RemoteStatus::Unknown);

        let update: PollUpdate = serde_json::from_str(r#"{"status":"complete"}"#).unwrap();
        assert_eq!(
            update.into_event("abc", |id| format!("base/result/{id}")),
            JobEvent::Completed { job_id: "abc".into(), result_url: "base/result/abc".into() }
        );
    }
}
