use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one conversion request as seen by the client.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Uploading,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }

    /// `Complete` and `Error` end a job; only a new upload leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn icon(&self) -> &str {
        match self {
            Self::Idle => "·",
            Self::Uploading => "📤",
            Self::Processing => "⚡",
            Self::Complete => "✅",
            Self::Error => "❌",
        }
    }
}

/// Named backend pipeline steps, in the order the backend runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Uploading,
    EstimatingDepth,
    BuildingMesh,
    ApplyingTexture,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Self::Uploading,
        Self::EstimatingDepth,
        Self::BuildingMesh,
        Self::ApplyingTexture,
    ];

    /// Label as reported by the backend in the `step` field
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uploading => "Uploading",
            Self::EstimatingDepth => "Estimating depth",
            Self::BuildingMesh => "Building 3D mesh",
            Self::ApplyingTexture => "Applying texture",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    pub fn rank(&self) -> usize {
        *self as usize
    }

    /// Display state of `self` given the step the backend is currently on.
    /// An unknown or unset current step counts as not yet reached.
    pub fn state_relative_to(&self, current: Option<Step>) -> StepState {
        let Some(current) = current else {
            return StepState::Pending;
        };

        match self.rank().cmp(&current.rank()) {
            std::cmp::Ordering::Less => StepState::Complete,
            std::cmp::Ordering::Equal => StepState::Active,
            std::cmp::Ordering::Greater => StepState::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Complete,
    Active,
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Raw step label; may name a step outside [`Step::ALL`] (e.g. "Initializing").
    pub step: Option<String>,
    pub message: String,
}

impl Progress {
    pub fn current_step(&self) -> Option<Step> {
        self.step.as_deref().and_then(Step::from_label)
    }

    pub fn step_states(&self) -> [(Step, StepState); 4] {
        let current = self.current_step();
        Step::ALL.map(|s| (s, s.state_relative_to(current)))
    }
}

/// One conversion request. Only [`crate::machine::transition`] produces new values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Option<String>,
    pub status: JobStatus,
    pub progress: Progress,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Seconds between upload start and the terminal transition, if both happened.
    pub fn elapsed_secs(&self) -> Option<i64> {
        match (self.created_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }

    pub fn is_current(&self, job_id: &str) -> bool {
        self.id.as_deref() == Some(job_id)
    }
}
