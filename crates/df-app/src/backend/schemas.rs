use serde::{Deserialize, Serialize};

pub use df_core::PollUpdate as JobStatusResponse;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCreateResponse {
    pub job_id: String,
}
