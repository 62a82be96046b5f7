pub mod bounds;
pub mod error;
pub mod job;
pub mod machine;

pub use bounds::{Aabb, Normalization, TARGET_SIZE};
pub use error::{Error, Result};
pub use job::{Job, JobStatus, Progress, Step, StepState};
pub use machine::{JobEvent, PollUpdate, RemoteStatus, transition};
