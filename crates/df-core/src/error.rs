use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("model has no vertices")]
    EmptyModel,
    #[error("model bounds are degenerate (largest dimension {0})")]
    DegenerateBounds(f32),
}

pub type Result<T> = std::result::Result<T, Error>;
