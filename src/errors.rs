use thiserror::Error;

/// Error taxonomy for the engine's construction, I/O and compile paths.
///
/// Per-step execution (forward/backward/update) is infallible by
/// construction once a network has compiled: every precondition that could
/// fail is checked here, at the boundary, not inside the hot loop.
#[derive(Error, Debug)]
pub enum GPError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("allocation failed: {0}")]
    FailedAlloc(String),

    #[error("accelerator allocation failed: {0}")]
    AcceleratorAlloc(String),

    #[error("internal invariant violated: {0}")]
    InternalError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type GPResult<T> = Result<T, GPError>;

impl GPError {
    pub fn incompatible_shapes(expected: &[usize], found: &[usize]) -> Self {
        GPError::InvalidParameter(format!(
            "incompatible shapes: expected {:?}, found {:?}",
            expected, found
        ))
    }

    pub fn unknown_tensor(name: &str) -> Self {
        GPError::InvalidParameter(format!("unknown tensor name {:?}", name))
    }
}
