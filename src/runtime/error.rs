use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Index {index} is out of range for a collection of size {size}")]
    IndexOutOfRange { index: i64, size: usize },
    #[error("No input left to read into `{target}`")]
    MissingInput { target: String },
    #[error("Cannot read `{token}` as {expected}")]
    InvalidInput { token: String, expected: String },
    #[error("Object of class `{class}` has no member `{member}`")]
    ObjectTypeMismatch { class: String, member: String },
    #[error("Cannot remove index {index} from a list of size {size}")]
    RemoveFailed { index: i64, size: usize },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot convert `{value}` to {target}")]
    InvalidCast { value: String, target: String },
    #[error("No object: {context} on a void reference")]
    NoObject { context: String },
    #[error("Call depth exceeded the limit of {limit}")]
    CallDepthExceeded { limit: usize },
    #[error("Program stopped")]
    Stopped,
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RuntimeError {
    pub fn code(&self) -> u16 {
        match self {
            RuntimeError::IndexOutOfRange { .. } => 401,
            RuntimeError::MissingInput { .. } => 402,
            RuntimeError::InvalidInput { .. } => 403,
            RuntimeError::ObjectTypeMismatch { .. } => 404,
            RuntimeError::RemoveFailed { .. } => 405,
            RuntimeError::DivisionByZero => 406,
            RuntimeError::InvalidCast { .. } => 407,
            RuntimeError::NoObject { .. } => 408,
            RuntimeError::CallDepthExceeded { .. } => 409,
            RuntimeError::Stopped => 410,
            RuntimeError::Internal { .. } => 499,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal {
            message: message.into(),
        }
    }
}
