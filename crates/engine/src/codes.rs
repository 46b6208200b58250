use std::fmt;

use thiserror::Error;

/// Numeric status returned by every dispatcher entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    Created,
    TargetOnDelayOrOff,
    NoContent,
    NotModified,
    BadRequest,
    NotFound,
    CapacityExceeded,
    InvalidTarget,
    ResourceExhausted,
    InternalError,
    LoopDetected,
}

impl ResultCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::TargetOnDelayOrOff => 203,
            Self::NoContent => 204,
            Self::NotModified => 205,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::CapacityExceeded => 409,
            Self::InvalidTarget => 410,
            Self::ResourceExhausted => 412,
            Self::InternalError => 500,
            Self::LoopDetected => 508,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Created | Self::NotModified)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("job {job_id} has no free capacity")]
    CapacityExceeded { job_id: String },
    #[error("target of job {job_id} rejected the action")]
    InvalidTarget { job_id: String },
    #[error("{subsystem} is disabled or on delay")]
    TargetOnDelayOrOff { subsystem: &'static str },
    #[error("agent {agent} lacks the resource required for its action")]
    ResourceExhausted { agent: String },
    #[error("operation {operation} faulted")]
    Internal { operation: &'static str },
}

impl DispatchError {
    pub fn not_found(what: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> ResultCode {
        match self {
            Self::NotFound { .. } => ResultCode::NotFound,
            Self::CapacityExceeded { .. } => ResultCode::CapacityExceeded,
            Self::InvalidTarget { .. } => ResultCode::InvalidTarget,
            Self::TargetOnDelayOrOff { .. } => ResultCode::TargetOnDelayOrOff,
            Self::ResourceExhausted { .. } => ResultCode::ResourceExhausted,
            Self::Internal { .. } => ResultCode::InternalError,
        }
    }
}

impl From<DispatchError> for ResultCode {
    fn from(error: DispatchError) -> Self {
        error.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_http_style_numbering() {
        assert_eq!(ResultCode::Ok.code(), 200);
        assert_eq!(ResultCode::TargetOnDelayOrOff.code(), 203);
        assert_eq!(ResultCode::NoContent.code(), 204);
        assert_eq!(ResultCode::NotFound.code(), 404);
        assert_eq!(ResultCode::InternalError.code(), 500);
    }

    #[test]
    fn dispatch_errors_map_to_matching_codes() {
        let error = DispatchError::CapacityExceeded {
            job_id: "harvest-src1".to_string(),
        };
        assert_eq!(error.code(), ResultCode::CapacityExceeded);
        assert_eq!(
            DispatchError::not_found("job", "build-1/1-site").code(),
            ResultCode::NotFound
        );
        assert_eq!(
            ResultCode::from(DispatchError::TargetOnDelayOrOff {
                subsystem: "telemetry"
            }),
            ResultCode::TargetOnDelayOrOff
        );
    }
}
