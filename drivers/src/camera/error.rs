use core::fmt;

use crate::hal::camera::HwError;

/// Camera context errors.
///
/// No error leaves the context in a partially committed state; every
/// variant describes a call that was rejected as a whole.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CtxError {
    /// Operation has no binding in the current state.
    InvalidState,
    /// No free request slot. Retry after a completion.
    ResourceExhausted,
    /// Request id is not in the queue the operation expects.
    NotFound,
    /// Malformed or mismatched argument (bad handle, stale request id).
    InvalidArgument,
    /// The hardware manager rejected a configuration payload.
    InvalidConfig,
    /// The device is already acquired.
    AlreadyAcquired,
    /// Requests are still active, or the link is held by someone else.
    Busy,
    /// The hardware manager does not support the query.
    Unsupported,
    /// Error propagated unchanged from the hardware manager.
    Hardware(HwError),
}

pub type CtxResult<T> = Result<T, CtxError>;

impl From<HwError> for CtxError {
    fn from(err: HwError) -> Self {
        CtxError::Hardware(err)
    }
}

impl fmt::Display for CtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtxError::InvalidState => f.write_str("operation not allowed in current state"),
            CtxError::ResourceExhausted => f.write_str("no free request slot"),
            CtxError::NotFound => f.write_str("request not found"),
            CtxError::InvalidArgument => f.write_str("invalid argument"),
            CtxError::InvalidConfig => f.write_str("invalid configuration"),
            CtxError::AlreadyAcquired => f.write_str("device already acquired"),
            CtxError::Busy => f.write_str("device busy"),
            CtxError::Unsupported => f.write_str("not supported by hardware"),
            CtxError::Hardware(err) => fmt::Display::fmt(err, f),
        }
    }
}
