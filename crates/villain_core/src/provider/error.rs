//! Provider-level failure taxonomy.

use crate::repo::villain_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure kinds surfaced by `VillainProvider`.
///
/// `InvalidLocator`, `IllegalOperation` and `InvalidArgument` are caller
/// errors and must not be retried. `StorageFault` carries the store error
/// unchanged.
#[derive(Debug)]
pub enum ProviderError {
    /// Locator is malformed or matches no registered pattern.
    InvalidLocator(String),
    /// Locator kind does not support the requested verb.
    IllegalOperation {
        operation: &'static str,
        locator: String,
        reason: &'static str,
    },
    /// Required payload is absent or carries an invalid value.
    InvalidArgument(String),
    /// Store engine failure.
    StorageFault(RepoError),
}

impl ProviderError {
    /// Whether the failure comes from the environment rather than the caller.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Self::StorageFault(_))
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLocator(locator) => write!(f, "unknown locator: {locator}"),
            Self::IllegalOperation {
                operation,
                locator,
                reason,
            } => write!(f, "illegal {operation} on {locator}: {reason}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::StorageFault(err) => write!(f, "storage fault: {err}"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFault(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ProviderError {
    fn from(value: RepoError) -> Self {
        Self::StorageFault(value)
    }
}
