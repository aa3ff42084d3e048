use og_config::GuardConfigError;
use og_coord::StoreError;
use og_spoof::InputRejection;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardError {
    /// Invalid thresholds at construction.
    Config(GuardConfigError),
    /// The call was rejected before touching any state.
    MalformedInput(InputRejection),
    /// A call whose only purpose is a store write could not complete.
    Store(StoreError),
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Config(e) => write!(f, "{e}"),
            GuardError::MalformedInput(r) => write!(f, "{r}"),
            GuardError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::Config(e) => Some(e),
            GuardError::MalformedInput(r) => Some(r),
            GuardError::Store(e) => Some(e),
        }
    }
}

impl From<GuardConfigError> for GuardError {
    fn from(e: GuardConfigError) -> Self {
        GuardError::Config(e)
    }
}

impl From<InputRejection> for GuardError {
    fn from(r: InputRejection) -> Self {
        GuardError::MalformedInput(r)
    }
}

impl From<StoreError> for GuardError {
    fn from(e: StoreError) -> Self {
        GuardError::Store(e)
    }
}
