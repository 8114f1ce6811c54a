use std::fmt::{Display, Formatter};
use std::sync::PoisonError;

use config::ConfigError;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

// All except Internal are considered caller-facing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    Internal(String),
    Value(String),
    Io(String),
    NoAvailableFrame,
}

impl Error {
    pub fn internal<E: ToString>(msg: E) -> Error {
        Error::Internal(msg.to_string())
    }

    pub fn value<E: ToString>(msg: E) -> Error {
        Error::Value(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoAvailableFrame => {
                write!(f, "All frames are pinned, no frame available")
            }
            Error::Internal(s) | Error::Value(s) | Error::Io(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::internal(err)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::internal(err)
    }
}
