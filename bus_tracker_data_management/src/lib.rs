use std::fmt;

use bus_tracker_lib::TrackerError;

pub mod fleet;
pub mod store;
mod data_manager;
mod sample_data;

pub use data_manager::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataManagerError {
    NotFound(String),
    Invalid(String),
}

impl fmt::Display for DataManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataManagerError::NotFound(what) => write!(f, "Not found: {what}"),
            DataManagerError::Invalid(msg) => write!(f, "Invalid input: {msg}"),
        }
    }
}

impl std::error::Error for DataManagerError {}

impl From<TrackerError> for DataManagerError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::NotFound(what) => DataManagerError::NotFound(what),
            other => DataManagerError::Invalid(other.to_string()),
        }
    }
}
