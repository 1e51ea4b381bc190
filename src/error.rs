//! Errors surfaced by the tracker to its callers and views.

use std::{fmt::Display, sync::Arc};

use thiserror::Error;

use crate::model::CompanyId;

/// Input that was rejected before anything touched a store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Select a company before starting the timer")]
    NoCompanySelected,

    #[error("Can't change the company while a session is in progress")]
    SessionInProgress,

    #[error("Company name can't be empty")]
    EmptyName,

    #[error("Invalid hourly rate: {0:?}")]
    InvalidRate(String),

    #[error("Interval end precedes its start or doesn't match its duration")]
    InvalidInterval,
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Company {0} not found")]
    NotFound(CompanyId),

    #[error("Store failure: {0:#}")]
    Store(anyhow::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Store,
}

impl TrackerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::Validation(_) => ErrorKind::Validation,
            TrackerError::NotFound(_) => ErrorKind::NotFound,
            TrackerError::Store(_) => ErrorKind::Store,
        }
    }
}

/// Failure delivered through an observed stream. Streams keep going after a fault, so it has to
/// be cheap to clone into every subscriber.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StoreFault {
    message: Arc<str>,
}

impl StoreFault {
    pub fn new(message: impl Display) -> Self {
        Self {
            message: message.to_string().into(),
        }
    }
}

impl From<&anyhow::Error> for StoreFault {
    fn from(value: &anyhow::Error) -> Self {
        StoreFault::new(format!("{value:#}"))
    }
}

/// What views and the timer publish instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewError {
    pub kind: ErrorKind,
    pub message: Arc<str>,
}

impl From<&TrackerError> for ViewError {
    fn from(value: &TrackerError) -> Self {
        ViewError {
            kind: value.kind(),
            message: value.to_string().into(),
        }
    }
}

impl From<&StoreFault> for ViewError {
    fn from(value: &StoreFault) -> Self {
        ViewError {
            kind: ErrorKind::Store,
            message: value.message.clone(),
        }
    }
}

impl Display for ViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
