//! Entities shared by the stores, the timer and the views.

use std::{fmt::Display, ops::Deref, str::FromStr, sync::Arc};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub u64);

impl Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for CompanyId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(CompanyId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalId(pub u64);

/// Amount of money earned for one hour of work. Always positive and finite, the currency is
/// whatever the user has in mind.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct HourlyRate(f64);

impl HourlyRate {
    pub fn new_opt(value: f64) -> Option<HourlyRate> {
        if value.is_finite() && value > 0. {
            Some(HourlyRate(value))
        } else {
            None
        }
    }
}

impl Display for HourlyRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}/h", self.0)
    }
}

impl FromStr for HourlyRate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "30/h" is what Display produces, so accept it back
        let trimmed = s.trim().trim_end_matches("/h");
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(HourlyRate::new_opt)
            .ok_or_else(|| ValidationError::InvalidRate(s.to_string()))
    }
}

impl TryFrom<f64> for HourlyRate {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        HourlyRate::new_opt(value).ok_or_else(|| ValidationError::InvalidRate(value.to_string()))
    }
}

impl From<HourlyRate> for f64 {
    fn from(value: HourlyRate) -> Self {
        value.0
    }
}

impl Deref for HourlyRate {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: Arc<str>,
    pub hourly_rate: HourlyRate,
}

/// A company that hasn't been stored yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompany {
    pub name: Arc<str>,
    pub hourly_rate: HourlyRate,
}

/// One committed start to stop record against a company. Never changes after it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub id: IntervalId,
    pub company_id: CompanyId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,
    pub duration_millis: u64,
}

impl TimeInterval {
    /// Checks that the stored duration is exactly the distance between start and end.
    pub fn is_consistent(&self) -> bool {
        NewInterval::from(self.clone()).is_consistent()
    }
}

/// An interval waiting to be committed. Produced by the timer when a session stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterval {
    pub company_id: CompanyId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_millis: u64,
}

impl NewInterval {
    pub fn is_consistent(&self) -> bool {
        let span = (self.end - self.start).num_milliseconds();
        span >= 0 && span as u64 == self.duration_millis
    }

    /// Drops anything below a millisecond from `start` and puts `end` exactly `duration_millis`
    /// after it. Stored timestamps are whole milliseconds, so this is the only shape that reads
    /// back consistent.
    pub fn to_millis_precision(self) -> Self {
        let start = self.start.trunc_subsecs(3);
        NewInterval {
            start,
            end: start + Duration::milliseconds(self.duration_millis as i64),
            ..self
        }
    }

    pub fn with_id(self, id: IntervalId) -> TimeInterval {
        TimeInterval {
            id,
            company_id: self.company_id,
            start: self.start,
            end: self.end,
            duration_millis: self.duration_millis,
        }
    }
}

impl From<TimeInterval> for NewInterval {
    fn from(
        TimeInterval {
            company_id,
            start,
            end,
            duration_millis,
            ..
        }: TimeInterval,
    ) -> Self {
        NewInterval {
            company_id,
            start,
            end,
            duration_millis,
        }
    }
}

/// Store side pre-aggregation of the intervals of one company.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyTotals {
    pub company_id: CompanyId,
    pub company_name: Arc<str>,
    pub hourly_rate: HourlyRate,
    pub total_duration_millis: u64,
}
