//! The only place where time is turned into money. The live timer, the company detail and both
//! aggregates go through [earnings] so that they never disagree on precision.

use crate::model::HourlyRate;

pub const MILLIS_PER_HOUR: f64 = 3_600_000.;

pub fn earnings(duration_millis: u64, hourly_rate: HourlyRate) -> f64 {
    duration_millis as f64 / MILLIS_PER_HOUR * *hourly_rate
}

/// Two decimals, which is all a terminal needs. Views keep the raw value.
pub fn format_earnings(value: f64) -> String {
    format!("{value:.2}")
}
