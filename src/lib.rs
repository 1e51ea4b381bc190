//! Time tracking against companies with hourly rates. A single timer runs a session for one
//! company, stopping it logs an interval, and live views keep per company and global earnings
//! up to date as companies and intervals change.
//!
//! [context::Tracker] wires everything together, the `hourly` binary is a thin cli over it.

pub mod aggregation;
pub mod cli;
pub mod commit;
pub mod companies;
pub mod context;
pub mod earnings;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod timer;
pub mod utils;
pub mod views;
