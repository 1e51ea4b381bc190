//! Read models for whatever presents the data. Each view runs as a background task fed by the
//! stores and publishes a [ViewState](crate::pipeline::ViewState) that can be watched.

pub mod dashboard;
pub mod detail;
pub mod directory;

pub use dashboard::dashboard;
pub use detail::{company_detail, CompanyDetails};
pub use directory::company_directory;
