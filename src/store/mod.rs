//! Contracts the tracker expects from persistence.
//!
//! Stores are push based: every `observe_*` call returns a stream that first yields the current
//! value and then a fresh value after every change. A [StoreFault] is delivered as an item and
//! doesn't end the stream, dropping the stream unsubscribes.
//!
//! [local::LocalStore] is the implementation used by the application.

pub mod local;
pub mod tables;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::StoreFault,
    model::{Company, CompanyId, CompanyTotals, NewCompany, NewInterval, TimeInterval},
};

pub type Observed<T> = BoxStream<'static, std::result::Result<T, StoreFault>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn insert(&self, company: NewCompany) -> Result<Company>;

    async fn update(&self, company: Company) -> Result<()>;

    /// Removes the company together with all of its intervals.
    async fn delete(&self, id: CompanyId) -> Result<()>;

    async fn get_by_id(&self, id: CompanyId) -> Result<Option<Company>>;

    /// All companies ordered by name.
    fn observe_all(&self) -> Observed<Vec<Company>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Appends an interval. Fails if the company doesn't exist.
    async fn insert(&self, interval: NewInterval) -> Result<TimeInterval>;

    /// Intervals of a single company, newest first. Filtering happens inside the store.
    fn observe_by_company(&self, company_id: CompanyId) -> Observed<Vec<TimeInterval>>;

    /// Per company sums, only for companies that have intervals, ordered by company name.
    fn observe_aggregated_by_company(&self) -> Observed<Vec<CompanyTotals>>;

    fn observe_all(&self) -> Observed<Vec<TimeInterval>>;
}
