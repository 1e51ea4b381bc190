use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};

use crate::{
    aggregation::{company_totals, sort_companies},
    model::{
        Company, CompanyId, CompanyTotals, IntervalId, NewCompany, NewInterval, TimeInterval,
    },
};

/// In-memory content of a store. Every write produces a new value which is swapped in only
/// after it has been persisted, so a reader never sees a half applied change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    companies: BTreeMap<CompanyId, Company>,
    intervals: Vec<TimeInterval>,
    /// Ids are never reused, even after the newest company or interval has been deleted.
    pub(crate) last_company_id: u64,
    pub(crate) last_interval_id: u64,
}

impl Tables {
    pub fn new(
        companies: Vec<Company>,
        intervals: Vec<TimeInterval>,
        last_company_id: u64,
        last_interval_id: u64,
    ) -> Self {
        let last_company_id = companies
            .iter()
            .map(|v| v.id.0)
            .fold(last_company_id, u64::max);
        let last_interval_id = intervals
            .iter()
            .map(|v| v.id.0)
            .fold(last_interval_id, u64::max);
        Self {
            companies: companies.into_iter().map(|v| (v.id, v)).collect(),
            intervals,
            last_company_id,
            last_interval_id,
        }
    }

    pub fn company(&self, id: CompanyId) -> Option<&Company> {
        self.companies.get(&id)
    }

    pub fn companies_by_name(&self) -> Vec<Company> {
        let mut companies = self.companies.values().cloned().collect::<Vec<_>>();
        sort_companies(&mut companies);
        companies
    }

    pub fn intervals(&self) -> &[TimeInterval] {
        &self.intervals
    }

    /// Newest first. Ties on start are broken by id so that the order is stable.
    pub fn intervals_for(&self, company_id: CompanyId) -> Vec<TimeInterval> {
        let mut intervals = self
            .intervals
            .iter()
            .filter(|v| v.company_id == company_id)
            .cloned()
            .collect::<Vec<_>>();
        intervals.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
        intervals
    }

    pub fn totals(&self) -> Vec<CompanyTotals> {
        company_totals(&self.companies_by_name(), &self.intervals)
    }

    pub fn with_company(&self, company: NewCompany) -> (Tables, Company) {
        let id = CompanyId(self.last_company_id + 1);
        let company = Company {
            id,
            name: company.name,
            hourly_rate: company.hourly_rate,
        };
        let mut next = self.clone();
        next.last_company_id = id.0;
        next.companies.insert(id, company.clone());
        (next, company)
    }

    pub fn with_updated(&self, company: Company) -> Result<Tables> {
        if !self.companies.contains_key(&company.id) {
            bail!("Company {} doesn't exist", company.id);
        }
        let mut next = self.clone();
        next.companies.insert(company.id, company);
        Ok(next)
    }

    /// Drops the company and every interval that references it.
    pub fn without_company(&self, id: CompanyId) -> Result<Tables> {
        if !self.companies.contains_key(&id) {
            bail!("Company {id} doesn't exist");
        }
        let mut next = self.clone();
        next.companies.remove(&id);
        next.intervals.retain(|v| v.company_id != id);
        Ok(next)
    }

    /// Assigns the next interval id. Refuses intervals of unknown companies so that the
    /// interval table never references a deleted company.
    pub fn next_interval(&self, interval: NewInterval) -> Result<TimeInterval> {
        if !self.companies.contains_key(&interval.company_id) {
            return Err(anyhow!(
                "Can't log time for company {} which doesn't exist",
                interval.company_id
            ));
        }
        if !interval.is_consistent() {
            bail!("Interval duration doesn't match its start and end");
        }
        Ok(interval
            .to_millis_precision()
            .with_id(IntervalId(self.last_interval_id + 1)))
    }

    pub fn with_interval(&self, interval: TimeInterval) -> Tables {
        let mut next = self.clone();
        next.last_interval_id = next.last_interval_id.max(interval.id.0);
        next.intervals.push(interval);
        next
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::model::HourlyRate;

    fn new_company(name: &str) -> NewCompany {
        NewCompany {
            name: name.into(),
            hourly_rate: HourlyRate::new_opt(10.).unwrap(),
        }
    }

    fn new_interval(company_id: CompanyId, hour: i64) -> NewInterval {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        NewInterval {
            company_id,
            start,
            end: start + Duration::minutes(30),
            duration_millis: 1_800_000,
        }
    }

    #[test]
    fn ids_are_assigned_sequentially() -> Result<()> {
        let (tables, a) = Tables::default().with_company(new_company("a"));
        let (tables, b) = tables.with_company(new_company("b"));
        assert_eq!((a.id, b.id), (CompanyId(1), CompanyId(2)));

        let first = tables.next_interval(new_interval(a.id, 0))?;
        let tables = tables.with_interval(first.clone());
        let second = tables.next_interval(new_interval(b.id, 1))?;
        assert_eq!((first.id, second.id), (IntervalId(1), IntervalId(2)));
        Ok(())
    }

    #[test]
    fn delete_cascades_only_owned_intervals() -> Result<()> {
        let (tables, a) = Tables::default().with_company(new_company("a"));
        let (mut tables, b) = tables.with_company(new_company("b"));
        for (company, hour) in [(a.id, 0), (b.id, 1), (a.id, 2)] {
            let interval = tables.next_interval(new_interval(company, hour))?;
            tables = tables.with_interval(interval);
        }

        let tables = tables.without_company(a.id)?;
        assert!(tables.company(a.id).is_none());
        assert_eq!(tables.intervals().len(), 1);
        assert_eq!(tables.intervals()[0].company_id, b.id);
        Ok(())
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let (tables, a) = Tables::default().with_company(new_company("a"));
        let tables = tables.without_company(a.id).unwrap();
        let (_, b) = tables.with_company(new_company("b"));
        assert_eq!(b.id, CompanyId(2));
    }

    #[test]
    fn intervals_of_missing_company_are_refused() {
        let (tables, a) = Tables::default().with_company(new_company("a"));
        let tables = tables.without_company(a.id).unwrap();
        assert!(tables.next_interval(new_interval(a.id, 0)).is_err());
    }

    #[test]
    fn updating_unknown_company_fails() {
        let (tables, mut a) = Tables::default().with_company(new_company("a"));
        a.id = CompanyId(99);
        assert!(tables.with_updated(a).is_err());
    }

    #[test]
    fn company_intervals_newest_first() -> Result<()> {
        let (mut tables, a) = Tables::default().with_company(new_company("a"));
        for hour in [3, 1, 2] {
            let interval = tables.next_interval(new_interval(a.id, hour))?;
            tables = tables.with_interval(interval);
        }
        let starts = tables
            .intervals_for(a.id)
            .iter()
            .map(|v| v.start)
            .collect::<Vec<_>>();
        let mut sorted = starts.clone();
        sorted.sort();
        sorted.reverse();
        assert_eq!(starts, sorted);
        Ok(())
    }
}
