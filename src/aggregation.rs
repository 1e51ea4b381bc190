//! Pure derivations from the company and interval sets. Views call these on every upstream
//! emission and publish whatever comes out, nothing here keeps state between calls.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use crate::{
    earnings::earnings,
    model::{Company, CompanyId, CompanyTotals, HourlyRate, TimeInterval},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyAggregate {
    pub company_id: CompanyId,
    pub company_name: Arc<str>,
    pub hourly_rate: HourlyRate,
    pub total_duration_millis: u64,
    pub total_earnings: f64,
}

impl From<CompanyTotals> for CompanyAggregate {
    fn from(
        CompanyTotals {
            company_id,
            company_name,
            hourly_rate,
            total_duration_millis,
        }: CompanyTotals,
    ) -> Self {
        CompanyAggregate {
            company_id,
            company_name,
            hourly_rate,
            total_duration_millis,
            total_earnings: earnings(total_duration_millis, hourly_rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateSnapshot {
    pub companies: Vec<CompanyAggregate>,
    pub total_earnings: f64,
}

impl AggregateSnapshot {
    pub fn company(&self, id: CompanyId) -> Option<&CompanyAggregate> {
        self.companies.iter().find(|v| v.company_id == id)
    }
}

/// Sums durations per company. Only companies that have at least one interval get an entry.
pub fn group_durations<'a>(
    intervals: impl IntoIterator<Item = &'a TimeInterval>,
) -> BTreeMap<CompanyId, u64> {
    let mut groups = BTreeMap::<CompanyId, u64>::new();
    for interval in intervals {
        *groups.entry(interval.company_id).or_default() += interval.duration_millis;
    }
    groups
}

/// Joins the grouped durations with company data. Intervals of unknown companies are dropped and
/// so are companies without intervals. Ordered by name.
pub fn company_totals(companies: &[Company], intervals: &[TimeInterval]) -> Vec<CompanyTotals> {
    let groups = group_durations(intervals);
    let mut totals = companies
        .iter()
        .filter_map(|company| {
            groups.get(&company.id).map(|duration| CompanyTotals {
                company_id: company.id,
                company_name: company.name.clone(),
                hourly_rate: company.hourly_rate,
                total_duration_millis: *duration,
            })
        })
        .collect::<Vec<_>>();
    totals.sort_by(|a, b| by_name(&a.company_name, a.company_id, &b.company_name, b.company_id));
    totals
}

pub fn global_earnings<'a>(aggregates: impl IntoIterator<Item = &'a CompanyAggregate>) -> f64 {
    aggregates.into_iter().map(|v| v.total_earnings).sum()
}

/// Turns pre-aggregated totals into a snapshot with earnings and the global sum.
pub fn aggregate_totals(totals: impl IntoIterator<Item = CompanyTotals>) -> AggregateSnapshot {
    let companies = totals
        .into_iter()
        .map(CompanyAggregate::from)
        .collect::<Vec<_>>();
    let total_earnings = global_earnings(&companies);
    AggregateSnapshot {
        companies,
        total_earnings,
    }
}

/// Snapshot of every company that has logged time.
pub fn aggregate_logged(companies: &[Company], intervals: &[TimeInterval]) -> AggregateSnapshot {
    aggregate_totals(company_totals(companies, intervals))
}

/// Every company with its totals, including the ones that never logged anything.
pub fn directory(companies: &[Company], totals: &[CompanyTotals]) -> Vec<CompanyAggregate> {
    let durations = totals
        .iter()
        .map(|v| (v.company_id, v.total_duration_millis))
        .collect::<BTreeMap<_, _>>();
    let mut listing = companies
        .iter()
        .map(|company| {
            let total_duration_millis = durations.get(&company.id).copied().unwrap_or(0);
            CompanyAggregate {
                company_id: company.id,
                company_name: company.name.clone(),
                hourly_rate: company.hourly_rate,
                total_duration_millis,
                total_earnings: earnings(total_duration_millis, company.hourly_rate),
            }
        })
        .collect::<Vec<_>>();
    listing.sort_by(|a, b| by_name(&a.company_name, a.company_id, &b.company_name, b.company_id));
    listing
}

/// Case-insensitive name search. A blank query matches everything.
pub fn filter_by_name<'a>(
    aggregates: &'a [CompanyAggregate],
    query: &'a str,
) -> impl Iterator<Item = &'a CompanyAggregate> + 'a {
    let query = query.trim().to_lowercase();
    aggregates
        .iter()
        .filter(move |v| query.is_empty() || v.company_name.to_lowercase().contains(&query))
}

pub fn sort_companies(companies: &mut [Company]) {
    companies.sort_by(|a, b| by_name(&a.name, a.id, &b.name, b.id));
}

fn by_name(a_name: &str, a_id: CompanyId, b_name: &str, b_id: CompanyId) -> Ordering {
    a_name.cmp(b_name).then(a_id.cmp(&b_id))
}
