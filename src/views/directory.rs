use crate::{
    aggregation::{directory, CompanyAggregate},
    pipeline::{combine_latest, LiveView},
    store::{CompanyStore, IntervalStore},
};

/// All companies with their totals, companies that never logged anything included. Relies on the
/// store's own per company sums instead of the raw intervals. Search with
/// [filter_by_name](crate::aggregation::filter_by_name).
pub fn company_directory(
    companies: &dyn CompanyStore,
    intervals: &dyn IntervalStore,
) -> LiveView<Vec<CompanyAggregate>> {
    combine_latest(
        companies.observe_all(),
        intervals.observe_aggregated_by_company(),
        |companies, totals| directory(companies, totals),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        aggregation::filter_by_name,
        model::{HourlyRate, NewCompany, NewInterval},
        store::local::LocalStore,
    };

    #[tokio::test]
    async fn lists_idle_companies_with_zero_totals() -> Result<()> {
        let store = LocalStore::in_memory();
        let mut ids = vec![];
        for (name, rate) in [("Initech", 20.), ("acme", 40.)] {
            let company = CompanyStore::insert(
                &store,
                NewCompany {
                    name: name.into(),
                    hourly_rate: HourlyRate::new_opt(rate).unwrap(),
                },
            )
            .await?;
            ids.push(company.id);
        }
        let start = Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap();
        IntervalStore::insert(
            &store,
            NewInterval {
                company_id: ids[0],
                start,
                end: start + chrono::Duration::minutes(90),
                duration_millis: 5_400_000,
            },
        )
        .await?;

        let view = company_directory(&store, &store);
        let mut state = view.subscribe();
        let listing = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|v| !v.is_loading && v.value.iter().any(|c| c.total_duration_millis > 0)),
        )
        .await??
        .value
        .clone();

        assert_eq!(listing.len(), 2);
        // byte order, uppercase first
        assert_eq!(listing[0].company_name.as_ref(), "Initech");
        assert_eq!(listing[0].total_earnings, 30.);
        assert_eq!(listing[1].total_earnings, 0.);

        let found = filter_by_name(&listing, "ACME").collect::<Vec<_>>();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].company_id, ids[1]);
        Ok(())
    }
}
