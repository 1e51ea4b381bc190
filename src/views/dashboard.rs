use crate::{
    aggregation::{aggregate_logged, AggregateSnapshot},
    pipeline::{combine_latest, LiveView},
    store::{CompanyStore, IntervalStore},
};

/// Earnings of every company that has logged time, plus the global total. Recomputed from the
/// full company and interval sets whenever either changes.
pub fn dashboard(
    companies: &dyn CompanyStore,
    intervals: &dyn IntervalStore,
) -> LiveView<AggregateSnapshot> {
    combine_latest(
        companies.observe_all(),
        intervals.observe_all(),
        |companies, intervals| aggregate_logged(companies, intervals),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        model::{CompanyId, HourlyRate, NewCompany, NewInterval},
        pipeline::ViewState,
        store::local::LocalStore,
    };

    async fn add_company(store: &LocalStore, name: &str, rate: f64) -> Result<CompanyId> {
        let company = CompanyStore::insert(
            store,
            NewCompany {
                name: name.into(),
                hourly_rate: HourlyRate::new_opt(rate).unwrap(),
            },
        )
        .await?;
        Ok(company.id)
    }

    async fn log(store: &LocalStore, company_id: CompanyId, duration_millis: u64) -> Result<()> {
        let start = Utc.with_ymd_and_hms(2024, 8, 12, 9, 0, 0).unwrap();
        IntervalStore::insert(
            store,
            NewInterval {
                company_id,
                start,
                end: start + chrono::Duration::milliseconds(duration_millis as i64),
                duration_millis,
            },
        )
        .await?;
        Ok(())
    }

    async fn settled(
        view: &LiveView<AggregateSnapshot>,
        until: impl Fn(&AggregateSnapshot) -> bool,
    ) -> ViewState<AggregateSnapshot> {
        let mut state = view.subscribe();
        let settled = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|v| !v.is_loading && until(&v.value)),
        )
        .await
        .expect("dashboard didn't settle")
        .expect("dashboard stopped")
        .clone();
        settled
    }

    #[tokio::test]
    async fn thirty_minutes_at_thirty_an_hour() -> Result<()> {
        let store = LocalStore::in_memory();
        let a = add_company(&store, "A", 30.).await?;
        log(&store, a, 1_800_000).await?;

        let view = dashboard(&store, &store);
        let state = settled(&view, |_| true).await;

        assert_eq!(state.error, None);
        assert_eq!(state.value.companies.len(), 1);
        assert_eq!(state.value.companies[0].total_duration_millis, 1_800_000);
        assert_eq!(state.value.companies[0].total_earnings, 15.);
        assert_eq!(state.value.total_earnings, 15.);
        Ok(())
    }

    #[tokio::test]
    async fn follows_new_intervals() -> Result<()> {
        let store = LocalStore::in_memory();
        let a = add_company(&store, "A", 30.).await?;
        let view = dashboard(&store, &store);
        assert!(settled(&view, |_| true).await.value.companies.is_empty());

        log(&store, a, 3_600_000).await?;
        let state = settled(&view, |v| v.total_earnings > 0.).await;
        assert_eq!(state.value.total_earnings, 30.);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_company_removes_its_time_only() -> Result<()> {
        let store = LocalStore::in_memory();
        let a = add_company(&store, "A", 30.).await?;
        let b = add_company(&store, "B", 60.).await?;
        log(&store, a, 1_800_000).await?;
        log(&store, b, 1_800_000).await?;
        log(&store, b, 1_800_000).await?;

        let view = dashboard(&store, &store);
        assert_eq!(settled(&view, |_| true).await.value.total_earnings, 75.);

        CompanyStore::delete(&store, b).await?;
        let state = settled(&view, |v| v.companies.len() == 1).await;
        assert_eq!(state.value.companies[0].company_id, a);
        assert_eq!(state.value.companies[0].total_earnings, 15.);
        assert_eq!(state.value.total_earnings, 15.);
        Ok(())
    }

    #[tokio::test]
    async fn rate_edit_recomputes_history() -> Result<()> {
        let store = LocalStore::in_memory();
        let a = add_company(&store, "A", 30.).await?;
        log(&store, a, 3_600_000).await?;
        let view = dashboard(&store, &store);
        settled(&view, |_| true).await;

        let mut company = store.get_by_id(a).await?.unwrap();
        company.hourly_rate = HourlyRate::new_opt(45.).unwrap();
        CompanyStore::update(&store, company).await?;

        let state = settled(&view, |v| v.total_earnings != 30.).await;
        assert_eq!(state.value.total_earnings, 45.);
        Ok(())
    }
}
