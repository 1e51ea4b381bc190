use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    earnings::earnings,
    error::{TrackerError, ViewError},
    model::{Company, CompanyId, TimeInterval},
    pipeline::{LiveView, ViewState},
    store::{CompanyStore, IntervalStore},
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompanyDetails {
    pub company: Option<Company>,
    /// Newest first.
    pub intervals: Vec<TimeInterval>,
    pub total_duration_millis: u64,
    pub total_earnings: f64,
}

impl CompanyDetails {
    fn derive(company: &Company, intervals: Vec<TimeInterval>) -> Self {
        let total_duration_millis = intervals.iter().map(|v| v.duration_millis).sum();
        CompanyDetails {
            company: Some(company.clone()),
            intervals,
            total_duration_millis,
            total_earnings: earnings(total_duration_millis, company.hourly_rate),
        }
    }
}

/// Everything logged for one company. The company itself is fetched once, a missing company
/// ends the view with a not found error and nothing is subscribed.
pub fn company_detail(
    companies: Arc<dyn CompanyStore>,
    intervals: Arc<dyn IntervalStore>,
    company_id: CompanyId,
) -> LiveView<CompanyDetails> {
    let (sender, state) = watch::channel(ViewState::<CompanyDetails>::default());
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    let task = tokio::spawn(async move {
        let fail = |error: TrackerError| {
            warn!("Company detail for {company_id} failed {error}");
            sender.send_modify(|state| {
                state.is_loading = false;
                state.error = Some(ViewError::from(&error));
            });
        };

        let company = match companies.get_by_id(company_id).await {
            Ok(Some(company)) => company,
            Ok(None) => return fail(TrackerError::NotFound(company_id)),
            Err(e) => return fail(TrackerError::Store(e)),
        };
        sender.send_modify(|state| state.value.company = Some(company.clone()));

        let mut logs = intervals.observe_by_company(company_id);
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = logs.next() => next,
            };
            match next {
                Some(Ok(logs)) => {
                    sender.send_replace(ViewState {
                        value: CompanyDetails::derive(&company, logs),
                        is_loading: false,
                        error: None,
                    });
                }
                Some(Err(fault)) => {
                    warn!("Intervals of {company_id} unavailable {fault}");
                    sender.send_modify(|state| {
                        state.is_loading = false;
                        state.error = Some(ViewError::from(&fault));
                    });
                }
                None => break,
            }
        }
        debug!("Company detail for {company_id} stopped");
    });

    LiveView::new(state, shutdown, task)
}
