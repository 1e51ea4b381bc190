//! Process wide wiring. A [Tracker] is opened once at startup and hands out the timer, the views
//! and the company editor, all sharing the same store and clock.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use tracing::info;

use crate::{
    aggregation::{AggregateSnapshot, CompanyAggregate},
    companies::CompanyEditor,
    model::CompanyId,
    pipeline::LiveView,
    store::local::LocalStore,
    timer::{Timer, DEFAULT_TICK_PERIOD},
    utils::clock::{Clock, DefaultClock},
    views::{self, CompanyDetails},
};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Where the store keeps its files. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub tick_period: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}

pub struct Tracker {
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
}

impl Tracker {
    pub async fn open(config: TrackerConfig) -> Result<Self> {
        let store = match &config.data_dir {
            Some(dir) => LocalStore::open(dir.clone()).await?,
            None => LocalStore::in_memory(),
        };
        Ok(Self::with_parts(Arc::new(store), Arc::new(DefaultClock), config))
    }

    pub fn with_parts(store: Arc<LocalStore>, clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn timer(&self) -> Timer {
        Timer::new(
            self.store.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config.tick_period,
        )
    }

    pub fn dashboard(&self) -> LiveView<AggregateSnapshot> {
        views::dashboard(self.store.as_ref(), self.store.as_ref())
    }

    pub fn directory(&self) -> LiveView<Vec<CompanyAggregate>> {
        views::company_directory(self.store.as_ref(), self.store.as_ref())
    }

    pub fn company_detail(&self, id: CompanyId) -> LiveView<CompanyDetails> {
        views::company_detail(self.store.clone(), self.store.clone(), id)
    }

    pub fn companies(&self) -> CompanyEditor {
        CompanyEditor::new(self.store.clone())
    }

    /// Waits for pending writes. Timers and views handed out earlier stop on their own when
    /// dropped.
    pub async fn shutdown(self) {
        self.store.close().await;
        info!("Tracker shut down");
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::{companies::CompanyForm, timer::session::TimerPhase, utils::clock::TestClock};

    #[tokio::test(start_paused = true)]
    async fn tracked_session_reaches_every_view() -> Result<()> {
        let tracker = Tracker::with_parts(
            Arc::new(LocalStore::in_memory()),
            Arc::new(TestClock::new()),
            TrackerConfig::default(),
        );
        let company = tracker
            .companies()
            .save(CompanyForm {
                id: None,
                name: "Acme".into(),
                rate: "30".into(),
            })
            .await?;

        let timer = tracker.timer();
        timer.select_company(company.id).await?;
        timer.start().await?;
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        let interval = timer.stop().await?.unwrap();
        assert_eq!(interval.duration_millis, 1_800_000);
        assert_eq!(timer.state().phase, TimerPhase::Stopped);

        let dashboard = tracker.dashboard().loaded().await;
        assert_eq!(dashboard.value.total_earnings, 15.);

        let detail = tracker.company_detail(company.id).loaded().await;
        assert_eq!(detail.value.intervals, vec![interval]);
        assert_eq!(detail.value.total_earnings, 15.);

        let directory = tracker.directory().loaded().await;
        assert_eq!(directory.value.len(), 1);

        tracker.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn persists_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = TrackerConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let tracker = Tracker::open(config.clone()).await?;
        let company = tracker
            .companies()
            .save(CompanyForm {
                id: None,
                name: "Initech".into(),
                rate: "12.5".into(),
            })
            .await?;
        tracker.shutdown().await;

        let reopened = Tracker::open(config).await?;
        let directory = reopened.directory().loaded().await;
        assert_eq!(directory.value.len(), 1);
        assert_eq!(directory.value[0].company_id, company.id);
        assert_eq!(directory.value[0].company_name.as_ref(), "Initech");
        Ok(())
    }
}
