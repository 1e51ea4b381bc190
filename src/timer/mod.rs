//! The timer behind the `track` command. Every transition takes the same lock, which makes the
//! timer a single writer no matter how many tasks call into it.
//!
//! While running, a background task ticks every `tick_period` to refresh the elapsed time shown
//! to the user. Ticks are cosmetic: committed durations are always computed from the clock at the
//! moment of the transition.

pub mod session;

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use session::{Started, TimerPhase, TimerSession};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    commit::commit_session,
    earnings::earnings,
    error::{TrackerError, TrackerResult, ValidationError, ViewError},
    model::{Company, CompanyId, TimeInterval},
    store::{CompanyStore, IntervalStore, Observed},
    utils::clock::Clock,
};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimerState {
    pub phase: TimerPhase,
    pub elapsed_millis: u64,
    pub current_earnings: f64,
    pub selected_company: Option<Company>,
    pub error: Option<ViewError>,
}

struct TimerCore {
    session: TimerSession,
    company: Option<Company>,
    ticker: Option<CancellationToken>,
    error: Option<ViewError>,
    state: watch::Sender<TimerState>,
}

impl TimerCore {
    fn publish(&self) {
        let elapsed_millis = self.session.elapsed_millis();
        self.state.send_replace(TimerState {
            phase: self.session.phase(),
            elapsed_millis,
            current_earnings: self
                .company
                .as_ref()
                .map_or(0., |v| earnings(elapsed_millis, v.hourly_rate)),
            selected_company: self.company.clone(),
            error: self.error.clone(),
        });
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Records the error for observers and hands it back to the caller.
    fn fail(&mut self, error: TrackerError) -> TrackerError {
        self.error = Some(ViewError::from(&error));
        self.publish();
        error
    }

    fn reset(&mut self) {
        self.cancel_ticker();
        self.session.reset();
        self.company = None;
        self.error = None;
        self.publish();
    }

    /// Keeps the selected company in sync with the store, so a new rate shows up in the live
    /// earnings right away.
    fn refresh_company(&mut self, companies: &[Company]) {
        let Some(selected) = self.company.as_ref() else {
            return;
        };
        match companies.iter().find(|v| v.id == selected.id) {
            Some(fresh) if fresh != selected => {
                debug!("Selected company {} changed", fresh.id);
                self.company = Some(fresh.clone());
                self.publish();
            }
            Some(_) => {}
            None if self.session.phase() == TimerPhase::Stopped => {
                debug!("Selected company {} was deleted", selected.id);
                self.session.reset();
                self.company = None;
                self.publish();
            }
            None => {
                warn!(
                    "Company {} was deleted during a session, stopping will fail until it's abandoned",
                    selected.id
                );
            }
        }
    }
}

pub struct Timer {
    core: Arc<Mutex<TimerCore>>,
    companies: Arc<dyn CompanyStore>,
    intervals: Arc<dyn IntervalStore>,
    clock: Arc<dyn Clock>,
    tick_period: Duration,
    state: watch::Receiver<TimerState>,
    shutdown: CancellationToken,
}

impl Timer {
    /// Must be called inside a tokio runtime, the timer immediately starts following the company
    /// list.
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        intervals: Arc<dyn IntervalStore>,
        clock: Arc<dyn Clock>,
        tick_period: Duration,
    ) -> Self {
        let (sender, state) = watch::channel(TimerState::default());
        let core = Arc::new(Mutex::new(TimerCore {
            session: TimerSession::default(),
            company: None,
            ticker: None,
            error: None,
            state: sender,
        }));
        let shutdown = CancellationToken::new();

        tokio::spawn(follow_companies(
            core.clone(),
            companies.observe_all(),
            shutdown.clone(),
        ));

        Self {
            core,
            companies,
            intervals,
            clock,
            tick_period,
            state,
            shutdown,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state.clone()
    }

    pub async fn select_company(&self, id: CompanyId) -> TrackerResult<Company> {
        let mut core = self.core.lock().await;
        if core.session.phase() != TimerPhase::Stopped {
            return Err(core.fail(ValidationError::SessionInProgress.into()));
        }
        let company = match self.companies.get_by_id(id).await {
            Ok(Some(company)) => company,
            Ok(None) => return Err(core.fail(TrackerError::NotFound(id))),
            Err(e) => return Err(core.fail(TrackerError::Store(e))),
        };
        if let Err(e) = core.session.select(company.id) {
            return Err(core.fail(e.into()));
        }
        debug!("Selected company {} {:?}", company.id, company.name);
        core.company = Some(company.clone());
        core.error = None;
        core.publish();
        Ok(company)
    }

    /// Starts a new session or resumes a paused one. Does nothing if already running.
    pub async fn start(&self) -> TrackerResult<()> {
        let mut core = self.core.lock().await;
        match core.session.start(self.clock.time()) {
            Ok(Started::AlreadyRunning) => Ok(()),
            Ok(started) => {
                debug!("Timer {started:?}");
                core.error = None;
                self.start_ticking(&mut core);
                core.publish();
                Ok(())
            }
            Err(e) => Err(core.fail(e.into())),
        }
    }

    pub async fn pause(&self) {
        let mut core = self.core.lock().await;
        core.cancel_ticker();
        if core.session.pause(self.clock.time()) {
            debug!("Timer paused at {}ms", core.session.elapsed_millis());
            core.publish();
        }
    }

    /// Commits the session and resets the timer. Returns `None` if there was no session.
    ///
    /// On failure the session stays exactly as it was, a running session keeps running, and the
    /// stop can be retried.
    pub async fn stop(&self) -> TrackerResult<Option<TimeInterval>> {
        let mut core = self.core.lock().await;
        let was_running = core.session.phase() == TimerPhase::Running;
        let Some(interval) = core.session.finish(self.clock.time()) else {
            return Ok(None);
        };
        core.cancel_ticker();

        match commit_session(self.intervals.as_ref(), interval).await {
            Ok(committed) => {
                core.reset();
                Ok(Some(committed))
            }
            Err(e) => {
                error!("Stop failed, keeping the session {e}");
                if was_running {
                    self.start_ticking(&mut core);
                }
                Err(core.fail(e))
            }
        }
    }

    /// Throws the current session away without committing anything.
    pub async fn abandon(&self) {
        let mut core = self.core.lock().await;
        if core.session.phase() == TimerPhase::Stopped {
            return;
        }
        info!(
            "Abandoning session with {}ms elapsed",
            core.session.elapsed_millis()
        );
        core.reset();
    }

    pub async fn clear_error(&self) {
        let mut core = self.core.lock().await;
        if core.error.take().is_some() {
            core.publish();
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn start_ticking(&self, core: &mut TimerCore) {
        core.cancel_ticker();
        let token = self.shutdown.child_token();
        core.ticker = Some(token.clone());
        tokio::spawn(tick(
            self.core.clone(),
            self.clock.clone(),
            self.tick_period,
            token,
        ));
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn tick(
    core: Arc<Mutex<TimerCore>>,
    clock: Arc<dyn Clock>,
    period: Duration,
    token: CancellationToken,
) {
    let mut next = clock.instant();
    loop {
        next += period;
        tokio::select! {
            _ = token.cancelled() => return,
            _ = clock.sleep_until(next) => ()
        }

        let mut core = core.lock().await;
        // A pause or stop may have taken the lock while this tick was waiting for it.
        if token.is_cancelled() {
            return;
        }
        if core.session.tick(clock.time()).is_some() {
            core.publish();
        }
    }
}

async fn follow_companies(
    core: Arc<Mutex<TimerCore>>,
    mut companies: Observed<Vec<Company>>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return,
            next = companies.next() => next,
        };
        match next {
            Some(Ok(companies)) => core.lock().await.refresh_company(&companies),
            Some(Err(fault)) => warn!("Company list unavailable, keeping selection {fault}"),
            None => return,
        }
    }
}
