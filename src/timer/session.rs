//! Lifecycle of a single timer session, without any notion of tasks or stores. Every method takes
//! the current wall clock time so the arithmetic can be checked on its own.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::{
    error::ValidationError,
    model::{CompanyId, NewInterval},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerPhase {
    #[default]
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    Fresh,
    Resumed,
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerSession {
    phase: TimerPhase,
    company_id: Option<CompanyId>,
    /// Shifted forward on resume by the time spent paused, so `now - session_start` is always
    /// the time actually worked.
    session_start: Option<DateTime<Utc>>,
    paused_offset_millis: u64,
    elapsed_millis: u64,
}

impl TimerSession {
    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed_millis
    }

    pub fn select(&mut self, company_id: CompanyId) -> Result<(), ValidationError> {
        if self.phase != TimerPhase::Stopped {
            return Err(ValidationError::SessionInProgress);
        }
        self.company_id = Some(company_id);
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<Started, ValidationError> {
        match self.phase {
            TimerPhase::Stopped => {
                if self.company_id.is_none() {
                    return Err(ValidationError::NoCompanySelected);
                }
                // intervals are stored with millisecond precision
                self.session_start = Some(now.trunc_subsecs(3));
                self.paused_offset_millis = 0;
                self.elapsed_millis = 0;
                self.phase = TimerPhase::Running;
                Ok(Started::Fresh)
            }
            TimerPhase::Paused => {
                self.session_start = Some(
                    now.trunc_subsecs(3) - Duration::milliseconds(self.paused_offset_millis as i64),
                );
                self.phase = TimerPhase::Running;
                Ok(Started::Resumed)
            }
            TimerPhase::Running => Ok(Started::AlreadyRunning),
        }
    }

    /// Freezes the elapsed time. Returns false when there was nothing running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase != TimerPhase::Running {
            return false;
        }
        self.elapsed_millis = self.worked_until(now);
        self.paused_offset_millis = self.elapsed_millis;
        self.phase = TimerPhase::Paused;
        true
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if self.phase != TimerPhase::Running {
            return None;
        }
        self.elapsed_millis = self.worked_until(now);
        Some(self.elapsed_millis)
    }

    /// Builds the interval this session would commit if it stopped at `now`, without changing
    /// the session. A paused session ends at the moment the pause began, so the pause is never
    /// billed.
    pub fn finish(&self, now: DateTime<Utc>) -> Option<NewInterval> {
        let start = self.session_start?;
        let company_id = self.company_id?;
        let end = match self.phase {
            TimerPhase::Stopped => return None,
            TimerPhase::Running => now.trunc_subsecs(3).max(start),
            TimerPhase::Paused => start + Duration::milliseconds(self.paused_offset_millis as i64),
        };
        Some(NewInterval {
            company_id,
            start,
            end,
            duration_millis: (end - start).num_milliseconds() as u64,
        })
    }

    /// Back to a stopped session with no company selected.
    pub fn reset(&mut self) {
        *self = TimerSession::default();
    }

    fn worked_until(&self, now: DateTime<Utc>) -> u64 {
        self.session_start
            .map(|start| (now - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }
}
