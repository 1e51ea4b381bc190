//! Turning a stopped session into a stored interval.
//!
//! The timer calls [commit_session] while it still holds its lock and only resets the session
//! after this returned `Ok`. That gives two guarantees: a repeated stop finds the session already
//! stopped and commits nothing, and a failed write leaves the session as it was so it can be
//! stopped again.

use tracing::{error, info};

use crate::{
    error::{TrackerError, TrackerResult, ValidationError},
    model::{NewInterval, TimeInterval},
    store::IntervalStore,
};

pub async fn commit_session(
    store: &dyn IntervalStore,
    interval: NewInterval,
) -> TrackerResult<TimeInterval> {
    if !interval.is_consistent() {
        error!("Refusing to commit inconsistent interval {interval:?}");
        return Err(ValidationError::InvalidInterval.into());
    }

    let committed = store
        .insert(interval)
        .await
        .inspect_err(|e| error!("Failed to commit session {e:?}"))
        .map_err(TrackerError::Store)?;

    info!(
        "Committed {}ms for company {}",
        committed.duration_millis, committed.company_id
    );
    Ok(committed)
}
