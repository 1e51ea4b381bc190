//! Reactive glue between store streams and views.
//!
//! [combine_latest] remembers the last value of two upstream streams and, on every emission from
//! either side, runs a pure merge over both and publishes the result. Nothing is patched in place,
//! each emission replaces the whole value.

use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::{StoreFault, ViewError},
    store::Observed,
};

/// What a view publishes. `value` is the last good derivation, it is kept when an upstream
/// fails and `error` says why it may be stale.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    pub value: T,
    pub is_loading: bool,
    pub error: Option<ViewError>,
}

impl<T: Default> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            is_loading: true,
            error: None,
        }
    }
}

/// A background derivation. Dropping it stops the task and unsubscribes from the stores.
pub struct LiveView<T> {
    state: watch::Receiver<ViewState<T>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone> LiveView<T> {
    pub(crate) fn new(
        state: watch::Receiver<ViewState<T>>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            state,
            shutdown,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ViewState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<T>> {
        self.state.clone()
    }

    /// Waits for the first complete value, or the first error if nothing could be loaded.
    pub async fn loaded(&self) -> ViewState<T> {
        let mut state = self.state.clone();
        let loaded = state.wait_for(|v| !v.is_loading).await.map(|v| v.clone());
        match loaded {
            Ok(v) => v,
            // the task is gone, whatever it published last is all there is
            Err(_) => state.borrow().clone(),
        }
    }

    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("View task ended abnormally {e:?}");
            }
        }
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn combine_latest<A, B, T>(
    mut left: Observed<A>,
    mut right: Observed<B>,
    merge: impl Fn(&A, &B) -> T + Send + 'static,
) -> LiveView<T>
where
    A: Send + 'static,
    B: Send + 'static,
    T: Clone + Default + Send + Sync + 'static,
{
    let (sender, state) = watch::channel(ViewState::<T>::default());
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    let task = tokio::spawn(async move {
        let mut latest_left: Option<A> = None;
        let mut latest_right: Option<B> = None;
        // a side's fault holds until that same side delivers again
        let mut left_fault: Option<StoreFault> = None;
        let mut right_fault: Option<StoreFault> = None;
        let mut left_open = true;
        let mut right_open = true;

        while left_open || right_open {
            let fresh = tokio::select! {
                _ = token.cancelled() => break,
                next = left.next(), if left_open => match next {
                    Some(Ok(v)) => {
                        latest_left = Some(v);
                        left_fault = None;
                        true
                    }
                    Some(Err(fault)) => {
                        warn!("Upstream failed, keeping last value {fault}");
                        left_fault = Some(fault);
                        false
                    }
                    None => { left_open = false; continue }
                },
                next = right.next(), if right_open => match next {
                    Some(Ok(v)) => {
                        latest_right = Some(v);
                        right_fault = None;
                        true
                    }
                    Some(Err(fault)) => {
                        warn!("Upstream failed, keeping last value {fault}");
                        right_fault = Some(fault);
                        false
                    }
                    None => { right_open = false; continue }
                },
            };

            let error = left_fault.as_ref().or(right_fault.as_ref()).map(ViewError::from);
            match (fresh, &latest_left, &latest_right) {
                (true, Some(a), Some(b)) => {
                    let value = merge(a, b);
                    trace!("Recomputed view");
                    sender.send_replace(ViewState {
                        value,
                        is_loading: false,
                        error,
                    });
                }
                // a fault, or still waiting for the other side
                _ => {
                    sender.send_if_modified(|state| {
                        let is_loading = state.is_loading && error.is_none();
                        let modified = state.error != error || state.is_loading != is_loading;
                        state.is_loading = is_loading;
                        state.error = error;
                        modified
                    });
                }
            }
        }
        debug!("View stopped");
    });

    LiveView::new(state, shutdown, task)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::error::ErrorKind;

    type Feed<T> = mpsc::UnboundedSender<std::result::Result<T, StoreFault>>;

    fn feed<T: Send + 'static>() -> (Feed<T>, Observed<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn next_change<T: Clone>(state: &mut watch::Receiver<ViewState<T>>) -> ViewState<T> {
        tokio::time::timeout(Duration::from_secs(5), state.changed())
            .await
            .expect("view didn't publish")
            .expect("view task ended");
        state.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn waits_for_both_sides() -> Result<()> {
        let (left, left_stream) = feed::<u32>();
        let (right, right_stream) = feed::<u32>();
        let view = combine_latest(left_stream, right_stream, |a, b| a + b);
        let mut state = view.subscribe();

        left.send(Ok(1))?;
        right.send(Ok(2))?;
        let first = next_change(&mut state).await;
        assert_eq!(first.value, 3);
        assert!(!first.is_loading);

        right.send(Ok(10))?;
        assert_eq!(next_change(&mut state).await.value, 11);
        Ok(())
    }

    #[tokio::test]
    async fn fault_keeps_value_and_recovers() -> Result<()> {
        let (left, left_stream) = feed::<u32>();
        let (right, right_stream) = feed::<u32>();
        let view = combine_latest(left_stream, right_stream, |a, b| a * b);
        let mut state = view.subscribe();

        left.send(Ok(2))?;
        right.send(Ok(3))?;
        assert_eq!(next_change(&mut state).await.value, 6);

        left.send(Err(StoreFault::new("database locked")))?;
        let degraded = next_change(&mut state).await;
        assert_eq!(degraded.value, 6);
        assert_eq!(degraded.error.as_ref().unwrap().kind, ErrorKind::Store);
        assert_eq!(degraded.error.unwrap().message.as_ref(), "database locked");

        left.send(Ok(5))?;
        let recovered = next_change(&mut state).await;
        assert_eq!(recovered.value, 15);
        assert_eq!(recovered.error, None);
        Ok(())
    }

    #[tokio::test]
    async fn fault_holds_until_the_failed_side_recovers() -> Result<()> {
        let (left, left_stream) = feed::<u32>();
        let (right, right_stream) = feed::<u32>();
        let view = combine_latest(left_stream, right_stream, |a, b| a + b);
        let mut state = view.subscribe();

        left.send(Ok(1))?;
        right.send(Ok(2))?;
        assert_eq!(next_change(&mut state).await.value, 3);

        left.send(Err(StoreFault::new("disk full")))?;
        assert!(next_change(&mut state).await.error.is_some());

        // the other side moving on doesn't make the left value fresh
        right.send(Ok(10))?;
        let partial = next_change(&mut state).await;
        assert_eq!(partial.value, 11);
        assert_eq!(partial.error.unwrap().message.as_ref(), "disk full");

        left.send(Ok(4))?;
        let recovered = next_change(&mut state).await;
        assert_eq!(recovered.value, 14);
        assert_eq!(recovered.error, None);
        Ok(())
    }

    #[tokio::test]
    async fn fault_before_any_value_stops_loading() -> Result<()> {
        let (left, left_stream) = feed::<u32>();
        let (_right, right_stream) = feed::<u32>();
        let view = combine_latest(left_stream, right_stream, |a, b| a + b);

        left.send(Err(StoreFault::new("unreachable")))?;
        let state = view.loaded().await;
        assert!(!state.is_loading);
        assert!(state.error.is_some());
        assert_eq!(state.value, 0);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_ends_task() -> Result<()> {
        let (left, left_stream) = feed::<u32>();
        let (_right, right_stream) = feed::<u32>();
        let view = combine_latest(left_stream, right_stream, |a, b| a + b);
        view.shutdown().await;
        assert!(left.send(Ok(1)).is_err());
        Ok(())
    }
}
