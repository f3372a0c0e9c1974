//! # LogWriter — forwards bus events to `tracing`
//!
//! A minimal consumer that turns incoming [`Event`]s into `tracing` records.
//! Cancellation and deferral events are logged at `debug`, everything else at `trace`.
//!
//! ## Example output (via `describe`)
//! ```text
//! [activated] repo="profile"
//! [run-started] repo="profile" gen=1
//! [paused-async] repo="profile" gen=1 at=2
//! [resumed] repo="profile" gen=1 after=2
//! [committed] repo="profile" gen=1 notified=true
//! [cancel-requested] repo="profile" gen=2 reason="deactivation"
//! [deferred] repo="profile" delay=120ms
//! ```

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::bus::Bus;
use super::event::{Event, EventKind};

/// Event writer.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Spawns a task that logs every event published on `bus` until the bus is dropped.
    pub fn spawn(self, bus: &Bus, handle: &Handle) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        handle.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => self.write(&ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "log writer lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Emits one event as a `tracing` record.
    pub fn write(&self, e: &Event) {
        let line = Self::describe(e);
        match e.kind {
            EventKind::CancelRequested
            | EventKind::InterruptSent
            | EventKind::RunCancelled
            | EventKind::ResetToInitial
            | EventKind::TriggerDeferred => tracing::debug!(seq = e.seq, "{line}"),
            _ => tracing::trace!(seq = e.seq, "{line}"),
        }
    }

    /// Renders an event as a single bracketed line.
    pub fn describe(e: &Event) -> String {
        let repo = e.repository.as_deref().unwrap_or("unnamed");
        let generation = e.generation.unwrap_or(0);
        match e.kind {
            EventKind::Activated => format!("[activated] repo={repo:?}"),
            EventKind::Deactivated => format!("[deactivated] repo={repo:?}"),
            EventKind::RunStarted => format!("[run-started] repo={repo:?} gen={generation}"),
            EventKind::RunResumed => format!(
                "[resumed] repo={repo:?} gen={generation} after={}",
                e.index.unwrap_or(0)
            ),
            EventKind::PausedAtAsync => format!(
                "[paused-async] repo={repo:?} gen={generation} at={}",
                e.index.unwrap_or(0)
            ),
            EventKind::PausedAtLazy => format!(
                "[paused-lazy] repo={repo:?} gen={generation} at={}",
                e.index.unwrap_or(0)
            ),
            EventKind::LazyDrained => format!("[lazy-drained] repo={repo:?} gen={generation}"),
            EventKind::ValueCommitted => format!(
                "[committed] repo={repo:?} gen={generation} notified={}",
                e.notified.unwrap_or(false)
            ),
            EventKind::RunSkipped => format!(
                "[skipped] repo={repo:?} gen={generation} reason={:?}",
                e.reason.as_deref().unwrap_or("unknown")
            ),
            EventKind::CancelRequested => format!(
                "[cancel-requested] repo={repo:?} gen={generation} reason={:?}",
                e.reason.as_deref().unwrap_or("unknown")
            ),
            EventKind::InterruptSent => format!("[interrupt] repo={repo:?} gen={generation}"),
            EventKind::RunCancelled => format!(
                "[cancelled] repo={repo:?} gen={generation} at={}",
                e.index.unwrap_or(0)
            ),
            EventKind::ResetToInitial => format!(
                "[reset] repo={repo:?} notified={}",
                e.notified.unwrap_or(false)
            ),
            EventKind::RestartScheduled => format!("[restart] repo={repo:?} after_gen={generation}"),
            EventKind::TriggerDeferred => format!(
                "[deferred] repo={repo:?} delay={}ms",
                e.delay_ms.unwrap_or(0)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_describe_commit() {
        let ev = Event::new(EventKind::ValueCommitted)
            .with_repository("profile")
            .with_generation(4)
            .with_notified(true);
        assert_eq!(
            LogWriter::describe(&ev),
            r#"[committed] repo="profile" gen=4 notified=true"#
        );
    }

    #[test]
    fn test_describe_deferred_without_repository() {
        let ev = Event::new(EventKind::TriggerDeferred).with_delay(Duration::from_millis(120));
        assert_eq!(
            LogWriter::describe(&ev),
            r#"[deferred] repo="unnamed" delay=120ms"#
        );
    }

    #[tokio::test]
    async fn test_spawned_writer_stops_when_bus_dropped() {
        let bus = Bus::new(4);
        let handle = LogWriter::new().spawn(&bus, &Handle::current());
        bus.publish(Event::new(EventKind::Activated).with_repository("a"));
        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("writer should exit")
            .unwrap();
    }
}
