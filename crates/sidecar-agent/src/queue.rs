//! Event queue
//!
//! Buffers analytics events until the client is ready, then forwards them to
//! the [`EventSink`] in submission order. Flushing is dirty-tracked: the sink
//! is only asked to flush when something was delivered since the last flush.

use crate::readiness::{ClientReadiness, ReadinessState};
use parking_lot::Mutex;
use sidecar_core::{EventSink, QueuedEvent, SinkError};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

enum Mode {
    Buffering(VecDeque<QueuedEvent>),
    Forwarding,
    Closed,
}

struct QueueState {
    mode: Mode,
    dirty: bool,
}

/// FIFO event queue in front of an [`EventSink`]
pub struct EventQueue {
    sink: Arc<dyn EventSink>,
    state: Mutex<QueueState>,
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending_len())
            .field("forwarding", &self.is_forwarding())
            .finish_non_exhaustive()
    }
}

impl EventQueue {
    /// Queue buffering into `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(QueueState {
                mode: Mode::Buffering(VecDeque::new()),
                dirty: false,
            }),
        }
    }

    /// Enqueue or forward one event
    pub fn log_event(&self, event: QueuedEvent) {
        let mut state = self.state.lock();
        match &mut state.mode {
            Mode::Buffering(pending) => {
                tracing::trace!(event = %event.event_name, "event queued");
                pending.push_back(event);
            }
            Mode::Forwarding => {
                self.sink.log_event(event);
                state.dirty = true;
            }
            Mode::Closed => {
                tracing::debug!(event = %event.event_name, "client failed; event dropped");
            }
        }
    }

    /// Start forwarding, draining buffered events in order
    ///
    /// Returns the number of drained events; zero when already forwarding.
    pub fn mark_ready(&self) -> usize {
        let mut state = self.state.lock();
        let pending = match &mut state.mode {
            Mode::Buffering(pending) => std::mem::take(pending),
            Mode::Forwarding | Mode::Closed => return 0,
        };
        state.mode = Mode::Forwarding;
        let drained = pending.len();
        for event in pending {
            self.sink.log_event(event);
        }
        state.dirty |= drained > 0;
        tracing::debug!(drained, "event queue drained");
        drained
    }

    /// Stop accepting events after the client failed for good
    ///
    /// Returns the number of buffered events discarded.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = match &state.mode {
            Mode::Buffering(pending) => pending.len(),
            Mode::Forwarding | Mode::Closed => return 0,
        };
        state.mode = Mode::Closed;
        if discarded > 0 {
            tracing::warn!(discarded, "client failed; discarding queued events");
        }
        discarded
    }

    /// Wait for `readiness` to settle, then drain or discard the buffer
    ///
    /// Returns the number of events drained or discarded.
    pub async fn follow(&self, readiness: &ClientReadiness) -> usize {
        match readiness.wait().await {
            ReadinessState::Ready => self.mark_ready(),
            ReadinessState::Failed(_) => self.close(),
            ReadinessState::Pending => 0,
        }
    }

    /// Flush the sink if anything was delivered since the last flush
    ///
    /// # Errors
    /// Propagates the sink's error; the attempt is not retried
    pub async fn flush(&self) -> Result<(), SinkError> {
        let dirty = std::mem::take(&mut self.state.lock().dirty);
        if !dirty {
            return Ok(());
        }
        self.sink.flush().await
    }

    /// Whether events go straight to the sink
    #[must_use]
    pub fn is_forwarding(&self) -> bool {
        matches!(self.state.lock().mode, Mode::Forwarding)
    }

    /// Number of buffered events
    #[must_use]
    pub fn pending_len(&self) -> usize {
        match &self.state.lock().mode {
            Mode::Buffering(pending) => pending.len(),
            Mode::Forwarding | Mode::Closed => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        events: Mutex<Vec<String>>,
        flushes: AtomicUsize,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        fn log_event(&self, event: QueuedEvent) {
            self.events.lock().push(event.event_name);
        }

        async fn flush(&self) -> Result<(), SinkError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn queue() -> (Arc<CountingSink>, EventQueue) {
        let sink = Arc::new(CountingSink::default());
        let queue = EventQueue::new(Arc::clone(&sink) as Arc<dyn EventSink>);
        (sink, queue)
    }

    #[tokio::test]
    async fn buffers_until_ready_then_drains_in_order() {
        let (sink, queue) = queue();
        for name in ["E1", "E2", "E3"] {
            queue.log_event(QueuedEvent::new(name));
        }
        assert!(sink.events.lock().is_empty());
        assert_eq!(queue.pending_len(), 3);

        assert_eq!(queue.mark_ready(), 3);
        queue.flush().await.unwrap();
        assert_eq!(*sink.events.lock(), vec!["E1", "E2", "E3"]);
        assert_eq!(sink.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_flush_is_a_no_op() {
        let (sink, queue) = queue();
        queue.log_event(QueuedEvent::new("E1"));
        queue.mark_ready();
        queue.flush().await.unwrap();
        queue.flush().await.unwrap();
        assert_eq!(sink.flushes.load(Ordering::SeqCst), 1);

        queue.log_event(QueuedEvent::new("E2"));
        queue.flush().await.unwrap();
        assert_eq!(sink.flushes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mark_ready_twice_drains_once() {
        let (sink, queue) = queue();
        queue.log_event(QueuedEvent::new("E1"));
        assert_eq!(queue.mark_ready(), 1);
        assert_eq!(queue.mark_ready(), 0);
        assert_eq!(sink.events.lock().len(), 1);
    }

    #[test]
    fn forwarding_after_ready() {
        let (sink, queue) = queue();
        queue.mark_ready();
        queue.log_event(QueuedEvent::new("late"));
        assert_eq!(*sink.events.lock(), vec!["late"]);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn close_discards_buffered_events() {
        let (sink, queue) = queue();
        queue.log_event(QueuedEvent::new("E1"));
        assert_eq!(queue.close(), 1);
        queue.log_event(QueuedEvent::new("E2"));
        assert_eq!(queue.mark_ready(), 0);
        assert!(!queue.is_forwarding());
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn follow_drains_once_readiness_settles() {
        let (sink, queue) = queue();
        let queue = Arc::new(queue);
        let readiness = ClientReadiness::new();
        queue.log_event(QueuedEvent::new("E1"));

        let waiter = {
            let (queue, readiness) = (Arc::clone(&queue), readiness.clone());
            tokio::spawn(async move { queue.follow(&readiness).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(queue.pending_len(), 1);

        readiness.mark_ready();
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(queue.is_forwarding());
        assert_eq!(*sink.events.lock(), vec!["E1"]);
    }

    #[tokio::test]
    async fn follow_discards_after_failure() {
        let (sink, queue) = queue();
        let readiness = ClientReadiness::new();
        queue.log_event(QueuedEvent::new("E1"));
        readiness.mark_failed("offline");
        assert_eq!(queue.follow(&readiness).await, 1);
        assert!(!queue.is_forwarding());
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn close_after_ready_keeps_forwarding() {
        let (_sink, queue) = queue();
        queue.mark_ready();
        assert_eq!(queue.close(), 0);
        assert!(queue.is_forwarding());
    }
}
