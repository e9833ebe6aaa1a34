//! Eagerly-buffered streaming handle.
//!
//! [`EventStream`] drains the provider's stream into a shared buffer as
//! fast as it arrives, independent of consumers. Each subscriber carries
//! its own cursor into the buffer, so any number of consumers; the event
//! iterator, the `response()` future, a `text_stream()`; observe the same
//! full sequence, and a subscriber created after N events still sees
//! events `0..N`. Waiting consumers park on a [`Notify`] that is signalled
//! on every append and on completion or failure.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::accumulator::StreamAccumulator;
use crate::error::{LlmError, LlmResult};
use crate::provider::BoxStream;
use crate::types::response::Response;
use crate::types::stream_event::{StreamEvent, StreamEventType};

#[derive(Debug, Default)]
struct BufferState {
    events: Vec<StreamEvent>,
    done: bool,
    error: Option<LlmError>,
}

#[derive(Debug, Default)]
struct Buffer {
    state: Mutex<BufferState>,
    wakeup: Notify,
}

impl Buffer {
    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: StreamEvent) {
        self.lock().events.push(event);
        self.wakeup.notify_waiters();
    }

    fn complete(&self) {
        self.lock().done = true;
        self.wakeup.notify_waiters();
    }

    fn fail(&self, error: LlmError) {
        let mut state = self.lock();
        state.error = Some(error);
        state.done = true;
        drop(state);
        self.wakeup.notify_waiters();
    }
}

/// A handle onto a buffered event stream.
///
/// Cloning produces an independent subscriber positioned at the start of
/// the buffer.
pub struct EventStream {
    buffer: Arc<Buffer>,
    cursor: usize,
    error_delivered: bool,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl Clone for EventStream {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            cursor: 0,
            error_delivered: false,
        }
    }
}

/// The drainer's write side of the buffer.
pub(crate) struct EventSink {
    buffer: Arc<Buffer>,
}

impl EventSink {
    /// Append an event and wake waiting subscribers.
    pub(crate) fn push(&self, event: StreamEvent) {
        self.buffer.push(event);
    }

    /// Mark the stream as finished.
    pub(crate) fn complete(&self) {
        self.buffer.complete();
    }

    /// Terminate the stream with an error.
    pub(crate) fn fail(&self, error: LlmError) {
        self.buffer.fail(error);
    }
}

impl EventStream {
    /// Spawn the drainer task. `drain` receives the buffer's write side
    /// and runs to completion independent of any consumer, so buffering
    /// never stalls on a slow (or absent) reader.
    pub(crate) fn spawn<F, Fut>(drain: F) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let buffer = Arc::new(Buffer::default());
        let sink = EventSink {
            buffer: Arc::clone(&buffer),
        };
        tokio::spawn(drain(sink));

        Self {
            buffer,
            cursor: 0,
            error_delivered: false,
        }
    }

    /// Build an already-complete stream from a fixed event list. Test and
    /// fallback paths use this.
    #[must_use]
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        let buffer = Arc::new(Buffer::default());
        {
            let mut state = buffer.lock();
            state.events = events;
            state.done = true;
        }
        Self {
            buffer,
            cursor: 0,
            error_delivered: false,
        }
    }

    /// A fresh subscriber positioned at event 0.
    #[must_use]
    pub fn subscribe(&self) -> Self {
        self.clone()
    }

    /// The next event, waiting for the drainer when the buffer is caught
    /// up. A terminal drain error is delivered exactly once, then `None`.
    pub async fn next_event(&mut self) -> Option<LlmResult<StreamEvent>> {
        loop {
            let wakeup = self.buffer.wakeup.notified();
            {
                let state = self.buffer.lock();
                if self.cursor < state.events.len() {
                    let event = state.events[self.cursor].clone();
                    self.cursor += 1;
                    return Some(Ok(event));
                }
                if let Some(error) = &state.error {
                    if self.error_delivered {
                        return None;
                    }
                    self.error_delivered = true;
                    return Some(Err(error.clone()));
                }
                if state.done {
                    return None;
                }
            }
            wakeup.await;
        }
    }

    /// All events as a futures `Stream`, replayed from the start.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, LlmResult<StreamEvent>> {
        let subscriber = self.subscribe();
        Box::pin(futures::stream::unfold(subscriber, |mut sub| async move {
            sub.next_event().await.map(|event| (event, sub))
        }))
    }

    /// Only the text deltas, replayed from the start.
    #[must_use]
    pub fn text_stream(&self) -> BoxStream<'static, LlmResult<String>> {
        let subscriber = self.subscribe();
        Box::pin(futures::stream::unfold(subscriber, |mut sub| async move {
            loop {
                match sub.next_event().await {
                    Some(Ok(event)) => {
                        if event.event_type == StreamEventType::TextDelta {
                            if let Some(delta) = event.delta {
                                return Some((Ok(delta), sub));
                            }
                        }
                    }
                    Some(Err(err)) => return Some((Err(err), sub)),
                    None => return None,
                }
            }
        }))
    }

    /// The final response, resolved after the terminal `finish` event.
    ///
    /// Uses the response carried on the finish event when present, and an
    /// accumulated one otherwise. A stream that ends without a finish
    /// event is a stream error.
    pub async fn response(&self) -> LlmResult<Response> {
        let mut subscriber = self.subscribe();
        let mut accumulator = StreamAccumulator::new();
        let mut finished = false;

        while let Some(item) = subscriber.next_event().await {
            let event = item?;
            if let Some(error) = event.error {
                return Err(error);
            }
            if event.event_type == StreamEventType::Finish {
                finished = true;
            }
            accumulator.process(&event);
        }

        if finished {
            Ok(accumulator.response())
        } else {
            Err(LlmError::Stream {
                message: "stream ended without a finish event".into(),
            })
        }
    }
}
