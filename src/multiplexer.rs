use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task;

use async_lock::Mutex;
use futures_core::Stream;
use log::debug;

use crate::Value;

/// Push-style destination for named events, usually supplied by the embedding runtime.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn send(&self, event: &str, payload: Value);

    /// Delivers an error signal on the stream.
    fn error(&self, _code: &str, _message: &str) {}

    /// Signals that no more events will follow.
    fn end_of_stream(&self) {}
}

/// An item received through an [`EventStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Data { name: String, payload: Value },
    Error { code: String, message: String },
}

/// [`EventSink`] backed by a channel; see [`EventMultiplexer::subscribe_stream`].
pub struct ChannelSink {
    sender: async_channel::Sender<Event>,
}

impl ChannelSink {
    /// Creates the sink with the stream receiving from it.
    pub fn channel() -> (Self, EventStream) {
        let (sender, receiver) = async_channel::unbounded();
        (
            Self { sender },
            EventStream {
                receiver: Box::pin(receiver),
            },
        )
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &str, payload: Value) {
        let _ = self.sender.try_send(Event::Data {
            name: event.to_string(),
            payload,
        });
    }

    fn error(&self, code: &str, message: &str) {
        let _ = self.sender.try_send(Event::Error {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    fn end_of_stream(&self) {
        self.sender.close();
    }
}

/// Stream of events for one subscription. It ends when the subscription is replaced,
/// removed or closed.
pub struct EventStream {
    receiver: Pin<Box<async_channel::Receiver<Event>>>,
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Option<Event>> {
        self.get_mut().receiver.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.receiver.size_hint()
    }
}

/// Registry mapping subscriber keys to live sinks.
///
/// A key holds at most one sink; subscribing again replaces it. `publish` may be
/// called from platform callback threads while the runtime subscribes and
/// unsubscribes from its own.
pub struct EventMultiplexer {
    sinks: Mutex<HashMap<String, Arc<dyn EventSink>>>,
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<EventMultiplexer> {
        static GLOBAL: OnceLock<Arc<EventMultiplexer>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(EventMultiplexer::new())).clone()
    }

    /// Registers `sink` under `key`, replacing any previous registration.
    pub fn subscribe(&self, key: impl Into<String>, sink: Arc<dyn EventSink>) {
        let key = key.into();
        let replaced = self.sinks.lock_blocking().insert(key.clone(), sink);
        if replaced.is_some() {
            debug!("replaced event sink for {key:?}");
        } else {
            debug!("added event sink for {key:?}");
        }
    }

    /// Registers a [`ChannelSink`] under `key` and returns its stream.
    pub fn subscribe_stream(&self, key: impl Into<String>) -> EventStream {
        let (sink, stream) = ChannelSink::channel();
        self.subscribe(key, Arc::new(sink));
        stream
    }

    /// Removes the registration for `key`. Returns `false` if there was none.
    pub fn unsubscribe(&self, key: &str) -> bool {
        let removed = self.sinks.lock_blocking().remove(key);
        if removed.is_some() {
            debug!("removed event sink for {key:?}");
        }
        removed.is_some()
    }

    /// Delivers an event to the sink registered under `key`.
    ///
    /// Without a subscriber the event is dropped, not buffered; returns `false` then.
    pub fn publish(&self, key: &str, event: &str, payload: Value) -> bool {
        let Some(sink) = self.sink(key) else {
            debug!("no sink for {key:?}, dropping {event:?}");
            return false;
        };
        sink.send(event, payload);
        true
    }

    /// Delivers an error signal to the sink registered under `key`.
    pub fn publish_error(&self, key: &str, code: &str, message: &str) -> bool {
        let Some(sink) = self.sink(key) else {
            debug!("no sink for {key:?}, dropping error {code}");
            return false;
        };
        sink.error(code, message);
        true
    }

    // The sink is cloned out so it is never called with the registry locked.
    fn sink(&self, key: &str) -> Option<Arc<dyn EventSink>> {
        self.sinks.lock_blocking().get(key).cloned()
    }

    /// Ends every subscription and clears the registry.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.sinks.lock_blocking().drain().collect();
        for (key, sink) in drained {
            debug!("closing event sink for {key:?}");
            sink.end_of_stream();
        }
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.sinks.lock_blocking().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.sinks.lock_blocking().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.lock_blocking().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}
