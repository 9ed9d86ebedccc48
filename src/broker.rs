//! The pub/sub seam between workers and clients.
//!
//! Coordination needs two primitives: broadcast channels (`commands`,
//! `actions`) and ordered streams with per-consumer cursors (the
//! per-gamestate walk-event streams). Any broker offering both fits behind
//! [`Broker`]; [`MemoryBroker`] is the in-process implementation used by
//! the local farm and the tests.

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerError(pub String);

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "broker error: {}", self.0)
    }
}

impl error::Error for BrokerError {}

pub trait Broker: Send + Sync {
    /// Fan a message out to every current subscriber of `channel`.
    fn publish(&self, channel: &str, payload: String) -> Result<(), BrokerError>;

    fn subscribe(&self, channel: &str) -> ChannelSubscription;

    /// Append an entry to the ordered stream `stream`.
    fn append(&self, stream: &str, payload: String) -> Result<(), BrokerError>;

    /// Entries of `stream` from position `cursor` (0-based) onwards.
    fn read_stream_from(&self, stream: &str, cursor: usize) -> Result<Vec<String>, BrokerError>;
}

/// Receiving half of a channel subscription.
pub struct ChannelSubscription {
    receiver: async_channel::Receiver<String>,
}

impl ChannelSubscription {
    /// Block until the next message. None means the broker shut down.
    pub fn recv_blocking(&self) -> Option<String> {
        self.receiver.recv_blocking().ok()
    }

    pub fn try_recv(&self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

/// Tracks a read cursor per stream, so each call to [`StreamReader::read`]
/// returns only entries not seen before.
#[derive(Default)]
pub struct StreamReader {
    cursors: HashMap<String, usize>,
}

impl StreamReader {
    pub fn new() -> Self {
        StreamReader::default()
    }

    pub fn read(&mut self, broker: &dyn Broker, stream: &str) -> Result<Vec<String>, BrokerError> {
        let cursor = self.cursors.entry(stream.to_string()).or_insert(0);
        let entries = broker.read_stream_from(stream, *cursor)?;
        *cursor += entries.len();
        Ok(entries)
    }
}

/// In-process broker: channels fan out over `async-channel`, streams are
/// ordered vectors.
#[derive(Default)]
pub struct MemoryBroker {
    channels: Mutex<HashMap<String, Vec<async_channel::Sender<String>>>>,
    streams: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        MemoryBroker::default()
    }

    /// Drop every subscription; blocked receivers wake up empty-handed
    /// (after draining anything already buffered).
    pub fn shutdown(&self) {
        self.channels.lock().unwrap().clear();
    }
}

impl Broker for MemoryBroker {
    fn publish(&self, channel: &str, payload: String) -> Result<(), BrokerError> {
        let mut channels = self.channels.lock().unwrap();
        if let Some(subscribers) = channels.get_mut(channel) {
            // A failed send means the subscriber is gone; prune it.
            subscribers.retain(|sender| sender.send_blocking(payload.clone()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> ChannelSubscription {
        let (sender, receiver) = async_channel::unbounded();
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(sender);
        ChannelSubscription { receiver }
    }

    fn append(&self, stream: &str, payload: String) -> Result<(), BrokerError> {
        self.streams
            .lock()
            .unwrap()
            .entry(stream.to_string())
            .or_default()
            .push(payload);
        Ok(())
    }

    fn read_stream_from(&self, stream: &str, cursor: usize) -> Result<Vec<String>, BrokerError> {
        let streams = self.streams.lock().unwrap();
        Ok(streams
            .get(stream)
            .map(|entries| entries[cursor.min(entries.len())..].to_vec())
            .unwrap_or_default())
    }
}
