// src/io/serial/reader.rs
//
// Poll driver: reads whatever the session has buffered, feeds the marker
// framer and hands complete messages to a consumer in stream order.
// Can run inline, as a blocking loop, or on a blocking task that sends
// events over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::framer::{MarkerFramer, Message};
use super::session::{LineDevice, PortSession};
use crate::error::{ErrorKind, Result, SerialError};
use crate::io::now_us;
use crate::io::types::{StopReason, StreamEvent};

/// Bytes requested per read (a 1 KiB scratch buffer less one)
pub const DEFAULT_READ_SIZE: usize = 1023;

/// Channel depth for the reader hand-off
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Consumers
// ============================================================================

/// Receives what the driver produces.
pub trait MessageConsumer {
    /// Called once per extracted message, in extraction order
    fn on_message(&mut self, message: Message);

    /// Informational events (connected, disconnected)
    fn on_status(&mut self, _status: &str) {}

    /// Open, configuration and read failures
    fn on_error(&mut self, _kind: ErrorKind, _detail: &str) {}

    /// True once the consumer can no longer take output. The poll loop
    /// stops at the next tick.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F: FnMut(Message)> MessageConsumer for F {
    fn on_message(&mut self, message: Message) {
        self(message)
    }
}

/// Forwards everything to an async channel. Must be driven from a blocking
/// context (e.g. `spawn_blocking`), never from inside an async task.
pub struct ChannelConsumer {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelConsumer {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        ChannelConsumer { tx }
    }

    fn send(&self, event: StreamEvent) {
        if self.tx.blocking_send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

impl MessageConsumer for ChannelConsumer {
    fn on_message(&mut self, message: Message) {
        self.send(StreamEvent::Message {
            timestamp_us: now_us(),
            message,
        });
    }

    fn on_status(&mut self, status: &str) {
        self.send(StreamEvent::Status {
            text: status.to_string(),
        });
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.send(StreamEvent::Error {
            kind,
            detail: detail.to_string(),
        });
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Poll Driver
// ============================================================================

pub struct PollDriver<D: LineDevice> {
    session: PortSession<D>,
    framer: MarkerFramer,
    buf: Vec<u8>,
}

impl<D: LineDevice> PollDriver<D> {
    pub fn new(session: PortSession<D>) -> Self {
        Self::with_framer(session, MarkerFramer::new())
    }

    pub fn with_framer(session: PortSession<D>, framer: MarkerFramer) -> Self {
        PollDriver {
            session,
            framer,
            buf: vec![0u8; DEFAULT_READ_SIZE],
        }
    }

    /// Change how many bytes one tick asks the device for.
    pub fn read_size(mut self, bytes: usize) -> Self {
        self.buf = vec![0u8; bytes.max(1)];
        self
    }

    pub fn session(&self) -> &PortSession<D> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PortSession<D> {
        &mut self.session
    }

    pub fn framer(&self) -> &MarkerFramer {
        &self.framer
    }

    /// One poll tick. Returns how many messages were delivered; a tick that
    /// read nothing delivers zero and is not an error.
    pub fn tick<C: MessageConsumer + ?Sized>(&mut self, consumer: &mut C) -> Result<usize> {
        let messages = self.poll()?;
        let count = messages.len();
        for message in messages {
            consumer.on_message(message);
        }
        Ok(count)
    }

    /// One poll tick, returning the extracted messages instead of
    /// delivering them.
    pub fn poll(&mut self) -> Result<Vec<Message>> {
        let n = self.session.read_into(&mut self.buf)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let chunk = &self.buf[..n];
        tracing::trace!(path = self.session.path(), bytes = %hex::encode(chunk), "Read {} bytes", n);
        Ok(self.framer.feed(chunk))
    }

    /// Poll until `cancel` is raised, the consumer closes or a tick fails,
    /// sleeping `interval` between ticks. The session is closed before
    /// returning.
    pub fn run<C: MessageConsumer + ?Sized>(
        &mut self,
        consumer: &mut C,
        interval: Duration,
        cancel: &AtomicBool,
    ) -> StopReason {
        let path = self.session.path().to_string();
        consumer.on_status(&format!("Connected to {}", path));
        tracing::info!(path = %path, interval_ms = interval.as_millis() as u64, "Polling started");

        let reason = loop {
            if cancel.load(Ordering::Relaxed) {
                break StopReason::Stopped;
            }
            if consumer.is_closed() {
                tracing::debug!(path = %path, "Consumer closed");
                break StopReason::Stopped;
            }

            if let Err(e) = self.tick(consumer) {
                tracing::warn!(path = %path, "{}", e);
                consumer.on_error(e.kind(), &e.to_string());
                break StopReason::Error;
            }

            std::thread::sleep(interval);
        };

        self.session.close();
        let discarded = self.framer.reset();
        if discarded > 0 {
            tracing::debug!(path = %path, discarded, "Dropped unterminated frame data");
        }
        consumer.on_status("Disconnected");
        tracing::info!(path = %path, ?reason, "Polling stopped");
        reason
    }
}

// ============================================================================
// Background Reader
// ============================================================================

/// Run the poll loop on a blocking task and receive its output as events.
/// The last event is always `StreamEvent::Ended`.
pub fn spawn_reader<D>(
    mut driver: PollDriver<D>,
    interval: Duration,
    cancel: Arc<AtomicBool>,
) -> (tokio::task::JoinHandle<StopReason>, mpsc::Receiver<StreamEvent>)
where
    D: LineDevice + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        let mut consumer = ChannelConsumer::new(tx);
        let reason = driver.run(&mut consumer, interval, &cancel);
        consumer.send(StreamEvent::Ended { reason });
        reason
    });

    (handle, rx)
}

/// Open `path` and describe any failure through the consumer, the way the
/// poll loop reports its own errors.
pub fn open_and_report<C: MessageConsumer + ?Sized>(
    path: &str,
    consumer: &mut C,
) -> Option<PortSession> {
    match PortSession::open(path) {
        Ok(session) => Some(session),
        Err(e) => {
            report(consumer, &e);
            None
        }
    }
}

fn report<C: MessageConsumer + ?Sized>(consumer: &mut C, e: &SerialError) {
    tracing::warn!("{}", e);
    consumer.on_error(e.kind(), &e.to_string());
}
