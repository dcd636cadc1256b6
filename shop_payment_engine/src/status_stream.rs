//! Per-connection payment status streams
//!
//! A [`StatusDispatcher`] bridges one long-lived client connection to the [`StatusCache`] for exactly one order. On
//! open it replays the cached status (if any). If that status is already terminal, the dispatcher closes without ever
//! subscribing. Otherwise it subscribes and forwards every change until the order reaches a terminal status, the client
//! goes away, the caller cancels, or no status change arrives for too long.
//!
//! The dispatcher knows nothing about HTTP. It writes [`StreamMessage`]s into an mpsc "sink" and watches a generic
//! cancellation future. A closed sink is a disconnected client; a failed write is treated exactly the same way and is
//! never retried. Nothing is lost when that happens, since the cache still holds the current status and a reconnecting
//! client gets it replayed.
//!
//! ```text
//!   AwaitingInitial ──(replayed terminal)──────────────────────────────► Closed
//!   AwaitingInitial ──► Subscribed ──(terminal update | abort | idle)──► Closed
//! ```
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures_util::Stream;
use log::*;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    db_types::{OrderCode, PaymentStatus},
    status_cache::{CacheEntry, StatusCache, Subscription, Watch, STATUS_TTL},
};

/// Interval between keepalive messages on an open stream.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

//--------------------------------------        StatusEvent      -----------------------------------------------------
/// The payload pushed to clients for every status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// `Some(true)` when the status was served from the cache, `Some(false)` when it had to be recovered from the
    /// webhook log. Live pushes leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl StatusEvent {
    pub fn live(entry: &CacheEntry) -> Self {
        Self { status: entry.status, amount: entry.amount, cached: None }
    }

    pub fn replayed(entry: &CacheEntry) -> Self {
        Self { status: entry.status, amount: entry.amount, cached: Some(true) }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Status(StatusEvent),
    /// Carries nothing. Only there to keep idle connections from being reaped by proxies.
    KeepAlive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    AwaitingInitial,
    Subscribed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A terminal status was delivered.
    Terminal,
    /// The sink was closed, or a write to it failed.
    ClientDisconnected,
    /// The cancellation signal fired.
    Cancelled,
    IdleTimeout,
    /// Every handle to the cache was dropped, so no further updates can arrive.
    CacheDropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub keepalive_interval: Duration,
    /// A stream that goes this long without a status change is closed. Keepalives do not count as a change. `None`
    /// waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self { keepalive_interval: KEEPALIVE_INTERVAL, idle_timeout: Some(STATUS_TTL) }
    }
}

//--------------------------------------      StatusDispatcher   -----------------------------------------------------
pub struct StatusDispatcher {
    cache: StatusCache,
    order_code: OrderCode,
    options: StreamOptions,
    state: DispatcherState,
    replay: Option<StatusEvent>,
    subscription: Option<Subscription>,
    updates: Option<mpsc::UnboundedReceiver<CacheEntry>>,
}

impl StatusDispatcher {
    pub fn new(cache: StatusCache, order_code: OrderCode, options: StreamOptions) -> Self {
        Self {
            cache,
            order_code,
            options,
            state: DispatcherState::AwaitingInitial,
            replay: None,
            subscription: None,
            updates: None,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn order_code(&self) -> &OrderCode {
        &self.order_code
    }

    /// The cached status captured by [`open`](Self::open), if it has not been sent yet.
    pub fn replay(&self) -> Option<&StatusEvent> {
        self.replay.as_ref()
    }

    /// Captures the cached status and, unless it is terminal, subscribes to further changes. Calling this more than
    /// once has no further effect.
    pub fn open(&mut self) -> DispatcherState {
        if self.state != DispatcherState::AwaitingInitial {
            return self.state;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = self.cache.watch(&self.order_code, move |entry| {
            // The receiver only disappears during teardown, after which there is nobody left to tell.
            let _ = tx.send(entry.clone());
        });
        match watch {
            Watch::Terminal(entry) => {
                debug!("📡️ {} is already {}. Replaying and closing", self.order_code, entry.status);
                self.replay = Some(StatusEvent::replayed(&entry));
                self.state = DispatcherState::Closed;
            },
            Watch::Live { current, subscription } => {
                trace!("📡️ Subscribed to status changes for {}", self.order_code);
                self.replay = current.as_ref().map(StatusEvent::replayed);
                self.subscription = Some(subscription);
                self.updates = Some(rx);
                self.state = DispatcherState::Subscribed;
            },
        }
        self.state
    }

    /// Releases the cache subscription. Safe to call any number of times, from any exit path. Returns `true` only for
    /// the call that released it.
    pub fn teardown(&mut self) -> bool {
        self.state = DispatcherState::Closed;
        self.updates = None;
        match self.subscription.take() {
            Some(subscription) => {
                let released = subscription.unsubscribe();
                trace!("📡️ Stream for {} torn down", self.order_code);
                released
            },
            None => false,
        }
    }

    /// Drives the stream to completion. Opens the dispatcher first if that has not happened yet.
    pub async fn run<C>(mut self, sink: mpsc::Sender<StreamMessage>, cancelled: C) -> CloseReason
    where C: Future<Output = ()> {
        self.open();
        tokio::pin!(cancelled);
        if let Some(event) = self.replay.take() {
            let terminal = event.is_terminal();
            if let Err(reason) = deliver(&sink, StreamMessage::Status(event), cancelled.as_mut()).await {
                return self.close(reason);
            }
            if terminal {
                return self.close(CloseReason::Terminal);
            }
        }
        let Some(mut updates) = self.updates.take() else {
            // Torn down before it started running
            return self.close(CloseReason::Cancelled);
        };

        let period = self.options.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle_timeout = self.options.idle_timeout;
        let idle = tokio::time::sleep(idle_timeout.unwrap_or(Duration::ZERO));
        tokio::pin!(idle);

        let reason = loop {
            tokio::select! {
                _ = &mut cancelled => break CloseReason::Cancelled,
                _ = sink.closed() => break CloseReason::ClientDisconnected,
                _ = &mut idle, if idle_timeout.is_some() => break CloseReason::IdleTimeout,
                update = updates.recv() => match update {
                    Some(entry) => {
                        let event = StatusEvent::live(&entry);
                        let terminal = event.is_terminal();
                        if let Err(reason) = deliver(&sink, StreamMessage::Status(event), cancelled.as_mut()).await {
                            break reason;
                        }
                        if terminal {
                            break CloseReason::Terminal;
                        }
                        if let Some(timeout) = idle_timeout {
                            idle.as_mut().reset(Instant::now() + timeout);
                        }
                    },
                    None => break CloseReason::CacheDropped,
                },
                _ = keepalive.tick() => {
                    if let Err(reason) = deliver(&sink, StreamMessage::KeepAlive, cancelled.as_mut()).await {
                        break reason;
                    }
                },
            }
        };
        self.close(reason)
    }

    fn close(&mut self, reason: CloseReason) -> CloseReason {
        self.teardown();
        debug!("📡️ Status stream for {} closed: {reason:?}", self.order_code);
        reason
    }
}

/// Writes one message to the sink. A client that stops reading fills the sink up, so the write also gives way to
/// cancellation.
async fn deliver<C>(
    sink: &mpsc::Sender<StreamMessage>,
    message: StreamMessage,
    cancelled: Pin<&mut C>,
) -> Result<(), CloseReason>
where
    C: Future<Output = ()>,
{
    tokio::select! {
        _ = cancelled => Err(CloseReason::Cancelled),
        sent = sink.send(message) => sent.map_err(|_| CloseReason::ClientDisconnected),
    }
}

impl Drop for StatusDispatcher {
    fn drop(&mut self) {
        self.teardown();
    }
}

//--------------------------------------        StatusStream     -----------------------------------------------------
/// The client end of a running [`StatusDispatcher`]. Ends after a terminal status. Dropping it, or calling
/// [`cancel`](Self::cancel), tears the dispatcher down.
pub struct StatusStream {
    order_code: OrderCode,
    receiver: mpsc::Receiver<StreamMessage>,
    cancel: Option<oneshot::Sender<()>>,
}

impl StatusStream {
    /// Spawns `dispatcher` onto the tokio runtime. The dispatcher is opened before this returns, so every write to the
    /// cache after this call reaches the stream.
    pub fn spawn(mut dispatcher: StatusDispatcher, buffer_size: usize) -> Self {
        dispatcher.open();
        let order_code = dispatcher.order_code().clone();
        let (sink, receiver) = mpsc::channel(buffer_size.max(1));
        let (cancel, cancelled) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let cancelled = async move {
                let _ = cancelled.await;
            };
            dispatcher.run(sink, cancelled).await
        });
        Self { order_code, receiver, cancel: Some(cancel) }
    }

    pub fn order_code(&self) -> &OrderCode {
        &self.order_code
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Stream for StatusStream {
    type Item = StreamMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
