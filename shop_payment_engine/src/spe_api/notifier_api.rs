use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use log::*;
use tokio::task::JoinHandle;

use crate::{
    db_types::{OrderCode, PaymentStatus},
    status_cache::{start_sweeper, StatusCache, SWEEP_INTERVAL},
    status_stream::{StatusDispatcher, StatusEvent, StatusStream, StreamOptions},
};

/// Number of messages a stream buffers before the dispatcher waits for the client to catch up.
const STREAM_BUFFER_SIZE: usize = 16;

/// `PaymentNotifier` owns the status cache and everything attached to it.
///
/// Create one per process with [`PaymentNotifier::init`], share clones of it with whoever needs it, and call
/// [`PaymentNotifier::shutdown`] on the way out. Tests can build isolated instances with [`PaymentNotifier::new`],
/// which does not start the sweeper.
#[derive(Clone)]
pub struct PaymentNotifier {
    cache: StatusCache,
    options: StreamOptions,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Debug for PaymentNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentNotifier ({} statuses cached)", self.cache.len())
    }
}

impl PaymentNotifier {
    pub fn new(cache: StatusCache, options: StreamOptions) -> Self {
        Self { cache, options, sweeper: Arc::new(Mutex::new(None)) }
    }

    /// Creates a fresh cache and starts sweeping it. Must be called from within a tokio runtime.
    pub fn init(options: StreamOptions) -> Self {
        let cache = StatusCache::new();
        let sweeper = start_sweeper(cache.clone(), SWEEP_INTERVAL);
        Self { cache, options, sweeper: Arc::new(Mutex::new(Some(sweeper))) }
    }

    /// Stops the sweeper. Open streams are unaffected and finish on their own.
    pub fn shutdown(&self) {
        let sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = sweeper {
            handle.abort();
            info!("🕰️ Payment status sweeper stopped");
        }
    }

    /// Records the latest status for the order and pushes it to every open stream for that order.
    pub fn notify_payment(&self, order_code: &OrderCode, status: PaymentStatus, amount: Option<i64>) {
        self.cache.set(order_code, status, amount);
    }

    /// Puts a status recovered from the webhook log back into the cache, unless a fresher one has arrived in the
    /// meantime. Returns that fresher status if so.
    pub fn restore_payment(
        &self,
        order_code: &OrderCode,
        status: PaymentStatus,
        amount: Option<i64>,
    ) -> Option<StatusEvent> {
        self.cache.restore(order_code, status, amount).map(|e| StatusEvent::replayed(&e))
    }

    /// Point lookup for callers that poll instead of streaming.
    pub fn current_status(&self, order_code: &OrderCode) -> Option<StatusEvent> {
        self.cache.get(order_code).map(|e| StatusEvent::replayed(&e))
    }

    /// Opens a new status stream for the order. The stream starts with the currently cached status (if any), then
    /// carries every change until the status is terminal.
    pub fn open_stream(&self, order_code: OrderCode) -> StatusStream {
        debug!("📡️ Opening status stream for {order_code}");
        let dispatcher = StatusDispatcher::new(self.cache.clone(), order_code, self.options);
        StatusStream::spawn(dispatcher, STREAM_BUFFER_SIZE)
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn stream_options(&self) -> StreamOptions {
        self.options
    }
}
