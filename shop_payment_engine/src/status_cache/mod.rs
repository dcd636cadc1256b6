//! Process-local payment status cache
//!
//! The cache keeps the last known [`PaymentStatus`] for every order that the payment gateway has told us about, and
//! notifies interested parties the moment that status changes. It is a transient layer over the webhook log: a
//! restart loses every entry, and that is fine, because the log remains the source of truth.
//!
//! Entries expire [`STATUS_TTL`] after they were written. Expiry happens lazily, when an expired entry is read, and
//! eagerly, when the [sweeper](start_sweeper) runs every [`SWEEP_INTERVAL`].
//!
//! Subscribers are plain callbacks. They are invoked synchronously by [`StatusCache::set`], in registration order,
//! while the cache lock is held. This gives every subscriber the updates for one order in exactly the order the
//! writes happened, but it also means that a callback **must not** call back into the cache (or drop a
//! [`Subscription`]) or it will deadlock. Push the entry into a channel and do the work elsewhere.
mod sweeper;

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
    },
    time::Duration,
};

use log::*;
pub use sweeper::start_sweeper;
use tokio::time::Instant;

use crate::db_types::{OrderCode, PaymentStatus};

/// How long a status stays in the cache after it was last written.
pub const STATUS_TTL: Duration = Duration::from_secs(15 * 60);
/// How often the sweeper removes expired entries that nobody has read.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub type StatusCallback = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

//--------------------------------------        CacheEntry       -----------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub order_code: OrderCode,
    pub status: PaymentStatus,
    pub amount: Option<i64>,
    /// When the entry was written. Used for expiry only, never for ordering.
    pub recorded_at: Instant,
}

impl CacheEntry {
    pub fn new(order_code: OrderCode, status: PaymentStatus, amount: Option<i64>) -> Self {
        Self { order_code, status, amount, recorded_at: Instant::now() }
    }

    pub fn age(&self) -> Duration {
        self.recorded_at.elapsed()
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}

//--------------------------------------        CacheState       -----------------------------------------------------
struct Registration {
    id: u64,
    callback: StatusCallback,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<OrderCode, CacheEntry>,
    subscribers: HashMap<OrderCode, Vec<Registration>>,
    next_id: u64,
}

impl CacheState {
    fn live_entry(&mut self, order_code: &OrderCode, ttl: Duration) -> Option<CacheEntry> {
        let expired = self.entries.get(order_code).map(|e| e.is_expired(ttl))?;
        if expired {
            self.entries.remove(order_code);
            debug!("🗃️ Status for {order_code} has expired and was evicted on read");
            return None;
        }
        self.entries.get(order_code).cloned()
    }

    /// Stores `entry` and runs every callback registered for its order. Returns the number of callbacks run.
    fn publish(&mut self, entry: CacheEntry) -> usize {
        let notified = match self.subscribers.get(&entry.order_code) {
            Some(registrations) => {
                registrations.iter().for_each(|r| (r.callback)(&entry));
                registrations.len()
            },
            None => 0,
        };
        self.entries.insert(entry.order_code.clone(), entry);
        notified
    }

    fn register(&mut self, order_code: &OrderCode, callback: StatusCallback) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.entry(order_code.clone()).or_default().push(Registration { id, callback });
        id
    }

    fn remove_subscriber(&mut self, order_code: &OrderCode, id: u64) -> bool {
        let Some(registrations) = self.subscribers.get_mut(order_code) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            self.subscribers.remove(order_code);
        }
        removed
    }
}

fn lock_state(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    // A panicking callback poisons the lock, but leaves the maps consistent, so carry on.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

//--------------------------------------        StatusCache      -----------------------------------------------------
/// A cheaply cloneable handle to a shared status cache. Clones see the same entries and subscribers.
#[derive(Clone)]
pub struct StatusCache {
    state: Arc<Mutex<CacheState>>,
    ttl: Duration,
}

impl Debug for StatusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StatusCache (ttl: {:?})", self.ttl)
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of [`StatusCache::watch`].
pub enum Watch {
    /// The order has already reached a terminal status. Nothing was subscribed.
    Terminal(CacheEntry),
    /// The order is unknown or still pending. `subscription` will see every write from now on.
    Live { current: Option<CacheEntry>, subscription: Subscription },
}

impl StatusCache {
    pub fn new() -> Self {
        Self::with_ttl(STATUS_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::default())), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `status` for `order_code`, replacing whatever was there, and notifies every subscriber of that order
    /// before returning.
    pub fn set(&self, order_code: &OrderCode, status: PaymentStatus, amount: Option<i64>) {
        let entry = CacheEntry::new(order_code.clone(), status, amount);
        let notified = lock_state(&self.state).publish(entry);
        debug!("🗃️ Status for {order_code} set to {status}. {notified} subscribers notified");
    }

    /// Like [`set`](Self::set), but only if the cache holds no live entry for `order_code`. The check and the write
    /// happen under one lock, so a status read from somewhere slower than the cache never replaces a newer one.
    ///
    /// Returns the entry that was already there, in which case nothing was written and nobody was notified.
    pub fn restore(&self, order_code: &OrderCode, status: PaymentStatus, amount: Option<i64>) -> Option<CacheEntry> {
        let mut state = lock_state(&self.state);
        if let Some(current) = state.live_entry(order_code, self.ttl) {
            debug!("🗃️ {order_code} is already {}. Not restoring {status}", current.status);
            return Some(current);
        }
        let notified = state.publish(CacheEntry::new(order_code.clone(), status, amount));
        debug!("🗃️ Status for {order_code} restored to {status}. {notified} subscribers notified");
        None
    }

    /// Returns the current entry for `order_code`, or `None` if there is none or it has expired.
    pub fn get(&self, order_code: &OrderCode) -> Option<CacheEntry> {
        let mut state = lock_state(&self.state);
        state.live_entry(order_code, self.ttl)
    }

    /// Registers `callback` for every future [`set`](Self::set) of `order_code`. The callback is removed when the
    /// returned [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe<F>(&self, order_code: &OrderCode, callback: F) -> Subscription
    where F: Fn(&CacheEntry) + Send + Sync + 'static {
        let mut state = lock_state(&self.state);
        let id = state.register(order_code, Arc::new(callback));
        trace!("🗃️ Subscription {id} registered for {order_code}");
        self.subscription(order_code, id)
    }

    /// Reads the current entry and, unless it is terminal, subscribes `callback`, all under one lock. No write can
    /// fall between the read and the subscription.
    pub fn watch<F>(&self, order_code: &OrderCode, callback: F) -> Watch
    where F: Fn(&CacheEntry) + Send + Sync + 'static {
        let mut state = lock_state(&self.state);
        match state.live_entry(order_code, self.ttl) {
            Some(entry) if entry.status.is_terminal() => Watch::Terminal(entry),
            current => {
                let id = state.register(order_code, Arc::new(callback));
                trace!("🗃️ Subscription {id} registered for {order_code}");
                Watch::Live { current, subscription: self.subscription(order_code, id) }
            },
        }
    }

    /// Removes every entry older than the TTL. Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut state = lock_state(&self.state);
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(ttl));
        before - state.entries.len()
    }

    /// The number of entries held, including any that have expired but have not been swept yet.
    pub fn len(&self) -> usize {
        lock_state(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self, order_code: &OrderCode) -> usize {
        lock_state(&self.state).subscribers.get(order_code).map(Vec::len).unwrap_or(0)
    }

    fn subscription(&self, order_code: &OrderCode, id: u64) -> Subscription {
        Subscription {
            state: Arc::downgrade(&self.state),
            order_code: order_code.clone(),
            id,
            active: AtomicBool::new(true),
        }
    }
}

//--------------------------------------       Subscription      -----------------------------------------------------
/// Handle to one registered callback. Dropping it unsubscribes.
pub struct Subscription {
    state: Weak<Mutex<CacheState>>,
    order_code: OrderCode,
    id: u64,
    active: AtomicBool,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subscription({} on {}, active: {})", self.id, self.order_code, self.is_active())
    }
}

impl Subscription {
    pub fn order_code(&self) -> &OrderCode {
        &self.order_code
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Removes the callback from the cache. Returns `true` only for the call that actually removed it; any later call
    /// is a no-op.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let removed = lock_state(&state).remove_subscriber(&self.order_code, self.id);
        trace!("🗃️ Subscription {} on {} removed", self.id, self.order_code);
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
