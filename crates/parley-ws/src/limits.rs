//! Connection capacity and per-user send limits for the gateway.

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use parley_core::GatewayLimits;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Shared across every connection served by one gateway router. Rate limits
/// are keyed by user so extra connections do not buy extra quota.
pub struct GatewayControl {
    limits: GatewayLimits,
    active: AtomicUsize,
    per_user: DashMap<i64, usize>,
    messages: DefaultKeyedRateLimiter<i64>,
}

impl GatewayControl {
    pub fn new(limits: GatewayLimits) -> Self {
        let per_minute =
            NonZeroU32::new(limits.max_messages_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            messages: RateLimiter::keyed(Quota::per_minute(per_minute)),
            active: AtomicUsize::new(0),
            per_user: DashMap::new(),
            limits,
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(AtomicOrdering::SeqCst)
    }

    pub fn user_connections(&self, user_id: i64) -> usize {
        self.per_user.get(&user_id).map(|count| *count).unwrap_or(0)
    }

    fn try_acquire_global(&self) -> bool {
        let mut current = self.active.load(AtomicOrdering::SeqCst);
        loop {
            if current >= self.limits.max_connections {
                return false;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn try_acquire_user(&self, user_id: i64) -> bool {
        let mut count = self.per_user.entry(user_id).or_insert(0);
        if *count >= self.limits.max_connections_per_user {
            return false;
        }
        *count += 1;
        true
    }

    fn release_user(&self, user_id: i64) {
        let remove = match self.per_user.get_mut(&user_id) {
            Some(mut count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if remove {
            self.per_user.remove(&user_id);
        }
    }

    /// `Err` carries the suggested retry delay in milliseconds.
    pub(crate) fn check_rate(&self, user_id: i64) -> Result<(), u64> {
        self.messages.check_key(&user_id).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            wait.as_millis().max(1) as u64
        })
    }

    fn prune(&self) {
        self.messages.retain_recent();
        self.messages.shrink_to_fit();
    }
}

/// Periodically drops idle rate limiter keys. Stops once the control is gone.
pub(crate) fn spawn_rate_limit_pruning(control: &Arc<GatewayControl>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    let weak: Weak<GatewayControl> = Arc::downgrade(control);
    handle.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(control) = weak.upgrade() else {
                break;
            };
            control.prune();
            tracing::trace!("rate limiter cleanup: pruned stale entries");
        }
    });
}

/// Releases whatever slots the connection took when it goes away.
pub(crate) struct ConnectionGuard {
    control: Arc<GatewayControl>,
    user_id: Option<i64>,
    global_acquired: bool,
}

impl ConnectionGuard {
    pub(crate) fn new(control: Arc<GatewayControl>) -> Self {
        Self {
            control,
            user_id: None,
            global_acquired: false,
        }
    }

    pub(crate) fn acquire_global(&mut self) -> bool {
        if !self.global_acquired {
            self.global_acquired = self.control.try_acquire_global();
        }
        self.global_acquired
    }

    pub(crate) fn acquire_user(&mut self, user_id: i64) -> bool {
        if self.user_id.is_some() {
            return true;
        }
        if self.control.try_acquire_user(user_id) {
            self.user_id = Some(user_id);
            true
        } else {
            false
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(user_id) = self.user_id.take() {
            self.control.release_user(user_id);
        }
        if self.global_acquired {
            self.control.active.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}
