// sliding window rate limiter keyed by client address
// process-local on purpose - a multi-instance deployment needs a shared counter

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

pub const DEFAULT_LIMIT: usize = 60;
pub const DEFAULT_WINDOW_SECS: i64 = 60;

// sweep idle keys every this many admission checks so the map stays bounded
const SWEEP_EVERY: u64 = 1024;

pub struct RateLimiter {
    limit: usize,
    window: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    clients: HashMap<IpAddr, VecDeque<DateTime<Utc>>>,
    checks: u64,
}

impl RateLimiter {
    pub fn new(limit: usize, window_secs: i64) -> Self {
        Self {
            limit,
            window: Duration::seconds(window_secs),
            inner: Mutex::new(Inner {
                clients: HashMap::new(),
                checks: 0,
            }),
        }
    }

    pub async fn admit(&self, client: IpAddr) -> bool {
        self.admit_at(client, Utc::now()).await
    }

    // timestamps at or before now - window no longer count; a rejected
    // attempt is not recorded, so hammering while limited never extends the
    // lockout
    pub async fn admit_at(&self, client: IpAddr, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut inner = self.inner.lock().await;

        inner.checks += 1;
        if inner.checks % SWEEP_EVERY == 0 {
            inner.clients.retain(|_, stamps| {
                while stamps.front().is_some_and(|t| *t <= cutoff) {
                    stamps.pop_front();
                }
                !stamps.is_empty()
            });
        }

        let stamps = inner.clients.entry(client).or_default();
        while stamps.front().is_some_and(|t| *t <= cutoff) {
            stamps.pop_front();
        }

        if stamps.len() < self.limit {
            stamps.push_back(now);
            true
        } else {
            false
        }
    }

    // how many client keys are currently tracked (eviction tests)
    pub async fn tracked_clients(&self) -> usize {
        self.inner.lock().await.clients.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW_SECS)
    }
}
