//! Fixed-window per-source-IP connection rate limiter: a plain counter per
//! IP behind a `tokio::sync::Mutex`, with a periodic sweep task reclaiming
//! entries whose window has expired.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct RateEntry {
    count: u32,
    reset_at: Instant,
}

struct Inner {
    entries: Mutex<HashMap<IpAddr, RateEntry>>,
    max_connections: u32,
    window: Duration,
}

/// Fixed-window limiter shared across upgrade-gate tasks. `check` is the
/// single mutation point; a background sweep reclaims expired entries every
/// 60s so the map stays bounded by recent distinct source IPs.
pub struct RateLimiter {
    inner: Arc<Inner>,
    stopped: Arc<AtomicBool>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(max_connections: u32, window: Duration) -> Self {
        let inner = Arc::new(Inner {
            entries: Mutex::new(HashMap::new()),
            max_connections,
            window,
        });
        let stopped = Arc::new(AtomicBool::new(false));
        let sweep_handle = Mutex::new(Some(Self::spawn_sweep(inner.clone(), stopped.clone())));
        Self {
            inner,
            stopped,
            sweep_handle,
        }
    }

    fn spawn_sweep(inner: Arc<Inner>, stopped: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if stopped.load(Ordering::Relaxed) {
                    return;
                }
                let now = Instant::now();
                let mut entries = inner.entries.lock().await;
                let before = entries.len();
                entries.retain(|_, entry| entry.reset_at > now);
                if before != entries.len() {
                    debug!(removed = before - entries.len(), "rate limiter sweep");
                }
            }
        })
    }

    /// Resets the window if expired, otherwise increments and allows iff
    /// the new count is within bounds.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock().await;
        match entries.get_mut(&ip) {
            None => {
                entries.insert(
                    ip,
                    RateEntry {
                        count: 1,
                        reset_at: now + self.inner.window,
                    },
                );
                true
            }
            Some(entry) if now >= entry.reset_at => {
                entry.count = 1;
                entry.reset_at = now + self.inner.window;
                true
            }
            Some(entry) => {
                entry.count += 1;
                entry.count <= self.inner.max_connections
            }
        }
    }

    /// Cancels the sweep task and clears the mapping. Called during
    /// shutdown.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.sweep_handle.lock().await.take() {
            handle.abort();
        }
        self.inner.entries.lock().await.clear();
    }

    #[cfg(test)]
    pub async fn entry_count(&self) -> usize {
        self.inner.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).await);
        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);
        limiter.stop().await;
    }

    #[tokio::test]
    async fn window_reset_allows_again() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check(ip).await);
        limiter.stop().await;
    }

    #[tokio::test]
    async fn separate_ips_tracked_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(a).await);
        assert!(limiter.check(b).await);
        assert!(!limiter.check(a).await);
        limiter.stop().await;
    }
}
