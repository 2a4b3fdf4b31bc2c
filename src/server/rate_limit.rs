//! Per-client request throttling.
//!
//! Each client key (the remote IP) gets one fixed window per configured
//! limit. A request is admitted only if every window still has room, and is
//! then counted against all of them.

use super::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tracked clients above which expired entries are swept.
const PRUNE_THRESHOLD: usize = 4096;

/// Key used when the peer address is unknown, e.g. in-process tests.
const UNKNOWN_CLIENT: &str = "unknown";

/// A single `max_requests per window` limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
}

impl RateLimit {
    /// Creates a limit of `max_requests` per `window`.
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// 5 per second and 100 per minute.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(5, Duration::from_secs(1)),
            Self::new(100, Duration::from_secs(60)),
        ]
    }

    /// Maximum requests admitted per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.window.as_secs();
        let (count, unit) = match secs {
            s if s % 3600 == 0 => (s / 3600, "hour"),
            s if s % 60 == 0 => (s / 60, "minute"),
            s => (s, "second"),
        };
        write!(f, "{} per {count} {unit}", self.max_requests)
    }
}

impl FromStr for RateLimit {
    type Err = Error;

    /// Parses `5/second`, `100/minute`, `10/hour` or `5 per second`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::config(format!("Invalid rate limit '{s}' (expected e.g. '5/second')"));

        let (count, unit) = s
            .split_once('/')
            .or_else(|| s.split_once(" per "))
            .ok_or_else(invalid)?;

        let max_requests = count.trim().parse::<u32>().map_err(|_| invalid())?;
        if max_requests == 0 {
            return Err(invalid());
        }

        let window = match unit.trim().to_ascii_lowercase().as_str() {
            "second" | "s" => Duration::from_secs(1),
            "minute" | "m" => Duration::from_secs(60),
            "hour" | "h" => Duration::from_secs(3600),
            _ => return Err(invalid()),
        };

        Ok(Self::new(max_requests, window))
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counters keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    limits: Vec<RateLimit>,
    clients: Mutex<HashMap<String, Vec<Window>>>,
}

impl RateLimiter {
    /// Creates a limiter enforcing every limit in `limits`.
    #[must_use]
    pub fn new(limits: Vec<RateLimit>) -> Self {
        Self {
            limits,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if no limit is configured.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.limits.is_empty()
    }

    /// Admits or rejects one request from `key` at the current instant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] naming the first exhausted limit.
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    /// Admits or rejects one request from `key` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] naming the first exhausted limit.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() >= PRUNE_THRESHOLD {
            self.prune(&mut clients, now);
        }

        let windows = clients.entry(key.to_string()).or_insert_with(|| {
            vec![Window { started: now, count: 0 }; self.limits.len()]
        });

        for (limit, window) in self.limits.iter().zip(windows.iter_mut()) {
            if now.duration_since(window.started) >= limit.window {
                *window = Window { started: now, count: 0 };
            }
        }

        for (limit, window) in self.limits.iter().zip(windows.iter()) {
            if window.count >= limit.max_requests {
                let remaining = limit.window.saturating_sub(now.duration_since(window.started));
                debug!(client = key, %limit, "rate limit hit");
                return Err(Error::RateLimited {
                    limit: limit.to_string(),
                    retry_after_secs: ceil_secs(remaining),
                });
            }
        }

        for window in windows.iter_mut() {
            window.count += 1;
        }

        Ok(())
    }

    fn prune(&self, clients: &mut HashMap<String, Vec<Window>>, now: Instant) {
        let before = clients.len();
        clients.retain(|_, windows| {
            self.limits
                .iter()
                .zip(windows.iter())
                .any(|(limit, window)| now.duration_since(window.started) < limit.window)
        });
        debug!(before, after = clients.len(), "pruned rate limit windows");
    }
}

/// Counts the request against the caller's IP before anything else runs.
pub(crate) async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let client = client_key(&request);
    if let Err(e) = state.rate_limiter.check(&client) {
        warn!(%client, error = %e, "rate limited");
        return Err(e);
    }
    Ok(next.run(request).await)
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}
