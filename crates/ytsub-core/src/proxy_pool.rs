//! Proxy pool: round-robin proxy selection with failure-threshold cooldown
//! (spec §4.5).

use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::warn;
use url::Url;
use ytsub_models::ProxyStatus;

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RETRY_DELAY_MINUTES: i64 = 10;

struct State {
    proxies: Vec<ProxyStatus>,
    next_index: usize,
}

/// A mutex-protected pool of proxy statuses. Reads of individual statuses
/// never block a concurrent `mark_success`/`mark_failure` for longer than
/// the critical section itself — there is no cross-call lock held.
pub struct ProxyPool {
    state: Mutex<State>,
    failure_threshold: u32,
    retry_delay_minutes: i64,
}

impl ProxyPool {
    /// Builds a pool from raw proxy URL strings, silently dropping any
    /// that fail [`validate_proxy_url`] (spec §4.5 "Validation": invalid
    /// entries never cause a runtime error, only a warning).
    pub fn new(urls: impl IntoIterator<Item = String>) -> Self {
        Self::with_thresholds(urls, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RETRY_DELAY_MINUTES)
    }

    pub fn with_thresholds(
        urls: impl IntoIterator<Item = String>,
        failure_threshold: u32,
        retry_delay_minutes: i64,
    ) -> Self {
        let proxies = urls
            .into_iter()
            .filter_map(|url| match validate_proxy_url(&url) {
                Ok(()) => Some(ProxyStatus::new(url)),
                Err(reason) => {
                    warn!(url, reason, "dropping invalid proxy URL");
                    None
                }
            })
            .collect();

        Self { state: Mutex::new(State { proxies, next_index: 0 }), failure_threshold, retry_delay_minutes }
    }

    fn is_retryable(&self, proxy: &ProxyStatus) -> bool {
        let Some(marked) = proxy.marked_unhealthy_time else { return true };
        Utc::now() - marked >= ChronoDuration::minutes(self.retry_delay_minutes)
    }

    /// Round-robin over healthy proxies; falls back to a retryable
    /// unhealthy proxy (past cooldown); if none retryable and
    /// `allow_direct`, returns `None` ("use direct connection"); otherwise
    /// returns the proxy with the lowest `consecutive_failures`.
    pub fn get_next_proxy(&self, allow_direct: bool) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        if state.proxies.is_empty() {
            return None;
        }

        let len = state.proxies.len();
        for offset in 0..len {
            let idx = (state.next_index + offset) % len;
            if !state.proxies[idx].is_unhealthy {
                state.next_index = (idx + 1) % len;
                return Some(state.proxies[idx].url.clone());
            }
        }

        for offset in 0..len {
            let idx = (state.next_index + offset) % len;
            if self.is_retryable(&state.proxies[idx]) {
                state.next_index = (idx + 1) % len;
                return Some(state.proxies[idx].url.clone());
            }
        }

        if allow_direct {
            return None;
        }

        state.proxies.iter().min_by_key(|p| p.consecutive_failures).map(|p| p.url.clone())
    }

    pub fn mark_success(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(proxy) = state.proxies.iter_mut().find(|p| p.url == url) {
            proxy.consecutive_failures = 0;
            proxy.is_unhealthy = false;
            proxy.marked_unhealthy_time = None;
            proxy.last_success_time = Some(Utc::now());
        }
    }

    pub fn mark_failure(&self, url: &str, error: Option<String>) {
        let mut state = self.state.lock().unwrap();
        let threshold = self.failure_threshold;
        if let Some(proxy) = state.proxies.iter_mut().find(|p| p.url == url) {
            proxy.consecutive_failures += 1;
            proxy.total_failures += 1;
            proxy.last_error = error;
            if proxy.consecutive_failures >= threshold {
                proxy.is_unhealthy = true;
                proxy.marked_unhealthy_time = Some(Utc::now());
            }
        }
    }

    pub fn reset_proxy(&self, url: &str) {
        self.mark_success(url);
    }

    pub fn reset_all(&self) {
        let mut state = self.state.lock().unwrap();
        for proxy in &mut state.proxies {
            proxy.consecutive_failures = 0;
            proxy.total_failures = 0;
            proxy.last_error = None;
            proxy.is_unhealthy = false;
            proxy.marked_unhealthy_time = None;
        }
    }

    pub fn status_of(&self, url: &str) -> Option<ProxyStatus> {
        self.state.lock().unwrap().proxies.iter().find(|p| p.url == url).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `{http, https, socks4, socks5, socks5h}` scheme, non-empty hostname,
/// and an in-range port if present (spec §4.5 "Validation").
fn validate_proxy_url(raw: &str) -> Result<(), &'static str> {
    let parsed = Url::parse(raw).map_err(|_| "unparseable URL")?;
    if !matches!(parsed.scheme(), "http" | "https" | "socks4" | "socks5" | "socks5h") {
        return Err("unsupported scheme");
    }
    if parsed.host_str().is_none() {
        return Err("missing hostname");
    }
    Ok(())
}
