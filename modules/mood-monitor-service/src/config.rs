use chrono::Duration;
use std::env;
use std::str::FromStr;

const DEFAULT_BLOCKED_DOMAINS: &[&str] =
    &["youtu.be", "youtube.com", "nicovideo", "nico.ms", "peing.net"];

/// Collection policy. Thresholds and retention are tunable, not part of the algorithm.
#[derive(Debug, Clone)]
pub struct CollectPolicy {
    /// Delay between two successful passes over the same search
    pub update_interval: Duration,
    /// Tweets per sentiment batch
    pub batch_size: usize,
    /// Minimum text length left after stripping urls, hashtags and mentions
    pub min_signal_len: usize,
    /// Expanded URLs containing any of these are never scored
    pub blocked_domains: Vec<String>,
    pub scored_ttl: Duration,
    pub undetected_ttl: Duration,
    /// Attempts per external call, including the first
    pub max_attempts: u32,
    /// First retry delay; each further retry waits three times longer
    pub retry_base: std::time::Duration,
}

impl Default for CollectPolicy {
    fn default() -> Self {
        Self {
            update_interval: Duration::minutes(30),
            batch_size: 25,
            min_signal_len: 160,
            blocked_domains: DEFAULT_BLOCKED_DOMAINS.iter().map(|s| s.to_string()).collect(),
            scored_ttl: Duration::days(183),
            undetected_ttl: Duration::days(14),
            max_attempts: 3,
            retry_base: std::time::Duration::from_millis(500),
        }
    }
}

impl CollectPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            update_interval: Duration::minutes(env_or(
                "MOOD_MONITOR_UPDATE_INTERVAL_MINS",
                defaults.update_interval.num_minutes(),
            )),
            batch_size: env_or("MOOD_MONITOR_BATCH_SIZE", defaults.batch_size).max(1),
            min_signal_len: env_or("MOOD_MONITOR_MIN_SIGNAL_LEN", defaults.min_signal_len),
            blocked_domains: env::var("MOOD_MONITOR_BLOCKED_DOMAINS")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.blocked_domains),
            scored_ttl: Duration::days(env_or(
                "MOOD_MONITOR_SCORED_TTL_DAYS",
                defaults.scored_ttl.num_days(),
            )),
            undetected_ttl: Duration::days(env_or(
                "MOOD_MONITOR_UNDETECTED_TTL_DAYS",
                defaults.undetected_ttl.num_days(),
            )),
            max_attempts: env_or("MOOD_MONITOR_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            retry_base: std::time::Duration::from_millis(env_or(
                "MOOD_MONITOR_RETRY_BASE_MS",
                defaults.retry_base.as_millis() as u64,
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: String,
    /// Seconds between scheduler ticks
    pub tick_secs: u64,
    /// Cap on searches dispatched per tick
    pub due_limit: usize,
    pub sentiment_api_url: Option<String>,
    pub policy: CollectPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or("MOOD_MONITOR_PORT", 9103),
            db_path: env::var("MOOD_MONITOR_DB_PATH")
                .unwrap_or_else(|_| "./mood_monitor.db".to_string()),
            tick_secs: env_or("MOOD_MONITOR_TICK_SECS", 60),
            due_limit: env_or("MOOD_MONITOR_DUE_LIMIT", 50),
            sentiment_api_url: env::var("SENTIMENT_API_URL").ok().filter(|s| !s.is_empty()),
            policy: CollectPolicy::from_env(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("{} is not a valid value ({}), using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
