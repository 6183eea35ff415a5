// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::engine::MatchFormat;
use crate::patterns::MAX_PAIR_MATCHES_PER_DAY;
use crate::retry::RetryPolicy;

/// Tunables of the ranked subsystem.
#[derive(Debug, Clone)]
pub struct RankedPolicy {
    /// Apply trust and pattern multipliers to rating gains. When off they are
    /// still computed and logged.
    pub enforcement_enabled: bool,
    /// Reject queue/challenge entry for accounts younger than `min_account_age_days`.
    pub account_age_check_enabled: bool,
    pub min_account_age_days: u32,
    /// Trust below this blocks queue and challenge entry.
    pub suspend_trust_threshold: i32,
    /// Max rating difference between queue opponents.
    pub rating_window: i32,
    pub queue_timeout: Duration,
    /// How often a waiting player re-checks for an opponent.
    pub search_interval: Duration,
    /// Entries older than this are removed by the sweep.
    pub stale_entry_age: Duration,
    pub stale_sweep_interval: Duration,
    pub challenge_ttl: Duration,
    /// Pair cooldown after a declined or finished challenge.
    pub challenge_cooldown: Duration,
    pub max_tier_distance: usize,
    pub max_pair_matches_per_day: i64,
    pub match_format: MatchFormat,
    /// Settlement persistence retries.
    pub settle_retry: RetryPolicy,
    /// Outbound notice retries.
    pub notify_retry: RetryPolicy,
}

impl Default for RankedPolicy {
    fn default() -> Self {
        Self {
            enforcement_enabled: false,
            account_age_check_enabled: false,
            min_account_age_days: 30,
            suspend_trust_threshold: 20,
            rating_window: 200,
            queue_timeout: Duration::from_secs(120),
            search_interval: Duration::from_secs(5),
            stale_entry_age: Duration::from_secs(300),
            stale_sweep_interval: Duration::from_secs(60),
            challenge_ttl: Duration::from_secs(60),
            challenge_cooldown: Duration::from_secs(300),
            max_tier_distance: 2,
            max_pair_matches_per_day: MAX_PAIR_MATCHES_PER_DAY,
            match_format: MatchFormat::default(),
            settle_retry: RetryPolicy::default(),
            notify_retry: RetryPolicy::new(3, Duration::from_millis(250), Duration::from_secs(2)),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    pub policy: RankedPolicy,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:ranked.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `RANKED_ENFORCEMENT` - `true`/`1` applies anti-cheat multipliers
    /// - `RANKED_ACCOUNT_AGE_CHECK` - `true`/`1` enables the account-age gate
    /// - `RANKED_MIN_ACCOUNT_AGE_DAYS` - minimum account age (default: 30)
    /// - `RANKED_SUSPEND_TRUST` - trust threshold for entry (default: 20)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--database-url <URL>` - Override the database
    /// - `--enforce` - Same as `RANKED_ENFORCEMENT=true`
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build from explicit args and an env lookup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = Self::parse_cli_value(args, "--database-url")
            .or_else(|| env("DATABASE_URL"))
            .unwrap_or_else(|| "sqlite:ranked.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let mut policy = RankedPolicy::default();
        policy.enforcement_enabled = args.iter().any(|a| a == "--enforce")
            || env("RANKED_ENFORCEMENT").is_some_and(|v| is_truthy(&v));
        policy.account_age_check_enabled =
            env("RANKED_ACCOUNT_AGE_CHECK").is_some_and(|v| is_truthy(&v));
        if let Some(days) = env("RANKED_MIN_ACCOUNT_AGE_DAYS").and_then(|v| v.parse().ok()) {
            policy.min_account_age_days = days;
        }
        if let Some(threshold) = env("RANKED_SUSPEND_TRUST").and_then(|v| v.parse().ok()) {
            policy.suspend_trust_threshold = threshold;
        }

        Config {
            database_url,
            port,
            policy,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn is_truthy(v: &str) -> bool {
    v.eq_ignore_ascii_case("true") || v == "1"
}
