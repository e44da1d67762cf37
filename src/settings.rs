use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StripeSettings {
    /// Publishable key handed to the browser on the checkout page.
    #[serde(default)]
    pub publishable_key: String,
    /// Secret key used for REST calls.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub stripe_version: String,
    #[serde(default = "default_stripe_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_webhook_tolerance_seconds")]
    pub webhook_tolerance_seconds: i64,
    /// How long a processed webhook event id is remembered. Zero disables dedup.
    #[serde(default = "default_event_dedup_ttl", with = "humantime_serde")]
    pub event_dedup_ttl: Duration,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            publishable_key: String::new(),
            api_key: String::new(),
            stripe_version: String::new(),
            timeout_ms: default_stripe_timeout_ms(),
            max_retries: default_max_retries(),
            webhook_secret: String::new(),
            webhook_tolerance_seconds: default_webhook_tolerance_seconds(),
            event_dedup_ttl: default_event_dedup_ttl(),
        }
    }
}

impl StripeSettings {
    /// Names of the required keys that are not configured.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.publishable_key.is_empty() {
            missing.push("STRIPE_PUBLISHABLE_KEY");
        }
        if self.api_key.is_empty() {
            missing.push("STRIPE_SECRET_KEY");
        }
        if self.webhook_secret.is_empty() {
            missing.push("STRIPE_WEBHOOK_SECRET");
        }
        missing
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub stripe: StripeSettings,
    pub server_port: u16,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stripe: StripeSettings::default(),
            server_port: 8080,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Config {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: STRIPE_PUBLISHABLE_KEY, STRIPE_SECRET_KEY (or STRIPE_API_KEY),
    /// STRIPE_VERSION, STRIPE_TIMEOUT_MS, STRIPE_MAX_RETRIES, STRIPE_WEBHOOK_SECRET,
    /// STRIPE_WEBHOOK_TOLERANCE_SECONDS, STRIPE_EVENT_DEDUP_TTL, SERVER_PORT, REQUEST_TIMEOUT
    pub fn load() -> Self {
        let mut cfg = Self::from_file("config.toml");
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg
    }

    fn from_file(path: &str) -> Self {
        let base: Config = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new(path).exists() {
            fig = fig.merge(Toml::file(path));
        }
        match fig.extract() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Ignoring unreadable config file");
                Config::default()
            }
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("STRIPE_PUBLISHABLE_KEY") {
            self.stripe.publishable_key = v;
        }
        if let Some(v) = var("STRIPE_API_KEY") {
            self.stripe.api_key = v;
        }
        // The secret-key name wins over the legacy alias when both are set.
        if let Some(v) = var("STRIPE_SECRET_KEY") {
            self.stripe.api_key = v;
        }
        if let Some(v) = var("STRIPE_VERSION") {
            self.stripe.stripe_version = v;
        }
        if let Some(v) = var("STRIPE_TIMEOUT_MS") {
            self.stripe.timeout_ms = v.parse().unwrap_or(self.stripe.timeout_ms);
        }
        if let Some(v) = var("STRIPE_MAX_RETRIES") {
            self.stripe.max_retries = v.parse().unwrap_or(self.stripe.max_retries);
        }
        if let Some(v) = var("STRIPE_WEBHOOK_SECRET") {
            self.stripe.webhook_secret = v;
        }
        if let Some(v) = var("STRIPE_WEBHOOK_TOLERANCE_SECONDS") {
            self.stripe.webhook_tolerance_seconds =
                v.parse().unwrap_or(self.stripe.webhook_tolerance_seconds);
        }
        if let Some(v) = var("STRIPE_EVENT_DEDUP_TTL") {
            self.stripe.event_dedup_ttl = parse_duration_env(&v, self.stripe.event_dedup_ttl);
        }
        if let Some(v) = var("SERVER_PORT") {
            self.server_port = v.parse().unwrap_or(self.server_port);
        }
        if let Some(v) = var("REQUEST_TIMEOUT") {
            self.request_timeout = parse_duration_env(&v, self.request_timeout);
        }
    }
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_stripe_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_webhook_tolerance_seconds() -> i64 {
    300 // 5 minutes
}

fn default_event_dedup_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
