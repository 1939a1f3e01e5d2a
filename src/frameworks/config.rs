use std::{env, time::Duration};

// Runtime configuration. Everything is optional: without a database and an
// identity service the app runs against the in-memory backend.

pub fn database_url() -> Option<String> {
    env::var("DATABASE_URL").ok()
}

pub fn auth_service_url() -> Option<String> {
    env::var("AUTH_SERVICE_URL").ok()
}

pub fn auth_request_timeout() -> Duration {
    let millis = env::var("AUTH_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

// The remote identity service is polled for session expiry at this interval.
pub fn session_watch_interval() -> Duration {
    let millis = env::var("SESSION_WATCH_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(30_000);
    Duration::from_millis(millis)
}

// Third-party providers offered by the credential widget.
pub fn oauth_providers() -> Vec<String> {
    env::var("OAUTH_PROVIDERS")
        .unwrap_or_else(|_| "google".to_string())
        .split(',')
        .map(str::trim)
        .filter(|provider| !provider.is_empty())
        .map(str::to_string)
        .collect()
}
