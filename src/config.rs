use once_cell::sync::Lazy;

/// Secret used for JWT signing. Must be set via the `JWT_SECRET` env variable.
pub static JWT_SECRET: Lazy<String> =
    Lazy::new(|| std::env::var("JWT_SECRET").expect("JWT_SECRET must be set"));

/// Signing secret for billing webhook events. Must be set via
/// `BILLING_WEBHOOK_SECRET`; requests that fail verification never reach the
/// subscription mirror.
pub static BILLING_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_WEBHOOK_SECRET").expect("BILLING_WEBHOOK_SECRET must be set")
});

/// Shared secret presented by the voice agent on its completion callback.
pub static AGENT_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("AGENT_WEBHOOK_SECRET").expect("AGENT_WEBHOOK_SECRET must be set")
});

/// API key for the billing provider's REST API.
pub static BILLING_API_KEY: Lazy<String> =
    Lazy::new(|| std::env::var("BILLING_API_KEY").expect("BILLING_API_KEY must be set"));

/// Base URL of the billing provider's REST API. Overridable for tests.
pub static BILLING_API_BASE: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_API_BASE").unwrap_or_else(|_| "https://api.stripe.com".to_string())
});

/// The member toll-free line, E.164. Calls dialed to anything else are
/// rejected by the inbound classifier before any lookup.
pub static TOLLFREE_NUMBER: Lazy<String> =
    Lazy::new(|| std::env::var("TOLLFREE_NUMBER").expect("TOLLFREE_NUMBER must be set"));

/// Number the voice agent answers on; authorized calls are bridged here.
pub static AGENT_NUMBER: Lazy<String> =
    Lazy::new(|| std::env::var("AGENT_NUMBER").expect("AGENT_NUMBER must be set"));

/// Hard per-call cap for member calls, in seconds. Defaults to 30 minutes.
pub static MEMBER_CALL_LIMIT_SECS: Lazy<u32> = Lazy::new(|| {
    std::env::var("MEMBER_CALL_LIMIT_SECS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(1800)
});

/// Hard per-call cap for trial calls. Shorter than the member cap.
pub static TRIAL_CALL_LIMIT_SECS: Lazy<u32> = Lazy::new(|| {
    std::env::var("TRIAL_CALL_LIMIT_SECS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(600)
});

/// Address to notify when the voice agent reports a completed call. Optional;
/// when unset no email is sent.
pub static NOTIFY_EMAIL_TO: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("NOTIFY_EMAIL_TO"));

/// API key for the transactional email provider. Optional alongside
/// `NOTIFY_EMAIL_TO`.
pub static EMAIL_API_KEY: Lazy<Option<String>> = Lazy::new(|| read_optional_env("EMAIL_API_KEY"));

/// Base URL of the transactional email provider.
pub static EMAIL_API_BASE: Lazy<String> = Lazy::new(|| {
    std::env::var("EMAIL_API_BASE").unwrap_or_else(|_| "https://api.resend.com".to_string())
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even
/// if database migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
