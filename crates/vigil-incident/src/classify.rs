use vigil_domain::Severity;

/// Probe durations above this classify as critical on their own.
const CRITICAL_DURATION_MS: i64 = 30_000;
/// Probe durations above this classify as error on their own.
const ERROR_DURATION_MS: i64 = 10_000;

/// Substrings whose presence makes a failure critical, case-insensitive.
const CRITICAL_PATTERNS: &[&str] = &[
    "panic",
    "fatal",
    "crash",
    "out of memory",
    "stack overflow",
    "database connection failed",
    "authentication failed",
    "authorization failed",
    "service unavailable",
    "circuit breaker",
    "timeout",
    "deadline exceeded",
];

/// Substrings whose presence makes a failure an error, case-insensitive.
const ERROR_PATTERNS: &[&str] = &[
    "error",
    "failed",
    "exception",
    "refused",
    "denied",
    "forbidden",
    "not found",
    "invalid",
    "bad request",
    "unauthorized",
    "connection refused",
];

/// Initial severity of a failure, from its message and probe duration.
///
/// Deliberately simple and auditable: substring matching against a published
/// keyword table plus two duration thresholds. The (message, duration,
/// severity) fixtures below are a compatibility contract; a richer classifier
/// must keep producing the same outputs for them.
pub fn classify(message: &str, duration_ms: i64) -> Severity {
    let lower = message.to_lowercase();

    if duration_ms > CRITICAL_DURATION_MS || CRITICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Severity::Critical;
    }
    if duration_ms > ERROR_DURATION_MS || ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Severity::Error;
    }
    Severity::Warning
}
