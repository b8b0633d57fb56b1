//! Retry log message formatting.

use std::time::Duration;

/// Context for formatting one retry or give-up message.
#[derive(Debug, Clone)]
pub struct RetryNotice<'a> {
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Delay before the next attempt
    pub backoff: Duration,
    /// What is being retried (e.g. "student 901000042")
    pub subject: &'a str,
    /// Display form of the error that triggered the retry
    pub reason: String,
}

impl<'a> RetryNotice<'a> {
    /// Build a notice for a failed attempt.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        backoff: Duration,
        subject: &'a str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            backoff,
            subject,
            reason: reason.into(),
        }
    }

    /// Standard retry message with attempt counters and subject.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt,
            self.max_attempts,
            self.reason,
            self.backoff.as_secs_f64()
        );
        append_subject(&mut message, self.subject);
        message
    }

    /// Final message once the attempt budget is spent.
    pub fn format_exhausted(&self) -> String {
        let mut message = format!(
            "[FAILED] Giving up after {} attempts, last error: {}",
            self.attempt, self.reason
        );
        append_subject(&mut message, self.subject);
        message
    }
}

fn append_subject(buffer: &mut String, subject: &str) {
    if !subject.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(subject);
        buffer.push(')');
    }
}
