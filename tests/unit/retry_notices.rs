//! Unit tests for retry log notices

use registry_pull::retry::RetryNotice;
use std::time::Duration;

#[test]
fn test_retry_notice() {
    let notice = RetryNotice::new(
        2,
        60,
        Duration::from_millis(2500),
        "student 901000042",
        "HTTP 503",
    );
    assert_eq!(
        notice.format_retry(),
        "Retrying (attempt 2/60) after HTTP 503 - waiting 2.5 seconds... (student 901000042)"
    );
}

#[test]
fn test_exhausted_notice() {
    let notice = RetryNotice::new(60, 60, Duration::ZERO, "student 901000042", "timeout");
    assert_eq!(
        notice.format_exhausted(),
        "[FAILED] Giving up after 60 attempts, last error: timeout (student 901000042)"
    );
}

#[test]
fn test_notice_without_subject() {
    let notice = RetryNotice::new(1, 3, Duration::from_secs(1), "", "reset");
    assert_eq!(
        notice.format_retry(),
        "Retrying (attempt 1/3) after reset - waiting 1.0 seconds..."
    );
}
